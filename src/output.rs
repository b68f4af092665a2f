//! Output Organizer Module
//!
//! 実行ごとのタイムスタンプ付き出力ディレクトリの作成と、
//! 失敗時に不完全なファイルを残さない書き込みを提供するモジュール。

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tempfile::NamedTempFile;

/// 出力ディレクトリ名の書式（例: `20250114_093015`）
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// 出力ファイルの拡張子
pub const OUTPUT_EXTENSION: &str = "xlsx";

/// タイムスタンプから出力ディレクトリ名を生成する
pub fn timestamp_dir_name(now: &DateTime<Local>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// 元ファイル名から出力ファイル名を生成する（`report.xlsm` → `report.xlsx`）
///
/// 拡張子だけを置き換えるため、`v1.0.xlsm`は`v1.0.xlsx`になります。
pub fn output_file_name(source: &Path) -> PathBuf {
    let mut name = source
        .file_stem()
        .unwrap_or(source.as_os_str())
        .to_os_string();
    name.push(".");
    name.push(OUTPUT_EXTENSION);
    PathBuf::from(name)
}

/// 1回の実行に対応する出力ディレクトリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDir {
    path: PathBuf,
}

impl OutputDir {
    /// `root/<timestamp>`を作成する（`root`が無ければ併せて作成）
    ///
    /// 同じ秒に2回作成した場合は既存のディレクトリをそのまま再利用します。
    pub fn create(root: &Path, now: &DateTime<Local>) -> io::Result<Self> {
        let path = root.join(timestamp_dir_name(now));
        fs::create_dir_all(&path)?;
        tracing::debug!(path = %path.display(), "created output directory");
        Ok(Self { path })
    }

    /// 現在時刻で作成する
    pub fn create_now(root: &Path) -> io::Result<Self> {
        Self::create(root, &Local::now())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 空のままなら削除する（保存に失敗した場合の後始末）
    pub fn remove_if_empty(&self) {
        if fs::remove_dir(&self.path).is_ok() {
            tracing::debug!(path = %self.path.display(), "removed empty output directory");
        }
    }

    /// 元ファイルに対応する出力ファイルのパス
    pub fn file_for(&self, source: &Path) -> PathBuf {
        self.path.join(output_file_name(source))
    }
}

fn parent_dir_or_dot(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// 同じディレクトリの一時ファイルに書き込んでから置き換える
///
/// 一時ファイル名は書き込みごとに一意です。失敗した場合、一時ファイルは
/// `NamedTempFile`のドロップで削除され、既存の`dest`は変更されません。
pub fn write_atomically(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut temp = NamedTempFile::new_in(parent_dir_or_dot(dest))?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
