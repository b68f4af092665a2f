//! File Lister Module
//!
//! 入力ディレクトリから変換対象（.xlsm）のファイルを列挙するモジュール。

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::XlsmConvError;

/// 変換対象ファイルの拡張子
pub const SOURCE_EXTENSION: &str = "xlsm";

/// Excelが編集中のブックの横に作成する所有者ファイルの接頭辞
const OWNER_FILE_PREFIX: &str = "~$";

/// 変換候補のファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// ファイルサイズ（バイト）
    pub size: u64,
    /// 最終更新日時
    pub modified: DateTime<Local>,
}

impl SourceFile {
    /// ファイル名部分
    pub fn name(&self) -> Cow<'_, str> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| self.path.to_string_lossy())
    }
}

/// 入力ディレクトリの走査結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    /// ディレクトリが存在しなかったため作成した
    DirectoryCreated,
    /// 対象ファイルが1つも無い
    Empty,
    /// 名前順に並べた対象ファイル
    Found(Vec<SourceFile>),
}

/// 入力ディレクトリを走査し、対象ファイルを名前順で返す
///
/// ディレクトリが存在しない場合は作成し、`Listing::DirectoryCreated`を返します。
/// 拡張子は大文字・小文字を区別せずに比較し、`~$`で始まる所有者ファイルは除外します。
pub fn list_source_files(dir: &Path) -> Result<Listing, XlsmConvError> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        tracing::info!(dir = %dir.display(), "created input directory");
        return Ok(Listing::DirectoryCreated);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !is_source_file(&path) {
            continue;
        }

        // シンボリックリンクはリンク先で判定する
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "skipped unreadable entry");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        files.push(SourceFile {
            path,
            size: metadata.len(),
            modified: DateTime::<Local>::from(metadata.modified()?),
        });
    }

    if files.is_empty() {
        return Ok(Listing::Empty);
    }

    files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    tracing::debug!(count = files.len(), dir = %dir.display(), "listed source files");
    Ok(Listing::Found(files))
}

fn is_source_file(path: &Path) -> bool {
    let has_extension = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION))
        .unwrap_or(false);
    let is_owner_file = path
        .file_name()
        .map(|name| name.to_string_lossy().starts_with(OWNER_FILE_PREFIX))
        .unwrap_or(false);
    has_extension && !is_owner_file
}
