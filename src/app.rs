//! Application Module
//!
//! 一覧 → 選択 → 変換 → 出力 → 報告 の一連の流れを実行するモジュール。
//! 各段階は完了するか、実行全体を中断するかのいずれかです。

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::builder::Converter;
use crate::error::XlsmConvError;
use crate::lister::{list_source_files, Listing};
use crate::output::{write_atomically, OutputDir};
use crate::prompt::{Prompter, Selection};
use crate::report::{open_directory, print_conversion_summary, print_result};
use crate::workbook::ConversionSummary;

/// 入力ディレクトリの既定値（起動ディレクトリからの相対パス）
pub const DEFAULT_SOURCE_DIR: &str = "src";

/// 出力ルートの既定値（起動ディレクトリからの相対パス）
pub const DEFAULT_OUTPUT_ROOT: &str = "converted";

/// ディレクトリを開く処理
pub type DirectoryOpener = fn(&Path) -> io::Result<()>;

/// 実行設定
pub struct AppConfig {
    /// 入力ディレクトリ
    pub source_dir: PathBuf,
    /// タイムスタンプ付きディレクトリを作成する出力ルート
    pub output_root: PathBuf,
    pub converter: Converter,
    /// 出力ディレクトリを開く処理（テストでは差し替える）
    pub opener: DirectoryOpener,
}

impl AppConfig {
    pub fn new(converter: Converter) -> Self {
        Self {
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            converter,
            opener: open_directory,
        }
    }
}

/// 1回の実行結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// 入力ディレクトリを作成した（変換なし）
    SourceDirCreated,
    /// 対象ファイルが無かった
    NoFiles,
    /// ファイル選択で終了した
    Quit,
    /// 確認で中止した
    Cancelled,
    /// 変換が完了した
    Converted {
        input: PathBuf,
        output: PathBuf,
        summary: ConversionSummary,
    },
}

/// 対話的な変換を1回実行する
///
/// 利用者による終了・中止は`Ok`、変換や入出力の失敗は`Err`として返します。
pub fn run<R: BufRead, W: Write>(
    config: &AppConfig,
    prompter: &mut Prompter<R, W>,
) -> Result<RunOutcome, XlsmConvError> {
    let rule = "=".repeat(50);
    {
        let out = prompter.output();
        writeln!(out, "Excel XLSM to XLSX Converter")?;
        writeln!(out, "{}", rule)?;
        writeln!(out, "This tool converts XLSM files to XLSX and removes password protections")?;
        writeln!(out, "{}", rule)?;
    }

    // 1. 一覧
    let dir = &config.source_dir;
    let files = match list_source_files(dir)? {
        Listing::DirectoryCreated => {
            writeln!(
                prompter.output(),
                "Created '{}' directory. Please place your XLSM files there and run again.",
                dir.display()
            )?;
            return Ok(RunOutcome::SourceDirCreated);
        }
        Listing::Empty => {
            let out = prompter.output();
            writeln!(out, "No XLSM files found in '{}' directory.", dir.display())?;
            writeln!(
                out,
                "Please place your XLSM files in the '{}' folder and run again.",
                dir.display()
            )?;
            return Ok(RunOutcome::NoFiles);
        }
        Listing::Found(files) => files,
    };

    // 2. 選択と確認
    prompter.show_menu(dir, &files)?;
    let source = match prompter.select(files.len())? {
        Selection::File(index) => &files[index],
        Selection::Quit => {
            writeln!(prompter.output(), "No file selected. Exiting...")?;
            return Ok(RunOutcome::Quit);
        }
    };
    writeln!(prompter.output(), "\nSelected file: {}", source.name())?;

    if !prompter.confirm("Proceed with conversion?")? {
        writeln!(prompter.output(), "Conversion cancelled.")?;
        return Ok(RunOutcome::Cancelled);
    }

    // 3. 変換（メモリ上）
    writeln!(prompter.output(), "\nLoading workbook: {}", source.name())?;
    let unlocked = config.converter.load(&source.path)?;
    print_conversion_summary(prompter.output(), unlocked.summary())?;
    let (bytes, summary) = unlocked.finish()?;

    // 4. 出力ディレクトリの作成と保存
    let output_dir = OutputDir::create_now(&config.output_root)?;
    let output = output_dir.file_for(&source.path);
    writeln!(prompter.output(), "Saving converted file: {}", output.display())?;
    if let Err(e) = write_atomically(&output, &bytes) {
        output_dir.remove_if_empty();
        return Err(e.into());
    }
    tracing::info!(path = %output.display(), bytes = bytes.len(), "saved converted workbook");

    // 5. 報告
    print_result(prompter.output(), &source.path, &output)?;
    if prompter.confirm("\nOpen output directory?")? {
        let dir = output_dir.path();
        match (config.opener)(dir) {
            Ok(()) => writeln!(prompter.output(), "Opened: {}", dir.display())?,
            Err(e) => {
                tracing::warn!(error = %e, dir = %dir.display(), "could not open output directory");
                writeln!(prompter.output(), "Could not open directory: {}", e)?;
                writeln!(prompter.output(), "Manual path: {}", dir.display())?;
            }
        }
    }

    Ok(RunOutcome::Converted {
        input: source.path.clone(),
        output,
        summary,
    })
}
