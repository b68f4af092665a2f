//! xlsmconv - Macro-enabled Excel workbook to unprotected .xlsx converter
//!
//! マクロ有効ブック（.xlsm）を読み込み、VBAプロジェクトとシート保護・ブック保護を取り除いて
//! 標準ブック（.xlsx）として保存するクレートです。
//! セル内容・書式・シート構成などのパーツはそのまま維持され、元ファイルは変更しません。
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use xlsmconv::ConverterBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = ConverterBuilder::new().build()?;
//!
//!     let summary = converter.convert("src/report.xlsm", "report.xlsx")?;
//!     println!("Removed protection from: {:?}", summary.unprotected_sheets);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Two-step conversion
//!
//! 読み込み（保護解除）と保存を分けることで、保存先を作成する前に結果を確認できます。
//!
//! ```rust,no_run
//! use xlsmconv::{ConverterBuilder, OutputDir};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = ConverterBuilder::new().build()?;
//! let unlocked = converter.load("src/report.xlsm")?;
//! println!("{:?}", unlocked.summary());
//!
//! let dir = OutputDir::create_now(Path::new("converted"))?;
//! unlocked.save(dir.file_for(Path::new("report.xlsm")))?;
//! # Ok(())
//! # }
//! ```

mod app;
mod builder;
mod error;
mod lister;
mod output;
mod package;
mod prompt;
mod protection;
mod report;
mod security;
mod workbook;

// 公開API
pub use app::{run, AppConfig, DirectoryOpener, RunOutcome, DEFAULT_OUTPUT_ROOT, DEFAULT_SOURCE_DIR};
pub use builder::{Converter, ConverterBuilder};
pub use error::XlsmConvError;
pub use lister::{list_source_files, Listing, SourceFile, SOURCE_EXTENSION};
pub use output::{output_file_name, timestamp_dir_name, write_atomically, OutputDir, OUTPUT_EXTENSION};
pub use prompt::{Prompter, Selection};
pub use report::{format_size_kb, open_directory, print_failure};
pub use security::SecurityConfig;
pub use workbook::{ConversionSummary, UnlockedWorkbook};
