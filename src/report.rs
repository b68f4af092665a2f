//! Result Reporter Module
//!
//! 変換結果の表示と、出力ディレクトリをファイルマネージャで開く処理を提供するモジュール。

use std::io::{self, Write};
use std::path::Path;
use std::process::Command;

use crate::error::XlsmConvError;
use crate::workbook::ConversionSummary;

const RULE_WIDTH: usize = 50;

/// バイト数をKB単位（小数点以下1桁）で表記する
pub fn format_size_kb(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

/// 保護解除の結果を表示する
pub fn print_conversion_summary<W: Write>(
    out: &mut W,
    summary: &ConversionSummary,
) -> Result<(), XlsmConvError> {
    if summary.workbook_lock_removed {
        writeln!(out, "Removed workbook security settings")?;
    }
    if summary.unprotected_sheets.is_empty() {
        writeln!(out, "No protected worksheets found")?;
    } else {
        writeln!(
            out,
            "Removed protection from {} worksheet(s): {}",
            summary.unprotected_sheets.len(),
            summary.unprotected_sheets.join(", ")
        )?;
    }
    if !summary.removed_macro_sheets.is_empty() {
        writeln!(
            out,
            "Removed {} macro sheet(s): {}",
            summary.removed_macro_sheets.len(),
            summary.removed_macro_sheets.join(", ")
        )?;
    }
    if !summary.removed_macro_parts.is_empty() {
        writeln!(
            out,
            "Removed macro content ({} part(s))",
            summary.removed_macro_parts.len()
        )?;
    }
    Ok(())
}

/// 入力パス・出力パス（絶対パス）・出力サイズを表示する
pub fn print_result<W: Write>(out: &mut W, input: &Path, output: &Path) -> Result<(), XlsmConvError> {
    let absolute = output
        .canonicalize()
        .unwrap_or_else(|_| output.to_path_buf());
    let size = std::fs::metadata(output)?.len();

    writeln!(out, "\n{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out, "✓ CONVERSION COMPLETED SUCCESSFULLY!")?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out, "Input:  {}", input.display())?;
    writeln!(out, "Output: {}", absolute.display())?;
    writeln!(out, "Size:   {}", format_size_kb(size))?;
    Ok(())
}

/// 致命的なエラーと対処のヒントを表示する
pub fn print_failure<W: Write>(out: &mut W, error: &XlsmConvError) -> io::Result<()> {
    writeln!(out, "\n❌ ERROR: {}", error)?;
    writeln!(out, "\nTroubleshooting tips:")?;
    match error {
        XlsmConvError::PasswordProtected { .. } => {
            writeln!(out, "- Remove the open password in Excel (File > Info > Protect Workbook) and try again")?;
        }
        XlsmConvError::UnsupportedFormat(_) | XlsmConvError::NotSpreadsheet(_) => {
            writeln!(out, "- Verify the file is a macro-enabled workbook saved by Excel 2007 or later")?;
        }
        _ => {}
    }
    writeln!(out, "- Ensure the XLSM file is not open in Excel")?;
    writeln!(out, "- Check file permissions")?;
    writeln!(out, "- Verify the file is not corrupted")?;
    Ok(())
}

/// プラットフォーム標準のファイルマネージャでディレクトリを開く
///
/// GUIの無い環境では失敗します。呼び出し側は警告として扱ってください。
pub fn open_directory(dir: &Path) -> io::Result<()> {
    if cfg!(target_os = "windows") {
        // explorer.exeは成功時も非0を返すため、起動できたかどうかのみ確認する
        Command::new("explorer").arg(dir).spawn()?;
        return Ok(());
    }

    let program = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    let status = Command::new(program).arg(dir).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("{} exited with {}", program, status)))
    }
}
