//! Workbook Unlock Module
//!
//! 読み込んだパッケージに対して、シート保護・ブック保護の解除とマクロの除去を行い、
//! 標準形式（.xlsx）として保存するモジュール。

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Reader, Sheets};

use crate::error::XlsmConvError;
use crate::output::write_atomically;
use crate::package::Package;
use crate::protection::{
    part_dir, rels_part_for, relationships, remove_relationships, remove_sheets, resolve_target,
    rewrite_content_types, unprotect_sheet, unprotect_workbook, workbook_sheets,
};

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// マクロを含み得るシートのリレーションシップ種別（Excel 4.0マクロシート・ダイアログシート）
const MACRO_SHEET_KINDS: [&str; 3] = ["xlMacrosheet", "xlIntlMacrosheet", "dialogsheet"];

/// 1回の変換で行った変更の要約
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    /// ブック内の全シート名（ブック内の順序）
    pub sheet_names: Vec<String>,
    /// 保護を解除したワークシート名（ブック内の順序）
    pub unprotected_sheets: Vec<String>,
    /// ブック保護（構造・ウィンドウ・変更履歴のロック）を削除したか
    pub workbook_lock_removed: bool,
    /// 削除したマクロシート・ダイアログシート名（ブック内の順序）
    pub removed_macro_sheets: Vec<String>,
    /// 削除したマクロ関連パーツ
    pub removed_macro_parts: Vec<String>,
}

/// 保護解除・マクロ除去済みのワークブック
///
/// メモリ上にのみ存在し、`save`で書き出した時点で破棄されます。
#[derive(Debug)]
pub struct UnlockedWorkbook {
    package: Package,
    summary: ConversionSummary,
    verify_output: bool,
}

impl UnlockedWorkbook {
    /// 変更内容の要約
    pub fn summary(&self) -> &ConversionSummary {
        &self.summary
    }

    /// 標準形式のZIPパッケージとしてシリアライズする
    ///
    /// 検証が有効な場合、calamineで再度開いてシート構成とマクロの不在を確認します。
    pub fn to_bytes(&self) -> Result<Vec<u8>, XlsmConvError> {
        let bytes = self.package.to_bytes()?;
        if self.verify_output {
            verify_package(&bytes, &self.summary.sheet_names)?;
        }
        Ok(bytes)
    }

    /// 指定したパスに保存し、要約を返す
    ///
    /// シリアライズと検証はすべてメモリ上で完了してから書き込むため、
    /// 失敗時に不完全なファイルは残りません。
    pub fn save<P: AsRef<Path>>(self, path: P) -> Result<ConversionSummary, XlsmConvError> {
        let path = path.as_ref();
        let (bytes, summary) = self.finish()?;
        write_atomically(path, &bytes)?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "saved converted workbook");
        Ok(summary)
    }

    /// シリアライズ・検証済みのバイト列と要約を取り出す
    ///
    /// 保存先を作成する前に変換結果を確定させたい場合に使用します。
    pub fn finish(self) -> Result<(Vec<u8>, ConversionSummary), XlsmConvError> {
        let bytes = self.to_bytes()?;
        Ok((bytes, self.summary))
    }
}

/// パッケージの保護解除とマクロ除去を行う
pub(crate) fn unlock(mut package: Package, verify_output: bool) -> Result<UnlockedWorkbook, XlsmConvError> {
    let workbook_part = package.workbook_part()?;
    let workbook_xml = package
        .part(&workbook_part)
        .ok_or_else(|| XlsmConvError::NotSpreadsheet(format!("missing part '{}'", workbook_part)))?;
    let entries = workbook_sheets(&workbook_part, workbook_xml)?;

    let workbook_rels_part = rels_part_for(&workbook_part);
    let workbook_rels = match package.part(&workbook_rels_part) {
        Some(xml) => relationships(&workbook_rels_part, xml)?,
        None => Vec::new(),
    };
    let base_dir = part_dir(&workbook_part).to_string();

    let mut summary = ConversionSummary::default();
    let mut macro_sheet_indexes = Vec::new();
    let mut macro_sheet_rel_ids = Vec::new();

    // 1. ワークシート保護の解除（マクロシートは削除対象として記録するだけ）
    for (index, entry) in entries.iter().enumerate() {
        let rel = workbook_rels
            .iter()
            .find(|rel| rel.id == entry.rel_id && !rel.external)
            .ok_or_else(|| {
                XlsmConvError::NotSpreadsheet(format!(
                    "sheet '{}' has no relationship '{}'",
                    entry.name, entry.rel_id
                ))
            })?;
        if MACRO_SHEET_KINDS.contains(&rel.kind()) {
            tracing::debug!(sheet = %entry.name, kind = rel.kind(), "found macro sheet");
            macro_sheet_indexes.push(index);
            macro_sheet_rel_ids.push(rel.id.clone());
            summary.removed_macro_sheets.push(entry.name.clone());
            continue;
        }
        summary.sheet_names.push(entry.name.clone());

        let sheet_part = resolve_target(&base_dir, &rel.target);
        let Some(sheet_xml) = package.part(&sheet_part) else {
            return Err(XlsmConvError::NotSpreadsheet(format!(
                "sheet '{}' points to missing part '{}'",
                entry.name, sheet_part
            )));
        };

        let result = unprotect_sheet(&sheet_part, sheet_xml)?;
        if result.had_element {
            package.set_part(&sheet_part, result.xml);
        }
        if result.was_protected {
            tracing::debug!(sheet = %entry.name, part = %sheet_part, "removed sheet protection");
            summary.unprotected_sheets.push(entry.name.clone());
        }
    }

    if summary.sheet_names.is_empty() && !entries.is_empty() {
        return Err(XlsmConvError::NotSpreadsheet(
            "the workbook contains only macro sheets".to_string(),
        ));
    }

    // 2. ブック保護の解除
    if let Some(xml) = package.part(&workbook_part) {
        let (rewritten, removed) = unprotect_workbook(&workbook_part, xml)?;
        if removed {
            package.set_part(&workbook_part, rewritten);
            summary.workbook_lock_removed = true;
        }
    }

    // 3. マクロの除去
    if !macro_sheet_indexes.is_empty() {
        if let Some(xml) = package.part(&workbook_part) {
            let rewritten = remove_sheets(&workbook_part, xml, &macro_sheet_indexes)?;
            package.set_part(&workbook_part, rewritten);
        }
    }
    summary.removed_macro_parts =
        strip_macros(&mut package, &workbook_rels_part, &base_dir, &macro_sheet_rel_ids)?;

    tracing::info!(
        sheets = summary.sheet_names.len(),
        unprotected = summary.unprotected_sheets.len(),
        macro_sheets = summary.removed_macro_sheets.len(),
        workbook_lock_removed = summary.workbook_lock_removed,
        removed_parts = summary.removed_macro_parts.len(),
        "unlocked workbook"
    );

    Ok(UnlockedWorkbook {
        package,
        summary,
        verify_output,
    })
}

/// VBAプロジェクトとマクロシートのパーツ・リレーションシップ・Content Typeを除去する
///
/// `macro_sheet_rel_ids`はブックから削除したマクロシートのリレーションシップID。
fn strip_macros(
    package: &mut Package,
    workbook_rels_part: &str,
    base_dir: &str,
    macro_sheet_rel_ids: &[String],
) -> Result<Vec<String>, XlsmConvError> {
    let mut doomed: Vec<String> = package
        .part_names()
        .filter(|name| is_vba_part(name))
        .map(str::to_string)
        .collect();

    if let Some(xml) = package.part(workbook_rels_part) {
        let (rewritten, removed) = remove_relationships(workbook_rels_part, xml, |rel| {
            rel.kind() == "vbaProject" || macro_sheet_rel_ids.contains(&rel.id)
        })?;
        if !removed.is_empty() {
            package.set_part(workbook_rels_part, rewritten);
        }
        for rel in removed.iter().filter(|rel| !rel.external) {
            let target = resolve_target(base_dir, &rel.target);
            if !doomed.contains(&target) {
                doomed.push(target);
            }
        }
    }

    // 各パーツ自身の.relsも併せて削除する
    let rels: Vec<String> = doomed.iter().map(|name| rels_part_for(name)).collect();
    doomed.extend(rels);

    let mut removed = Vec::new();
    for name in doomed {
        if package.remove_part(&name) {
            tracing::debug!(part = %name, "removed macro part");
            removed.push(name);
        }
    }

    if let Some(xml) = package.part(CONTENT_TYPES_PART) {
        let rewritten = rewrite_content_types(CONTENT_TYPES_PART, xml, &removed)?;
        package.set_part(CONTENT_TYPES_PART, rewritten);
    }

    Ok(removed)
}

/// `xl/vbaProject.bin`や`xl/vbaProjectSignature*.bin`などのVBAパーツか
fn is_vba_part(name: &str) -> bool {
    let file = name.rsplit('/').next().unwrap_or(name).to_ascii_lowercase();
    file.starts_with("vbaproject") && file.ends_with(".bin")
}

/// 変換結果をcalamineで開き、シート構成とマクロの不在を確認する
fn verify_package(bytes: &[u8], expected_sheets: &[String]) -> Result<(), XlsmConvError> {
    let mut workbook = match open_workbook_auto_from_rs(Cursor::new(bytes))? {
        Sheets::Xlsx(workbook) => workbook,
        _ => {
            return Err(XlsmConvError::Verify(
                "the converted file is not recognized as an .xlsx workbook".to_string(),
            ))
        }
    };

    let names = workbook.sheet_names();
    if names != expected_sheets {
        return Err(XlsmConvError::Verify(format!(
            "sheet list changed: expected {:?}, found {:?}",
            expected_sheets, names
        )));
    }

    if workbook.vba_project().is_some() {
        return Err(XlsmConvError::Verify(
            "a VBA project is still present in the converted file".to_string(),
        ));
    }
    Ok(())
}
