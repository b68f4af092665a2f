//! Test fixtures
//!
//! rust_xlsxwriterで生成した.xlsxを、ZIPレベルで書き換えてマクロ有効ブック（.xlsm）にする。

#![allow(dead_code)]

use rust_xlsxwriter::{Workbook, XlsxError};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

pub const STANDARD_MAIN: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
pub const MACRO_ENABLED_MAIN: &str = "application/vnd.ms-excel.sheet.macroEnabled.main+xml";
const VBA_DEFAULT: &str =
    r#"<Default Extension="bin" ContentType="application/vnd.ms-office.vbaProject"/>"#;
const VBA_RELATIONSHIP: &str = r#"<Relationship Id="rIdVba1" Type="http://schemas.microsoft.com/office/2006/relationships/vbaProject" Target="vbaProject.bin"/>"#;
const WORKBOOK_PROTECTION: &str =
    r#"<workbookProtection lockStructure="1" lockWindows="1" lockRevision="1"/>"#;

/// "Data"と"Summary"が保護された2シートのブック
pub fn generate_report() -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();

    let data = workbook.add_worksheet();
    data.set_name("Data")?;
    data.write_string(0, 0, "Item")?;
    data.write_string(0, 1, "Amount")?;
    data.write_string(1, 0, "Apples")?;
    data.write_number(1, 1, 42.0)?;
    data.write_string(2, 0, "Pears")?;
    data.write_number(2, 1, 7.5)?;
    data.protect();

    let summary = workbook.add_worksheet();
    summary.set_name("Summary")?;
    summary.write_string(0, 0, "Total")?;
    summary.write_number(0, 1, 49.5)?;
    summary.protect_with_password("secret");

    workbook.save_to_buffer()
}

/// 保護なしの1シートのブック
pub fn generate_plain() -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Sheet1")?;
    sheet.write_string(0, 0, "Hello")?;
    workbook.save_to_buffer()
}

/// 保護シートと非保護シートが混在するブック
pub fn generate_mixed() -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();

    let open = workbook.add_worksheet();
    open.set_name("Open")?;
    open.write_string(0, 0, "editable")?;

    let locked = workbook.add_worksheet();
    locked.set_name("Locked")?;
    locked.write_string(0, 0, "read only")?;
    locked.protect();

    workbook.save_to_buffer()
}

/// ZIPの全エントリを（名前, 内容）で読み出す
pub fn read_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        entries.push((file.name().to_string(), data));
    }
    entries
}

/// （名前, 内容）の列からZIPを作成する
pub fn write_entries(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(name.as_str(), FileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// ZIPファイル内のパーツをUTF-8文字列として読み出す
pub fn read_part(path: &Path, name: &str) -> Option<String> {
    let bytes = std::fs::read(path).unwrap();
    read_entries(&bytes)
        .into_iter()
        .find(|(entry, _)| entry == name)
        .map(|(_, data)| String::from_utf8(data).unwrap())
}

/// .xlsxをマクロ有効ブックに変換する
///
/// VBAプロジェクトパーツ・リレーションシップ・Content Typeを追加し、
/// `workbook_lock`が真ならブック保護も追加する。
pub fn make_macro_enabled(xlsx: &[u8], workbook_lock: bool) -> Vec<u8> {
    let mut entries = read_entries(xlsx);

    for (name, data) in entries.iter_mut() {
        let mut text = match String::from_utf8(data.clone()) {
            Ok(text) => text,
            Err(_) => continue,
        };
        match name.as_str() {
            "[Content_Types].xml" => {
                assert!(text.contains(STANDARD_MAIN));
                text = text.replace(STANDARD_MAIN, MACRO_ENABLED_MAIN);
                let types_start = text.find("<Types").unwrap();
                let insert_at = types_start + text[types_start..].find('>').unwrap() + 1;
                text.insert_str(insert_at, VBA_DEFAULT);
            }
            "xl/_rels/workbook.xml.rels" => {
                text = text.replace(
                    "</Relationships>",
                    &format!("{}</Relationships>", VBA_RELATIONSHIP),
                );
            }
            "xl/workbook.xml" if workbook_lock => {
                assert!(text.contains("<bookViews>"));
                text = text.replace("<bookViews>", &format!("{}<bookViews>", WORKBOOK_PROTECTION));
            }
            _ => continue,
        }
        *data = text.into_bytes();
    }

    entries.push(("xl/vbaProject.bin".to_string(), b"fake-vba-project".to_vec()));
    write_entries(&entries)
}

const MACRO_SHEET_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xm:macrosheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:xm="http://schemas.microsoft.com/office/excel/2006/main"><sheetData><row r="1"><c r="A1"><f>EXEC("calc.exe")</f></c></row><row r="2"><c r="A2"><f>RETURN()</f></c></row></sheetData></xm:macrosheet>"#;
const MACRO_SHEET_OVERRIDE: &str = r#"<Override PartName="/xl/macrosheets/sheet1.xml" ContentType="application/vnd.ms-excel.macrosheet+xml"/>"#;
const MACRO_SHEET_RELATIONSHIP: &str = r#"<Relationship Id="rIdMacro1" Type="http://schemas.microsoft.com/office/2006/relationships/xlMacrosheet" Target="macrosheets/sheet1.xml"/>"#;
const MACRO_SHEET_ENTRY: &str = r#"<sheet name="Macro1" sheetId="99" r:id="rIdMacro1"/>"#;

/// Excel 4.0マクロシート"Macro1"をブックの先頭シートとして追加する
///
/// シート位置を参照する名前（`localSheetId`）と`activeTab`も併せて追加する。
/// 追加後の位置は Macro1=0, 既存の1枚目=1, 2枚目=2。
pub fn add_macro_sheet(xlsm: &[u8]) -> Vec<u8> {
    let mut entries = read_entries(xlsm);

    for (name, data) in entries.iter_mut() {
        let mut text = match String::from_utf8(data.clone()) {
            Ok(text) => text,
            Err(_) => continue,
        };
        match name.as_str() {
            "[Content_Types].xml" => {
                text = text.replace("</Types>", &format!("{}</Types>", MACRO_SHEET_OVERRIDE));
            }
            "xl/_rels/workbook.xml.rels" => {
                text = text.replace(
                    "</Relationships>",
                    &format!("{}</Relationships>", MACRO_SHEET_RELATIONSHIP),
                );
            }
            "xl/workbook.xml" => {
                assert!(text.contains("<sheets>") && text.contains("<workbookView "));
                text = text.replace("<sheets>", &format!("<sheets>{}", MACRO_SHEET_ENTRY));
                text = text.replace(
                    "</sheets>",
                    concat!(
                        "</sheets><definedNames>",
                        r#"<definedName name="Auto_Open" localSheetId="0">Macro1!$A$1</definedName>"#,
                        r#"<definedName name="_xlnm.Print_Area" localSheetId="1">Data!$A$1:$B$3</definedName>"#,
                        "</definedNames>"
                    ),
                );
                text = text.replace("<workbookView ", r#"<workbookView activeTab="1" "#);
            }
            _ => continue,
        }
        *data = text.into_bytes();
    }

    entries.push(("xl/macrosheets/sheet1.xml".to_string(), MACRO_SHEET_XML.as_bytes().to_vec()));
    write_entries(&entries)
}

/// 開くためのパスワードで暗号化されたブックを模したOLE複合ファイル
pub fn encrypted_workbook() -> Vec<u8> {
    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
    ole.create_stream("/EncryptionInfo")
        .unwrap()
        .write_all(&[4, 0, 4, 0, 0x40, 0, 0, 0])
        .unwrap();
    ole.create_stream("/EncryptedPackage")
        .unwrap()
        .write_all(&[0u8; 512])
        .unwrap();
    ole.flush().unwrap();
    ole.into_inner().into_inner()
}
