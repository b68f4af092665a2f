//! Package Module
//!
//! OOXMLパッケージ（ZIPアーカイブ）をメモリ上のパーツ列として保持するモジュール。
//! 読み込み時にセキュリティ制限を適用し、暗号化されたファイルを判別します。

use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::XlsmConvError;
use crate::protection::{relationships, resolve_target};
use crate::security::{ArchiveBudget, SecurityConfig};

/// OLE複合ファイルのシグネチャ
///
/// 開くためのパスワードで暗号化されたOOXMLや、旧形式の`.xls`はこの形式で保存されます。
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// ZIPのローカルファイルヘッダのシグネチャ
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// パッケージ内の1パーツ
#[derive(Debug, Clone)]
pub(crate) struct Part {
    pub name: String,
    pub data: Vec<u8>,
}

/// メモリ上のOOXMLパッケージ
///
/// パーツは元のアーカイブ内の順序を維持します（`[Content_Types].xml`が先頭のまま保存されるように）。
#[derive(Debug, Clone)]
pub(crate) struct Package {
    parts: Vec<Part>,
}

impl Package {
    /// ファイル内容からパッケージを構築する
    ///
    /// # 引数
    ///
    /// * `source` - エラーメッセージに使用する元ファイルのパス
    /// * `bytes` - ファイル全体のバイト列
    /// * `security` - 適用するセキュリティ制限
    pub fn from_bytes(
        source: &Path,
        bytes: &[u8],
        security: &SecurityConfig,
    ) -> Result<Self, XlsmConvError> {
        security.check_input_size(bytes.len() as u64)?;
        sniff_container(source, bytes)?;

        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut budget = ArchiveBudget::new(security, archive.len())?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            budget.admit(&name, file.size())?;

            // 宣言サイズを偽装したエントリに備え、実際の展開量も上限で打ち切る
            let mut data = Vec::with_capacity(file.size() as usize);
            Read::by_ref(&mut file)
                .take(security.max_file_size + 1)
                .read_to_end(&mut data)?;
            if data.len() as u64 > security.max_file_size {
                return Err(XlsmConvError::SecurityViolation(format!(
                    "File '{}' exceeds maximum size: {} bytes (max: {} bytes)",
                    name,
                    data.len(),
                    security.max_file_size
                )));
            }
            parts.push(Part { name, data });
        }

        tracing::debug!(parts = parts.len(), "loaded package");
        Ok(Self { parts })
    }

    /// パーツ名の一覧
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    /// パーツの内容を取得する
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.data.as_slice())
    }

    /// 既存パーツの内容を置き換える（存在しない場合は末尾に追加）
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.parts.iter_mut().find(|p| p.name == name) {
            Some(part) => part.data = data,
            None => self.parts.push(Part {
                name: name.to_string(),
                data,
            }),
        }
    }

    /// パーツを削除する。削除した場合は`true`
    pub fn remove_part(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|p| p.name != name);
        before != self.parts.len()
    }

    /// メインのワークブックパーツ名を`_rels/.rels`から解決する
    ///
    /// ルートのリレーションシップが無い場合は`xl/workbook.xml`を試します。
    pub fn workbook_part(&self) -> Result<String, XlsmConvError> {
        if let Some(xml) = self.part("_rels/.rels") {
            let office_document = relationships("_rels/.rels", xml)?
                .into_iter()
                .find(|rel| rel.kind() == "officeDocument" && !rel.external);
            if let Some(rel) = office_document {
                let name = resolve_target("", &rel.target);
                if self.part(&name).is_some() {
                    return Ok(name);
                }
            }
        }

        let fallback = "xl/workbook.xml";
        if self.part(fallback).is_some() {
            return Ok(fallback.to_string());
        }
        Err(XlsmConvError::NotSpreadsheet(
            "the package has no workbook part".to_string(),
        ))
    }

    /// パッケージをZIPアーカイブとしてシリアライズする
    pub fn to_bytes(&self) -> Result<Vec<u8>, XlsmConvError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for part in &self.parts {
            writer.start_file(part.name.as_str(), options)?;
            writer.write_all(&part.data)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// コンテナ形式を判別し、ZIP以外を適切なエラーに振り分ける
fn sniff_container(source: &Path, bytes: &[u8]) -> Result<(), XlsmConvError> {
    if bytes.starts_with(&OLE_MAGIC) {
        if is_encrypted_ooxml(bytes) {
            return Err(XlsmConvError::PasswordProtected {
                path: source.to_path_buf(),
            });
        }
        return Err(XlsmConvError::UnsupportedFormat(format!(
            "'{}' is a legacy binary (OLE) workbook, not an Open XML package",
            source.display()
        )));
    }
    if !bytes.starts_with(&ZIP_MAGIC) {
        return Err(XlsmConvError::UnsupportedFormat(format!(
            "'{}' is not a ZIP-based Open XML package (the file may be corrupted)",
            source.display()
        )));
    }
    Ok(())
}

/// 暗号化OOXML（`EncryptionInfo`と`EncryptedPackage`ストリームを持つOLE）かどうか
fn is_encrypted_ooxml(bytes: &[u8]) -> bool {
    let ole = match cfb::CompoundFile::open(Cursor::new(bytes)) {
        Ok(ole) => ole,
        Err(_) => return false,
    };
    let has_stream = |name: &str| ole.exists(name) || ole.exists(format!("/{}", name));
    has_stream("EncryptionInfo") && has_stream("EncryptedPackage")
}
