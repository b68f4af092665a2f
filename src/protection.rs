//! Protection & Macro Rewrite Module
//!
//! パッケージ内のXMLパーツをストリーミングで書き換えるモジュール。
//! `quick-xml`のイベントをそのまま書き戻し、対象要素だけを削除・置換することで、
//! セル内容や書式など他のすべての情報をバイト単位で維持します。

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::XlsmConvError;

/// マクロ有効ブックのメインパーツのContent Type
pub(crate) const MACRO_ENABLED_MAIN: &str = "application/vnd.ms-excel.sheet.macroEnabled.main+xml";

/// 標準ブック（.xlsx）のメインパーツのContent Type
pub(crate) const STANDARD_MAIN: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";

/// VBAプロジェクトパーツのContent Type
pub(crate) const VBA_PROJECT_CONTENT_TYPE: &str = "application/vnd.ms-office.vbaProject";

/// 要素単位のフィルタ結果
pub(crate) enum Keep {
    /// そのまま書き戻す
    Yes,
    /// 要素（子要素を含む）を削除する
    No,
    /// 開始タグを置き換える
    Replace(BytesStart<'static>),
}

/// 削除された要素の属性（ローカル名, 値）
pub(crate) type Attributes = Vec<(String, String)>;

/// XMLを1パスで走査し、`keep`の判定に従って要素を削除・置換する
///
/// `keep`は削除範囲の外側にある開始タグ・空要素タグに対してのみ呼ばれます。
pub(crate) fn filter_elements<F>(part: &str, xml: &[u8], mut keep: F) -> Result<Vec<u8>, XlsmConvError>
where
    F: FnMut(&BytesStart<'_>) -> Result<Keep, XlsmConvError>,
{
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    // 削除中の要素のネスト深さ（0なら削除中ではない）
    let mut skip_depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XlsmConvError::xml(part, e))?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        let output = match event {
            Event::Eof => break,
            Event::Start(e) => match keep(&e)? {
                Keep::Yes => Event::Start(e),
                Keep::No => {
                    skip_depth = 1;
                    continue;
                }
                Keep::Replace(replacement) => Event::Start(replacement),
            },
            Event::Empty(e) => match keep(&e)? {
                Keep::Yes => Event::Empty(e),
                Keep::No => continue,
                Keep::Replace(replacement) => Event::Empty(replacement),
            },
            other => other,
        };

        writer
            .write_event(output)
            .map_err(|e| XlsmConvError::xml(part, e))?;
    }

    Ok(writer.into_inner())
}

/// 要素の属性を（ローカル名, アンエスケープ済みの値）の組で取得する
pub(crate) fn attributes(part: &str, e: &BytesStart<'_>) -> Result<Attributes, XlsmConvError> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XlsmConvError::xml(part, err))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        // OOXMLパーツはUTF-8
        let raw = std::str::from_utf8(&attr.value).map_err(|err| XlsmConvError::xml(part, err))?;
        let value = unescape(raw)
            .map_err(|err| XlsmConvError::xml(part, err))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(attrs)
}

/// 開始タグを複製し、指定したローカル名の属性値だけを置き換える
///
/// 名前空間接頭辞や他の属性は元のバイト列のまま維持します。
pub(crate) fn replace_attributes(
    part: &str,
    e: &BytesStart<'_>,
    changes: &[(&[u8], String)],
) -> Result<BytesStart<'static>, XlsmConvError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut replacement = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XlsmConvError::xml(part, err))?;
        let local = attr.key.local_name();
        match changes.iter().find(|(key, _)| *key == local.as_ref()) {
            Some((_, value)) => replacement.push_attribute((attr.key.as_ref(), value.as_bytes())),
            None => replacement.push_attribute(attr),
        }
    }
    Ok(replacement)
}

fn attribute<'a>(attrs: &'a Attributes, key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// `xsd:boolean`の真値判定（`1` / `true`）
pub(crate) fn xml_bool(value: &str) -> bool {
    matches!(value.trim(), "1" | "true")
}

/// 指定したローカル名の要素をすべて削除し、削除した要素の属性を返す
pub(crate) fn strip_element(
    part: &str,
    xml: &[u8],
    local_name: &[u8],
) -> Result<(Vec<u8>, Vec<Attributes>), XlsmConvError> {
    let mut removed = Vec::new();
    let rewritten = filter_elements(part, xml, |e| {
        if e.local_name().as_ref() == local_name {
            removed.push(attributes(part, e)?);
            Ok(Keep::No)
        } else {
            Ok(Keep::Yes)
        }
    })?;
    Ok((rewritten, removed))
}

/// ワークシートパーツの保護解除結果
#[derive(Debug)]
pub(crate) struct SheetUnprotect {
    /// 書き換え後のXML
    pub xml: Vec<u8>,
    /// `sheetProtection`要素が1つ以上存在したか
    pub had_element: bool,
    /// シート保護が有効（`sheet="1"`）だったか
    pub was_protected: bool,
}

/// ワークシートから`sheetProtection`を削除する
///
/// 書式・行列の挿入削除・並べ替え・フィルタ・ハイパーリンク・ピボットテーブル等の
/// 個別フラグとパスワードハッシュはすべてこの要素の属性なので、要素ごと削除します。
pub(crate) fn unprotect_sheet(part: &str, xml: &[u8]) -> Result<SheetUnprotect, XlsmConvError> {
    let (xml, removed) = strip_element(part, xml, b"sheetProtection")?;
    let was_protected = removed
        .iter()
        .any(|attrs| attribute(attrs, "sheet").map(xml_bool).unwrap_or(false));
    Ok(SheetUnprotect {
        xml,
        had_element: !removed.is_empty(),
        was_protected,
    })
}

/// ブックから`workbookProtection`（構造・ウィンドウ・変更履歴ロック）を削除する
///
/// 戻り値の`bool`は要素が存在したかどうか。
pub(crate) fn unprotect_workbook(part: &str, xml: &[u8]) -> Result<(Vec<u8>, bool), XlsmConvError> {
    let (xml, removed) = strip_element(part, xml, b"workbookProtection")?;
    for attrs in &removed {
        let locks: Vec<&str> = ["lockStructure", "lockWindows", "lockRevision"]
            .into_iter()
            .filter(|key| attribute(attrs, key).map(xml_bool).unwrap_or(false))
            .collect();
        tracing::debug!(part, ?locks, "removed workbookProtection");
    }
    Ok((xml, !removed.is_empty()))
}

/// `workbook.xml`の`<sheet>`エントリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetEntry {
    /// シート名
    pub name: String,
    /// リレーションシップID（`r:id`）
    pub rel_id: String,
}

/// `workbook.xml`からシート一覧をブック内の順序で取得する
pub(crate) fn workbook_sheets(part: &str, xml: &[u8]) -> Result<Vec<SheetEntry>, XlsmConvError> {
    let mut reader = Reader::from_reader(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event().map_err(|e| XlsmConvError::xml(part, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let attrs = attributes(part, &e)?;
                let name = attribute(&attrs, "name").unwrap_or_default().to_string();
                // `sheetId`とは別に、名前空間付きの`r:id`のローカル名は`id`
                let rel_id = attribute(&attrs, "id").unwrap_or_default().to_string();
                sheets.push(SheetEntry { name, rel_id });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

/// `.rels`パーツの`<Relationship>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    /// リレーションシップ種別URIの末尾セグメント（例: `worksheet`, `vbaProject`）
    pub fn kind(&self) -> &str {
        self.rel_type.rsplit('/').next().unwrap_or(&self.rel_type)
    }
}

fn relationship_from(attrs: &Attributes) -> Relationship {
    Relationship {
        id: attribute(attrs, "Id").unwrap_or_default().to_string(),
        rel_type: attribute(attrs, "Type").unwrap_or_default().to_string(),
        target: attribute(attrs, "Target").unwrap_or_default().to_string(),
        external: attribute(attrs, "TargetMode") == Some("External"),
    }
}

/// `.rels`パーツを解析する
pub(crate) fn relationships(part: &str, xml: &[u8]) -> Result<Vec<Relationship>, XlsmConvError> {
    let mut reader = Reader::from_reader(xml);
    let mut rels = Vec::new();
    loop {
        match reader.read_event().map_err(|e| XlsmConvError::xml(part, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                rels.push(relationship_from(&attributes(part, &e)?));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

/// `doomed`が真を返すリレーションシップを削除し、削除したものを返す
pub(crate) fn remove_relationships<F>(
    part: &str,
    xml: &[u8],
    mut doomed: F,
) -> Result<(Vec<u8>, Vec<Relationship>), XlsmConvError>
where
    F: FnMut(&Relationship) -> bool,
{
    let mut removed = Vec::new();
    let rewritten = filter_elements(part, xml, |e| {
        if e.local_name().as_ref() != b"Relationship" {
            return Ok(Keep::Yes);
        }
        let rel = relationship_from(&attributes(part, e)?);
        if doomed(&rel) {
            removed.push(rel);
            Ok(Keep::No)
        } else {
            Ok(Keep::Yes)
        }
    })?;
    Ok((rewritten, removed))
}

/// `[Content_Types].xml`をマクロなしのブック用に書き換える
///
/// - マクロ有効ブックのメインContent Typeを標準ブックのものに置換
/// - 削除したパーツの`Override`を削除
/// - VBAプロジェクト用の`Default`を削除
pub(crate) fn rewrite_content_types(
    part: &str,
    xml: &[u8],
    removed_parts: &[String],
) -> Result<Vec<u8>, XlsmConvError> {
    filter_elements(part, xml, |e| {
        let local = e.local_name();
        if local.as_ref() != b"Override" && local.as_ref() != b"Default" {
            return Ok(Keep::Yes);
        }

        let attrs = attributes(part, e)?;
        let content_type = attribute(&attrs, "ContentType").unwrap_or_default();

        if content_type == VBA_PROJECT_CONTENT_TYPE {
            return Ok(Keep::No);
        }
        if let Some(part_name) = attribute(&attrs, "PartName") {
            let part_name = part_name.trim_start_matches('/');
            if removed_parts
                .iter()
                .any(|removed| removed.eq_ignore_ascii_case(part_name))
            {
                return Ok(Keep::No);
            }
        }
        if content_type != MACRO_ENABLED_MAIN {
            return Ok(Keep::Yes);
        }

        let changes = [(&b"ContentType"[..], STANDARD_MAIN.to_string())];
        Ok(Keep::Replace(replace_attributes(part, e, &changes)?))
    })
}

/// 整数値の属性（`localSheetId`や`activeTab`など）を読む。無い・数値でない場合は`None`
fn index_attribute(part: &str, e: &BytesStart<'_>, key: &str) -> Result<Option<usize>, XlsmConvError> {
    let attrs = attributes(part, e)?;
    Ok(attribute(&attrs, key).and_then(|value| value.trim().parse().ok()))
}

/// `workbook.xml`から指定した位置（0始まり）の`<sheet>`を削除する
///
/// シート位置を参照する`definedName@localSheetId`と`workbookView@activeTab/firstSheet`も
/// 削除後の位置に合わせて付け替えます。削除したシートにスコープされた名前は削除し、
/// 削除したシートを指していたビューは先頭のシートを指すようにします。
pub(crate) fn remove_sheets(part: &str, xml: &[u8], removed: &[usize]) -> Result<Vec<u8>, XlsmConvError> {
    let remap = |index: usize| -> Option<usize> {
        if removed.contains(&index) {
            None
        } else {
            Some(index - removed.iter().filter(|&&r| r < index).count())
        }
    };

    let mut position = 0usize;
    filter_elements(part, xml, |e| match e.local_name().as_ref() {
        b"sheet" => {
            let index = position;
            position += 1;
            Ok(if removed.contains(&index) { Keep::No } else { Keep::Yes })
        }
        b"definedName" => match index_attribute(part, e, "localSheetId")? {
            Some(index) => match remap(index) {
                None => Ok(Keep::No),
                Some(new) if new != index => {
                    let changes = [(&b"localSheetId"[..], new.to_string())];
                    Ok(Keep::Replace(replace_attributes(part, e, &changes)?))
                }
                Some(_) => Ok(Keep::Yes),
            },
            None => Ok(Keep::Yes),
        },
        b"workbookView" => {
            let mut changes: Vec<(&[u8], String)> = Vec::new();
            for key in ["activeTab", "firstSheet"] {
                if let Some(index) = index_attribute(part, e, key)? {
                    let new = remap(index).unwrap_or(0);
                    if new != index {
                        changes.push((key.as_bytes(), new.to_string()));
                    }
                }
            }
            if changes.is_empty() {
                Ok(Keep::Yes)
            } else {
                Ok(Keep::Replace(replace_attributes(part, e, &changes)?))
            }
        }
        _ => Ok(Keep::Yes),
    })
}

/// パーツのディレクトリ部分（`xl/workbook.xml` → `xl`）
pub(crate) fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// パーツに対応する`.rels`パーツ名（`xl/workbook.xml` → `xl/_rels/workbook.xml.rels`）
pub(crate) fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// リレーションシップのターゲットを、パッケージルートからのパーツ名に解決する
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None if base_dir.is_empty() => target.to_string(),
        None => format!("{}/{}", base_dir, target),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
