//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。

use std::path::PathBuf;
use thiserror::Error;

/// xlsmconvクレート全体で使用するエラー型
///
/// ファイル一覧の取得、ワークブックの読み込み、保護解除、保存の各段階で
/// 発生するすべてのエラーを統一的に扱うために使用されます。
///
/// # エラーの種類
///
/// - `Io`: I/O操作中に発生したエラー（読み込み失敗、書き込み失敗など）
/// - `Zip` / `Xml`: パッケージ（ZIP）またはパーツ（XML）の解析エラー
/// - `PasswordProtected`: 開くためのパスワードが必要なファイル（非対応）
/// - `UnsupportedFormat`: OOXML以外の形式（旧形式のバイナリブックなど）
/// - `NotSpreadsheet`: ZIPだがワークブックパーツを持たないファイル
/// - `Verify`: 変換結果をcalamineで再読み込みした際の不一致
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsmconv::XlsmConvError;
/// use std::fs::File;
///
/// fn open_source(path: &str) -> Result<(), XlsmConvError> {
///     let _file = File::open(path)?;  // Ioエラーが自動的に変換される
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum XlsmConvError {
    /// I/O操作中に発生したエラー
    ///
    /// `#[from]`属性により、`std::io::Error`から自動的に変換されます。
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 変換結果の検証時にcalamineが返したエラー
    #[error("Failed to parse Excel file: {0}")]
    Parse(#[from] calamine::Error),

    /// ZIPアーカイブの解析・書き出しエラー
    #[error("ZIP archive error: {0}")]
    Zip(String),

    /// パーツXMLの解析・書き出しエラー
    #[error("XML error in '{part}': {message}")]
    Xml {
        /// エラーが発生したパーツ名
        part: String,
        /// エラーの詳細メッセージ
        message: String,
    },

    /// 開くためのパスワードで暗号化されたファイル
    ///
    /// 暗号化されたOOXMLはZIPではなくOLE複合ファイル
    /// （`EncryptionInfo` / `EncryptedPackage`ストリーム）として保存されます。
    #[error("'{}' is encrypted with an open password; password-protected files are not supported", path.display())]
    PasswordProtected {
        /// 対象ファイルのパス
        path: PathBuf,
    },

    /// サポートされていないファイル形式
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// ワークブックとして解釈できないパッケージ
    #[error("Not a spreadsheet package: {0}")]
    NotSpreadsheet(String),

    /// セキュリティ制限に違反したエラー
    ///
    /// ZIP bomb攻撃、パストラバーサル攻撃、ファイルサイズ制限などの
    /// セキュリティ制限に違反した場合に発生します。
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// 変換結果の検証に失敗したエラー
    #[error("Verification failed: {0}")]
    Verify(String),

    /// 設定の検証に失敗したエラー
    ///
    /// `ConverterBuilder::build()`時に設定を検証し、無効な設定が検出された
    /// 場合に発生します。
    #[error("Configuration error: {0}")]
    Config(String),
}

impl XlsmConvError {
    /// `quick_xml`由来のエラーを、パーツ名付きの`Xml`エラーに変換する
    pub(crate) fn xml(part: &str, err: impl std::fmt::Display) -> Self {
        XlsmConvError::Xml {
            part: part.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for XlsmConvError {
    fn from(err: zip::result::ZipError) -> Self {
        XlsmConvError::Zip(err.to_string())
    }
}
