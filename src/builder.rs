//! Builder Module
//!
//! Fluent Builder APIを提供し、`Converter`インスタンスを段階的に構築する。

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::XlsmConvError;
use crate::package::Package;
use crate::security::SecurityConfig;
use crate::workbook::{unlock, ConversionSummary, UnlockedWorkbook};

/// 変換処理の設定を保持する内部構造体
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConversionConfig {
    /// 読み込み時のセキュリティ制限
    pub security: SecurityConfig,

    /// 保存前にcalamineで変換結果を検証するか
    pub verify_output: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            security: SecurityConfig::default(),
            verify_output: true,
        }
    }
}

/// Fluent Builder APIを提供する構造体
///
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみをオーバーライドできます。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsmconv::{ConverterBuilder, SecurityConfig};
///
/// # fn main() -> Result<(), xlsmconv::XlsmConvError> {
/// let converter = ConverterBuilder::new()
///     .with_security_config(SecurityConfig {
///         max_file_size: 10 * 1024 * 1024,
///         ..SecurityConfig::default()
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConverterBuilder {
    /// 内部設定（構築中）
    config: ConversionConfig,
}

impl ConverterBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - セキュリティ制限: `SecurityConfig::default()`
    /// - 変換結果の検証: 有効
    pub fn new() -> Self {
        Self {
            config: ConversionConfig::default(),
        }
    }

    /// 読み込み時のセキュリティ制限を指定する
    pub fn with_security_config(mut self, security: SecurityConfig) -> Self {
        self.config.security = security;
        self
    }

    /// 保存前にcalamineで変換結果を再読み込みして検証するかを指定する
    ///
    /// 無効にすると、シート構成の確認とVBAプロジェクトの残存確認を省略します。
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.config.verify_output = verify;
        self
    }

    /// 設定を検証し、`Converter`インスタンスを生成する
    ///
    /// # 発生し得るエラー
    ///
    /// * `XlsmConvError::Config(String)`: セキュリティ制限に0が指定された場合
    pub fn build(self) -> Result<Converter, XlsmConvError> {
        self.config.security.validate()?;
        Ok(Converter {
            config: self.config,
        })
    }
}

/// 変換処理のファサード
///
/// マクロ有効ブック（.xlsm）を読み込み、保護とマクロを取り除いて標準ブック（.xlsx）として保存します。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsmconv::ConverterBuilder;
///
/// # fn main() -> Result<(), xlsmconv::XlsmConvError> {
/// let converter = ConverterBuilder::new().build()?;
/// let summary = converter.convert("src/report.xlsm", "converted/report.xlsx")?;
/// println!("unprotected: {:?}", summary.unprotected_sheets);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Converter {
    /// 変換設定
    config: ConversionConfig,
}

impl Converter {
    /// ファイルを読み込み、保護解除とマクロ除去を行う
    ///
    /// ファイルは読み取り専用で開き、読み込み後すぐに閉じます。
    ///
    /// # 発生し得るエラー
    ///
    /// * `Io` - ファイルを読み込めない
    /// * `PasswordProtected` - 開くためのパスワードで暗号化されている
    /// * `UnsupportedFormat` / `Zip` / `NotSpreadsheet` / `Xml` - 破損または非対応の形式
    /// * `SecurityViolation` - サイズ・ファイル数などの制限超過
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<UnlockedWorkbook, XlsmConvError> {
        let path = path.as_ref();
        let bytes = {
            let mut file = File::open(path)?;
            let size = file.metadata()?.len();
            self.config.security.check_input_size(size)?;

            let mut bytes = Vec::with_capacity(size as usize);
            file.read_to_end(&mut bytes)?;
            bytes
        };
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "read source workbook");
        self.load_from_bytes(path, &bytes)
    }

    /// メモリ上のバイト列から読み込む
    ///
    /// `source`はエラーメッセージにのみ使用します。
    pub fn load_from_bytes(
        &self,
        source: &Path,
        bytes: &[u8],
    ) -> Result<UnlockedWorkbook, XlsmConvError> {
        let package = Package::from_bytes(source, bytes, &self.config.security)?;
        unlock(package, self.config.verify_output)
    }

    /// 読み込みから保存までを一度に行う
    pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> Result<ConversionSummary, XlsmConvError> {
        self.load(input)?.save(output)
    }
}
