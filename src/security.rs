//! Security Module
//!
//! パッケージ読み込み時のセキュリティ対策を実装するモジュール。
//! ZIP bomb攻撃、パストラバーサル攻撃、巨大ファイルへの対策を提供します。

use crate::error::XlsmConvError;

/// セキュリティ設定
///
/// パッケージ読み込み時のセキュリティ制限を定義します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    /// 展開後の最大サイズ（バイト）
    /// デフォルト: 1GB (1_073_741_824 bytes)
    pub max_decompressed_size: u64,
    /// ZIPアーカイブ内の最大ファイル数
    /// デフォルト: 10000
    pub max_file_count: usize,
    /// 単一ファイルの最大サイズ（バイト）
    /// デフォルト: 100MB (104_857_600 bytes)
    pub max_file_size: u64,
    /// 入力ファイルの最大サイズ（バイト）
    /// デフォルト: 2GB (2_147_483_648 bytes)
    pub max_input_file_size: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_decompressed_size: 1_073_741_824, // 1GB
            max_file_count: 10_000,
            max_file_size: 104_857_600,         // 100MB
            max_input_file_size: 2_147_483_648, // 2GB
        }
    }
}

impl SecurityConfig {
    /// 設定値の妥当性を検証する
    ///
    /// いずれかの上限が0の場合、どのファイルも読み込めないため設定エラーとします。
    pub(crate) fn validate(&self) -> Result<(), XlsmConvError> {
        if self.max_decompressed_size == 0
            || self.max_file_count == 0
            || self.max_file_size == 0
            || self.max_input_file_size == 0
        {
            return Err(XlsmConvError::Config(
                "Security limits must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// 入力ファイルサイズの上限チェック
    pub(crate) fn check_input_size(&self, size: u64) -> Result<(), XlsmConvError> {
        if size > self.max_input_file_size {
            return Err(XlsmConvError::SecurityViolation(format!(
                "Input file size exceeds maximum: {} bytes (max: {} bytes)",
                size, self.max_input_file_size
            )));
        }
        Ok(())
    }
}

/// アーカイブ全体の展開サイズを累計しながら上限を検査するカウンタ
#[derive(Debug)]
pub(crate) struct ArchiveBudget<'a> {
    config: &'a SecurityConfig,
    total_decompressed_size: u64,
}

impl<'a> ArchiveBudget<'a> {
    /// ファイル数の上限を検査し、カウンタを生成する
    pub fn new(config: &'a SecurityConfig, file_count: usize) -> Result<Self, XlsmConvError> {
        if file_count > config.max_file_count {
            return Err(XlsmConvError::SecurityViolation(format!(
                "ZIP archive contains too many files: {} (max: {})",
                file_count, config.max_file_count
            )));
        }
        Ok(Self {
            config,
            total_decompressed_size: 0,
        })
    }

    /// 1エントリ分のパスとサイズを検査し、累計に加算する
    pub fn admit(&mut self, name: &str, size: u64) -> Result<(), XlsmConvError> {
        validate_zip_path(name)
            .map_err(|e| XlsmConvError::SecurityViolation(format!("Invalid ZIP path: {}", e)))?;

        if size > self.config.max_file_size {
            return Err(XlsmConvError::SecurityViolation(format!(
                "File '{}' exceeds maximum size: {} bytes (max: {} bytes)",
                name, size, self.config.max_file_size
            )));
        }

        self.total_decompressed_size = self
            .total_decompressed_size
            .checked_add(size)
            .ok_or_else(|| {
                XlsmConvError::SecurityViolation(
                    "Total decompressed size calculation overflow".to_string(),
                )
            })?;

        if self.total_decompressed_size > self.config.max_decompressed_size {
            return Err(XlsmConvError::SecurityViolation(format!(
                "Total decompressed size exceeds maximum: {} bytes (max: {} bytes)",
                self.total_decompressed_size, self.config.max_decompressed_size
            )));
        }
        Ok(())
    }
}

/// ファイルパスの検証
///
/// パストラバーサル攻撃を防ぐため、ZIPエントリのパスを検証します。
///
/// # 戻り値
///
/// * `Ok(())` - パスが安全な場合
/// * `Err(String)` - パスが危険な場合（`..`や絶対パスを含む）
pub(crate) fn validate_zip_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Empty path is not allowed".to_string());
    }

    // 絶対パスを拒否（Windows形式の`C:\`やUnix形式の`/`で始まるパス）
    if path.starts_with('/') || path.starts_with("C:\\") || path.starts_with("c:\\") {
        return Err(format!("Absolute path is not allowed: {}", path));
    }

    if path.split('/').any(|segment| segment == "..") {
        return Err(format!("Path traversal detected: {}", path));
    }

    if path.contains('\\') {
        return Err(format!("Backslash in path is not allowed: {}", path));
    }

    Ok(())
}
