//! エンジン設定
//!
//! # 責務
//!
//! TOML で記述されたエンジン設定を読み込み、バリデーション済みの
//! [`EngineSettings`] に変換します。すべての項目は省略可能です。
//!
//! ```toml
//! [engine]
//! default_max_retries = 3
//! backoff_unit_ms = 1000
//! max_backoff_ms = 60000
//!
//! [log]
//! level = "info"
//! format = "json"
//! directory = "logs"
//!
//! [notify]
//! webhook_url = "https://hooks.example.com/workflow"
//!
//! [templates]
//! directory = "workflows"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::dto::SettingsDto;
use crate::error::ConfigError;

/// ステップごとのリトライ上限の最大値
///
/// バックオフは `2^retry_count` で伸びるため、上限を設けています。
pub const MAX_RETRIES_LIMIT: u32 = 16;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;

/// ログの出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 人間向けのテキスト
    #[default]
    Text,
    /// 構造化 JSON
    Json,
}

/// ログ設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` 形式のレベル指定（例: "info", "content_workflow=debug"）
    pub level: String,
    /// stderr への出力形式
    pub format: LogFormat,
    /// 指定時は日次ローテーションの JSON ログをこのディレクトリに書き出す
    pub directory: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            directory: None,
        }
    }
}

/// バリデーション済みのエンジン設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// ステップ定義で省略された場合のリトライ上限
    pub default_max_retries: u32,
    /// バックオフの単位時間（`2^n` 倍される）
    pub backoff_unit: Duration,
    /// バックオフの最大値
    pub max_backoff: Duration,
    /// ログ設定
    pub log: LogSettings,
    /// 通知 Webhook の URL
    pub webhook_url: Option<String>,
    /// 追加テンプレートのディレクトリ
    pub templates_dir: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: Duration::from_millis(DEFAULT_BACKOFF_UNIT_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            log: LogSettings::default(),
            webhook_url: None,
            templates_dir: None,
        }
    }
}

impl EngineSettings {
    /// TOML ファイルから設定を読み込む
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// TOML 文字列から設定を読み込む
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let dto: SettingsDto = toml::from_str(toml)?;
        Self::try_from(dto)
    }

    /// バックオフ単位を変更（テストや短時間実行向け）
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        if self.max_backoff < unit {
            self.max_backoff = unit;
        }
        self
    }

    /// デフォルトのリトライ上限を変更
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries.min(MAX_RETRIES_LIMIT);
        self
    }
}

impl TryFrom<SettingsDto> for EngineSettings {
    type Error = ConfigError;

    fn try_from(dto: SettingsDto) -> Result<Self, Self::Error> {
        let default_max_retries = dto.engine.default_max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if default_max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Validation(format!(
                "default_max_retries は {MAX_RETRIES_LIMIT} 以下にしてください"
            )));
        }

        let backoff_unit_ms = dto.engine.backoff_unit_ms.unwrap_or(DEFAULT_BACKOFF_UNIT_MS);
        if backoff_unit_ms == 0 {
            return Err(ConfigError::Validation(
                "backoff_unit_ms は 1 以上にしてください".to_string(),
            ));
        }
        let max_backoff_ms = dto
            .engine
            .max_backoff_ms
            .unwrap_or(DEFAULT_MAX_BACKOFF_MS.max(backoff_unit_ms));
        if max_backoff_ms < backoff_unit_ms {
            return Err(ConfigError::Validation(
                "max_backoff_ms は backoff_unit_ms 以上にしてください".to_string(),
            ));
        }

        let format = match dto.log.format.as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Validation(format!(
                    "未知のログ形式です: {other}（text または json）"
                )));
            }
        };

        let webhook_url = dto.notify.webhook_url.filter(|url| !url.trim().is_empty());
        if let Some(url) = &webhook_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(ConfigError::Validation(format!(
                "webhook_url は http(s) の URL にしてください: {url}"
            )));
        }

        Ok(Self {
            default_max_retries,
            backoff_unit: Duration::from_millis(backoff_unit_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
            log: LogSettings {
                level: dto.log.level.unwrap_or_else(|| "info".to_string()),
                format,
                directory: dto.log.directory.map(PathBuf::from),
            },
            webhook_url,
            templates_dir: dto.templates.directory.map(PathBuf::from),
        })
    }
}
