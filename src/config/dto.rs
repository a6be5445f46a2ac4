//! TOML デシリアライズ用の DTO (Data Transfer Object)
//!
//! # 責務
//!
//! このモジュールは、TOML ファイルからのデータ読み込み専用の構造体を提供します。
//! DTO はバリデーション前の「生データ」を表現し、ドメインモデルとは分離されています。
//!
//! ## 変換フロー
//!
//! ```text
//! TOML ファイル
//!   ↓ (デシリアライズ)
//! TemplateDto / SettingsDto
//!   ↓ (TryFrom でバリデーション)
//! WorkflowTemplate / EngineSettings (ドメインモデル)
//! ```

use serde::{Deserialize, Serialize};

use super::step::Params;

/// ワークフローテンプレート DTO
///
/// TOML の `[template]` セクションと `[[steps]]` 配列をデシリアライズ/シリアライズします。
///
/// **注**: この構造体は config モジュール内部の実装詳細です。
/// 外部からは [`WorkflowTemplate`](super::template::WorkflowTemplate) を使用してください。
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct TemplateDto {
    /// テンプレートのメタデータ
    pub(super) template: TemplateMetadataDto,
    /// ステップの配列
    #[serde(default)]
    pub(super) steps: Vec<StepDto>,
}

/// テンプレートメタデータ DTO
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct TemplateMetadataDto {
    pub(super) key: String,
    pub(super) name: String,
}

/// ステップ DTO
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct StepDto {
    #[serde(rename = "type")]
    pub(super) step_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) max_retries: Option<u32>,
    #[serde(default)]
    pub(super) params: Params,
}

/// エンジン設定 DTO
///
/// すべてのセクションは省略可能で、省略時はデフォルト値が使われます。
#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct SettingsDto {
    #[serde(default)]
    pub(super) engine: EngineSectionDto,
    #[serde(default)]
    pub(super) log: LogSectionDto,
    #[serde(default)]
    pub(super) notify: NotifySectionDto,
    #[serde(default)]
    pub(super) templates: TemplatesSectionDto,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct EngineSectionDto {
    pub(super) default_max_retries: Option<u32>,
    pub(super) backoff_unit_ms: Option<u64>,
    pub(super) max_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct LogSectionDto {
    pub(super) level: Option<String>,
    pub(super) format: Option<String>,
    pub(super) directory: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct NotifySectionDto {
    pub(super) webhook_url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct TemplatesSectionDto {
    pub(super) directory: Option<String>,
}
