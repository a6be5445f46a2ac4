//! ワークフローステップの定義
//!
//! # 責務
//!
//! Workflow を構成する Step の種別 [`StepType`] と、ワークフロー生成時に
//! 呼び出し側が渡すステップ定義 [`StepSpec`] を提供するモジュール。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dto::StepDto;

/// ステップのパラメーター（ハンドラー固有、エンジンからは不透明）
pub type Params = serde_json::Map<String, Value>;

/// ステップ種別
///
/// 種別の集合は閉じており、各種別にちょうど1つのハンドラースロットが対応します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// コンテンツ生成
    Generate,
    /// 品質チェック
    QaCheck,
    /// 品質改善（再生成）
    Enhance,
    /// オーディエンスターゲティング
    Target,
    /// プラットフォームへのアップロード
    Upload,
    /// 投稿スケジュール
    Schedule,
    /// 通知
    Notify,
}

impl StepType {
    /// すべてのステップ種別（定義順）
    pub const ALL: [StepType; 7] = [
        StepType::Generate,
        StepType::QaCheck,
        StepType::Enhance,
        StepType::Target,
        StepType::Upload,
        StepType::Schedule,
        StepType::Notify,
    ];

    /// 種別の文字列表現（ステップ名のデフォルト値にもなる）
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Generate => "generate",
            StepType::QaCheck => "qa_check",
            StepType::Enhance => "enhance",
            StepType::Target => "target",
            StepType::Upload => "upload",
            StepType::Schedule => "schedule",
            StepType::Notify => "notify",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知のステップ種別文字列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStepType(pub String);

impl fmt::Display for UnknownStepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "未知のステップ種別です: {}", self.0)
    }
}

impl std::error::Error for UnknownStepType {}

impl FromStr for StepType {
    type Err = UnknownStepType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownStepType(s.to_string()))
    }
}

/// ステップ定義（呼び出し側の入力）
///
/// `{type, name, params}` の三つ組です。種別は文字列のまま保持し、
/// ワークフロー生成時に [`StepType`] へ検証・変換されます。
///
/// # 例
///
/// ```rust
/// use content_workflow::config::step::StepSpec;
/// use serde_json::json;
///
/// let spec = StepSpec::new("qa_check").param("min_quality", json!(0.9));
/// assert_eq!(spec.resolved_name(), "qa_check");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// ステップ種別の文字列（例: "generate"）
    #[serde(rename = "type")]
    pub step_type: String,

    /// ステップ名（省略時は種別文字列）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// ハンドラー固有のパラメーター
    #[serde(default)]
    pub params: Params,

    /// リトライ上限（省略時はエンジン設定のデフォルト）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl StepSpec {
    /// 種別文字列からステップ定義を生成
    pub fn new(step_type: impl Into<String>) -> Self {
        Self {
            step_type: step_type.into(),
            name: None,
            params: Params::new(),
            max_retries: None,
        }
    }

    /// ステップ名を設定
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// パラメーターを1つ追加
    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// リトライ上限を設定
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// 実際に使われるステップ名
    pub fn resolved_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.step_type)
    }
}

impl From<StepDto> for StepSpec {
    fn from(dto: StepDto) -> Self {
        Self {
            step_type: dto.step_type,
            name: dto.name,
            params: dto.params,
            max_retries: dto.max_retries,
        }
    }
}

impl From<StepSpec> for StepDto {
    fn from(spec: StepSpec) -> Self {
        Self {
            step_type: spec.step_type,
            name: spec.name,
            params: spec.params,
            max_retries: spec.max_retries,
        }
    }
}
