//! ステータス報告とエンジンエラーの型定義
//!
//! # 主要な型
//!
//! - [`WorkflowSnapshot`][]: ワークフローの状態を外部に報告するためのスナップショット
//! - [`StepSummary`][]: スナップショット内のステップ要約
//! - [`EngineError`][]: エンジン操作（生成・実行・照会）のエラー型
//!
//! # 使用例
//!
//! ```rust,no_run
//! use content_workflow::engine::result::WorkflowSnapshot;
//!
//! fn report(snapshot: &WorkflowSnapshot) {
//!     println!("ワークフロー: {} ({})", snapshot.name, snapshot.status);
//!     for step in &snapshot.steps {
//!         println!("  {} [{}]: {}", step.name, step.step_type, step.status);
//!     }
//!     if let Ok(json) = snapshot.to_json() {
//!         println!("{json}");
//!     }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::state::{Payload, Step, Workflow, WorkflowStatus};
use crate::config::step::StepType;
use crate::error::ConfigError;

/// ワークフローのスナップショット
///
/// `results` は報告時点の結果マップのコピーです。
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSnapshot {
    pub id: String,
    pub name: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepSummary>,
    pub results: Payload,
}

impl WorkflowSnapshot {
    /// JSON 形式でシリアライズ
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 終端状態に達しているか
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// 指定したステータスのステップ数
    pub fn count_steps(&self, status: WorkflowStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

impl From<&Workflow> for WorkflowSnapshot {
    fn from(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            status: workflow.status,
            created_at: workflow.created_at,
            started_at: workflow.started_at,
            completed_at: workflow.completed_at,
            steps: workflow.steps.iter().map(StepSummary::from).collect(),
            results: workflow.results.clone(),
        }
    }
}

/// ステップの要約
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub status: WorkflowStatus,
    /// エラーメッセージ（失敗時のみ）
    pub error: Option<String>,
    pub retry_count: u32,
}

impl From<&Step> for StepSummary {
    fn from(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            step_type: step.step_type,
            status: step.status,
            error: step.error.clone(),
            retry_count: step.retry_count,
        }
    }
}

/// エンジン操作のエラー型
///
/// ステップ単位の失敗（[`crate::error::StepError`]）はステップの `error` に記録され、
/// このエラーとしては返りません。
#[derive(Debug, Error)]
pub enum EngineError {
    /// 指定された ID のワークフローが存在しない
    #[error("ワークフロー '{0}' が見つかりません")]
    NotFound(String),

    /// 同じワークフローが既に実行中
    #[error("ワークフロー '{0}' は既に実行中です")]
    AlreadyRunning(String),

    /// 未知のステップ種別
    #[error("不正なステップ種別です: {0}")]
    InvalidStepType(String),

    /// 未登録のテンプレート
    #[error("テンプレート '{0}' が見つかりません")]
    TemplateNotFound(String),

    /// 実行中のワークフローは削除できない
    #[error("ワークフロー '{0}' は実行中のため削除できません")]
    StillRunning(String),

    /// 設定エラー（ステップ定義の不備等）
    #[error("設定エラー: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// ハンドラーのタスクが異常終了した
    #[error("ステップ '{step}' の実行が中断されました: {reason}")]
    HandlerAborted { step: String, reason: String },
}
