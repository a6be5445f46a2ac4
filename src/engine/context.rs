//! ステップ実行コンテキストの構築
//!
//! # 責務
//!
//! - ハンドラーに渡す読み取り専用のスナップショット [`StepContext`] を構築
//! - 現在のステップより前にあり、かつ Completed のステップの結果だけを集める
//!
//! ステップ同士がデータを受け渡す手段はこのスナップショットだけです。
//!
//! # 使用例
//!
//! ```rust
//! use content_workflow::config::step::{Params, StepType};
//! use content_workflow::engine::{Step, StepContext, Workflow};
//!
//! let workflow = Workflow::new(
//!     "example",
//!     vec![
//!         Step::new(StepType::Generate, "generate", Params::new(), 3),
//!         Step::new(StepType::QaCheck, "qa_check", Params::new(), 3),
//!     ],
//!     Params::new(),
//! );
//!
//! let ctx = StepContext::build(&workflow, &workflow.steps[1].id);
//! assert_eq!(ctx.workflow_id, workflow.id);
//! assert!(ctx.previous("generate").is_none()); // まだ完了していない
//! ```

use serde::Serialize;
use serde_json::Value;

use super::state::{Payload, Workflow, WorkflowStatus};
use crate::config::step::Params;

/// ステップ実行コンテキスト
///
/// # フィールド
///
/// - `workflow_id`: 実行中のワークフロー ID
/// - `workflow_name`: ワークフロー名
/// - `workflow_status`: 構築時点のワークフローステータス
/// - `metadata`: ワークフロー生成時のメタデータ
/// - `previous_results`: 先行する完了済みステップの結果（ステップ名 → 結果）
#[derive(Debug, Clone, Serialize)]
pub struct StepContext {
    pub workflow_id: String,
    pub workflow_name: String,
    pub workflow_status: WorkflowStatus,
    pub metadata: Params,
    pub previous_results: Payload,
}

impl StepContext {
    /// ワークフローと現在のステップ ID からコンテキストを構築
    ///
    /// `workflow.steps` を先頭から走査し、`current_step_id` に到達した時点で止めます。
    /// 同名のステップが複数完了している場合は後のものが優先されます。
    pub fn build(workflow: &Workflow, current_step_id: &str) -> Self {
        let mut previous_results = Payload::new();

        for step in &workflow.steps {
            if step.id == current_step_id {
                break;
            }
            if let (WorkflowStatus::Completed, Some(result)) = (step.status, &step.result) {
                previous_results.insert(step.name.clone(), Value::Object(result.clone()));
            }
        }

        Self {
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            workflow_status: workflow.status,
            metadata: workflow.metadata.clone(),
            previous_results,
        }
    }

    /// 先行ステップの結果を名前で取得
    pub fn previous(&self, step_name: &str) -> Option<&Payload> {
        self.previous_results.get(step_name).and_then(Value::as_object)
    }
}
