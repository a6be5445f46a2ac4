//! ワークフローとステップの実行時レコード
//!
//! # 主要な型
//!
//! - [`WorkflowStatus`][]: ワークフロー・ステップ共通のステータス
//! - [`Step`][]: 1つの作業単位（種別・パラメーター・ステータス・結果・リトライ回数）
//! - [`Workflow`][]: 順序付きのステップ列と集約ステータス・結果マップ
//!
//! レコードはエンジンが排他的に所有し、呼び出し側にはクローンかスナップショットを渡します。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::step::{Params, StepType};

/// ハンドラーが返す結果マップ
pub type Payload = Params;

/// ワークフロー / ステップのステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// 未実行
    Pending,
    /// 実行中
    Running,
    /// 完了
    Completed,
    /// 失敗
    Failed,
    /// キャンセル済み
    Cancelled,
    /// 一時停止
    Paused,
}

impl WorkflowStatus {
    /// 文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
            WorkflowStatus::Paused => "paused",
        }
    }

    /// これ以上遷移しない状態か（Completed / Failed / Cancelled）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ステップレコード
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    /// 一意な ID（生成時に採番）
    pub id: String,
    /// ステップ種別
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// ステップ名（結果マップのキー）
    pub name: String,
    /// ハンドラー固有のパラメーター
    pub params: Params,
    pub status: WorkflowStatus,
    /// 結果（Completed のときのみ）
    pub result: Option<Payload>,
    /// エラーメッセージ（Failed のときのみ）
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 失敗した試行の回数
    pub retry_count: u32,
    /// リトライ上限（試行回数は最大 `max_retries + 1`）
    pub max_retries: u32,
}

impl Step {
    /// Pending 状態のステップを生成
    pub fn new(step_type: StepType, name: impl Into<String>, params: Params, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            step_type,
            name: name.into(),
            params,
            status: WorkflowStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
        }
    }

    /// 実行時の状態を初期化（再実行時に使用）
    pub(crate) fn reset(&mut self) {
        self.status = WorkflowStatus::Pending;
        self.result = None;
        self.error = None;
        self.started_at = None;
        self.completed_at = None;
        self.retry_count = 0;
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = WorkflowStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_completed(&mut self, result: Payload) {
        self.status = WorkflowStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = WorkflowStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// ワークフローレコード
#[derive(Debug, Clone, Serialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    /// 実行順のステップ列（並べ替えない）
    pub steps: Vec<Step>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 生成時に設定され、実行中は読み取り専用
    pub metadata: Params,
    /// ステップ名 → ステップ結果
    pub results: Payload,
}

impl Workflow {
    /// Pending 状態のワークフローを生成
    pub fn new(name: impl Into<String>, steps: Vec<Step>, metadata: Params) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            steps,
            status: WorkflowStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            metadata,
            results: Payload::new(),
        }
    }

    /// 実行開始時の状態に遷移
    ///
    /// 以前の実行結果はすべて破棄されます。
    pub(crate) fn begin_run(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
        self.results.clear();
        self.status = WorkflowStatus::Running;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
    }

    /// 実行が途中で破棄されたときの後始末
    ///
    /// 実行中のステップは Failed、実行中のワークフローは Cancelled になります。
    /// 既に終了状態のワークフローはステータスを変えません。
    pub(crate) fn abandon(&mut self) {
        for step in &mut self.steps {
            if step.status == WorkflowStatus::Running {
                step.mark_failed("実行が中断されました");
            }
        }
        if self.status == WorkflowStatus::Running {
            self.status = WorkflowStatus::Cancelled;
        }
        if self.started_at.is_some() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }
}
