//! ワークフロー実行エンジン
//!
//! # 責務
//!
//! - ステップ定義の列やテンプレートからワークフローを生成・登録
//! - 各ステップを順序通りに実行し、失敗時は指数バックオフでリトライ
//! - ステップ間の結果受け渡し（実行コンテキストの構築）
//! - ステータス照会とキャンセル、同一ワークフローの二重実行防止
//!
//! # モジュール構成
//!
//! - [`executor`][]: エンジン本体（[`WorkflowEngine`]）
//! - [`state`][]: ワークフロー・ステップの実行時レコード
//! - [`context`][]: ステップ実行コンテキスト
//! - [`result`][]: スナップショットとエラー型
//! - [`retry`][]: バックオフ計算
//!
//! # 使用例
//!
//! ```rust,no_run
//! use content_workflow::config::step::Params;
//! use content_workflow::engine::WorkflowEngine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = WorkflowEngine::new();
//!     let workflow = engine.create_from_template("basic_generation", Params::new()).await?;
//!
//!     engine.execute_workflow(&workflow.id).await?;
//!
//!     let snapshot = engine.get_workflow_status(&workflow.id).await?;
//!     println!("Status: {}", snapshot.status);
//!     for step in &snapshot.steps {
//!         println!("  Step {}: {} (retries: {})", step.name, step.status, step.retry_count);
//!     }
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod executor;
pub mod result;
pub mod retry;
pub mod state;

// 公開APIの再エクスポート
pub use context::StepContext;
pub use executor::{EngineBuilder, WorkflowEngine};
pub use result::{EngineError, StepSummary, WorkflowSnapshot};
pub use retry::backoff_delay;
pub use state::{Payload, Step, Workflow, WorkflowStatus};
