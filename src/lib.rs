//! コンテンツ制作ワークフローの実行エンジン
//!
//! 生成・品質チェック・改善・ターゲティング・アップロード・スケジュール・通知の
//! 各ステップを順序付きで実行し、ステップごとのリトライ、実行中ワークフローの
//! キャンセル、ステータス照会を提供します。
//!
//! # モジュール構成
//!
//! - [`config`][]: ステップ定義・テンプレート・エンジン設定（TOML）
//! - [`engine`][]: 実行エンジン本体
//! - [`handler`][]: ステップ種別ごとのハンドラー
//! - [`provider`][]: 外部コラボレーターのインターフェースと標準実装
//! - [`logging`][]: ログ出力の初期化
//! - [`error`][]: エラー型

pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod logging;
pub mod provider;

pub use engine::{EngineError, WorkflowEngine, WorkflowSnapshot, WorkflowStatus};
