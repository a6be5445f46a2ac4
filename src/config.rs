//! 設定とテンプレート
//!
//! # モジュール構成
//!
//! - [`step`][]: ステップ種別とステップ定義
//! - [`template`][]: ワークフローテンプレートとカタログ
//! - [`settings`][]: エンジン設定
//! - `dto`: TOML デシリアライズ用の内部型

mod dto;
pub mod settings;
pub mod step;
pub mod template;

pub use settings::{EngineSettings, LogFormat, LogSettings};
pub use step::{Params, StepSpec, StepType};
pub use template::{TemplateCatalog, WorkflowTemplate};
