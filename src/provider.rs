//! 外部コラボレーター抽象化レイヤー
//!
//! # 責務
//!
//! - ステップハンドラーが利用する外部サービスを統一的に扱うインターフェースを提供
//! - 配信プラットフォームの集合を管理する [`PlatformManager`] を提供
//! - 通知シンクの標準実装とオフライン実行用の実装を提供
//!
//! # モジュール構成
//!
//! - `traits` - 共通インターフェース（[`GenerationProvider`] / [`QualityAnalyzer`] /
//!   [`PlatformClient`] / [`NotificationSink`]）
//! - `platform` - プラットフォームマネージャー
//! - `notify` - ログ通知・Webhook 通知
//! - `dry_run` - 外部接続なしで動くプロバイダー
//!
//! # 使用例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use content_workflow::provider::{PlatformManager, dry_run::DryRunPlatform};
//!
//! let platforms = PlatformManager::new()
//!     .with_platform("onlyfans", Arc::new(DryRunPlatform::new("onlyfans")))
//!     .with_platform("fansly", Arc::new(DryRunPlatform::new("fansly")));
//!
//! assert_eq!(platforms.names(), vec!["fansly", "onlyfans"]);
//! ```

pub mod dry_run;
pub mod notify;
pub mod platform;
pub mod traits;

// 公開APIの再エクスポート
pub use notify::{LogNotifier, WebhookNotifier};
pub use platform::PlatformManager;
pub use traits::{
    GeneratedImage, GenerationProvider, GenerationRequest, MutationReport, Notification,
    NotificationSink, PlatformClient, QualityAnalysis, QualityAnalyzer, ScheduleReceipt,
    UploadMetadata, UploadReceipt,
};
