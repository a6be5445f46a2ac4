//! ステップハンドラー
//!
//! # 責務
//!
//! - ステップ種別ごとの処理を統一されたシグネチャ `(params, context) -> Result<Payload>` で提供
//! - ステップ種別 → ハンドラーの対応表 [`HandlerRegistry`] を管理
//! - ハンドラーが共有する外部コラボレーターの集合 [`Services`] を保持
//!
//! # モジュール構成
//!
//! - `content` - 生成・品質チェック・改善（Generate / QACheck / Enhance）
//! - `distribution` - ターゲティング・アップロード・スケジュール（Target / Upload / Schedule）
//! - `notify` - 完了通知（Notify）
//! - `params` - パラメーター読み取りの補助関数
//!
//! # 使用例
//!
//! ```rust
//! use std::sync::Arc;
//! use content_workflow::config::step::StepType;
//! use content_workflow::handler::{HandlerRegistry, Services, from_fn};
//! use content_workflow::engine::Payload;
//! use content_workflow::error::StepError;
//!
//! let mut registry = HandlerRegistry::standard(Arc::new(Services::default()));
//! registry.register(
//!     StepType::Target,
//!     from_fn(|_params, _ctx| async move { Ok::<_, StepError>(Payload::new()) }),
//! );
//! assert!(registry.get(StepType::Target).is_some());
//! ```

mod content;
mod distribution;
mod notify;
pub mod params;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::step::{Params, StepType};
use crate::engine::{Payload, StepContext};
use crate::error::StepError;
use crate::provider::{
    GenerationProvider, LogNotifier, NotificationSink, PlatformManager, QualityAnalyzer,
};

pub use content::{EnhanceHandler, GenerateHandler, QaCheckHandler};
pub use distribution::{ScheduleHandler, TargetHandler, UploadHandler};
pub use notify::NotifyHandler;

/// ステップハンドラーの共通インターフェース
///
/// 実装は `Send + Sync` である必要があります（別タスクで実行されるため）。
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// ステップを1回試行する
    ///
    /// `Err` を返すとエンジンがリトライします。
    async fn handle(&self, params: &Params, context: &StepContext) -> Result<Payload, StepError>;
}

/// クロージャをハンドラーとして扱うためのラッパー
pub struct FnHandler<F>(F);

/// クロージャからハンドラーを生成
///
/// クロージャにはパラメーターとコンテキストのクローンが渡されます。
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn StepHandler>
where
    F: Fn(Params, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Payload, StepError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[async_trait]
impl<F, Fut> StepHandler for FnHandler<F>
where
    F: Fn(Params, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Payload, StepError>> + Send + 'static,
{
    async fn handle(&self, params: &Params, context: &StepContext) -> Result<Payload, StepError> {
        (self.0)(params.clone(), context.clone()).await
    }
}

/// ハンドラーが利用する外部コラボレーター
///
/// 生成・品質分析・配信は任意です。未設定の場合の振る舞いは各ハンドラーが決めます。
#[derive(Clone)]
pub struct Services {
    pub generator: Option<Arc<dyn GenerationProvider>>,
    pub quality: Option<Arc<dyn QualityAnalyzer>>,
    pub platforms: Option<PlatformManager>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            generator: None,
            quality: None,
            platforms: None,
            notifier: Arc::new(LogNotifier),
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("generator", &self.generator.is_some())
            .field("quality", &self.quality.is_some())
            .field("platforms", &self.platforms)
            .finish_non_exhaustive()
    }
}

/// ステップ種別 → ハンドラーの対応表
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<StepType, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    /// 空の対応表
    pub fn empty() -> Self {
        Self::default()
    }

    /// 7種類すべての標準ハンドラーを登録した対応表
    pub fn standard(services: Arc<Services>) -> Self {
        let mut registry = Self::empty();
        registry.register(StepType::Generate, Arc::new(GenerateHandler::new(Arc::clone(&services))));
        registry.register(StepType::QaCheck, Arc::new(QaCheckHandler::new(Arc::clone(&services))));
        registry.register(StepType::Enhance, Arc::new(EnhanceHandler::new(Arc::clone(&services))));
        registry.register(StepType::Target, Arc::new(TargetHandler));
        registry.register(StepType::Upload, Arc::new(UploadHandler::new(Arc::clone(&services))));
        registry.register(StepType::Schedule, Arc::new(ScheduleHandler::new(Arc::clone(&services))));
        registry.register(StepType::Notify, Arc::new(NotifyHandler::new(services)));
        registry
    }

    /// ハンドラーを登録（既存の登録は置き換え）
    pub fn register(&mut self, step_type: StepType, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(step_type, handler);
    }

    /// ハンドラーの登録を外す
    pub fn remove(&mut self, step_type: StepType) -> Option<Arc<dyn StepHandler>> {
        self.handlers.remove(&step_type)
    }

    pub fn get(&self, step_type: StepType) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(&step_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.handlers.keys().map(StepType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("HandlerRegistry").field("types", &types).finish()
    }
}
