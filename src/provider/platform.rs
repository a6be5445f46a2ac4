//! 配信プラットフォームの管理
//!
//! # 責務
//!
//! - 名前付きの [`PlatformClient`] の集合を保持
//! - 全プラットフォーム / 指定プラットフォームへのアップロード
//! - 投稿スケジュールと分析値の集計
//!
//! 個々のプラットフォームの失敗は呼び出し元にエラーとして返さず、
//! `{"success": false, "error": ...}` というデータとして結果に含めます。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::traits::{PlatformClient, UploadMetadata, UploadReceipt};
use crate::config::step::Params;
use crate::error::ProviderError;

/// 名前付きプラットフォームクライアントの集合
#[derive(Clone, Default)]
pub struct PlatformManager {
    platforms: BTreeMap<String, Arc<dyn PlatformClient>>,
}

impl std::fmt::Debug for PlatformManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformManager")
            .field("platforms", &self.platforms.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PlatformManager {
    /// 空のマネージャー
    pub fn new() -> Self {
        Self::default()
    }

    /// プラットフォームを追加（同名は置き換え）
    pub fn add_platform(&mut self, name: impl Into<String>, client: Arc<dyn PlatformClient>) {
        self.platforms.insert(name.into(), client);
    }

    /// ビルダー形式でプラットフォームを追加
    pub fn with_platform(mut self, name: impl Into<String>, client: Arc<dyn PlatformClient>) -> Self {
        self.add_platform(name, client);
        self
    }

    /// 名前でクライアントを取得
    pub fn get(&self, name: &str) -> Option<&Arc<dyn PlatformClient>> {
        self.platforms.get(name)
    }

    /// 登録済みプラットフォーム名（名前順）
    pub fn names(&self) -> Vec<String> {
        self.platforms.keys().cloned().collect()
    }

    /// 登録数
    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    /// 登録がないか
    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    /// 全プラットフォームへアップロード
    pub async fn upload_to_all(&self, data: &str, metadata: &UploadMetadata) -> Params {
        let names = self.names();
        self.upload_to(&names, data, metadata).await
    }

    /// 指定プラットフォームへアップロード
    ///
    /// 未登録の名前にはエラーエントリを記録します。
    pub async fn upload_to(&self, names: &[String], data: &str, metadata: &UploadMetadata) -> Params {
        let mut results = Params::new();
        for name in names {
            let outcome = match self.platforms.get(name) {
                Some(client) => upload_outcome(client.upload_content(data, metadata).await),
                None => failure(&ProviderError::UnknownPlatform(name.clone())),
            };
            if outcome["success"] != Value::Bool(true) {
                warn!(platform = %name, outcome = %outcome, "アップロードに失敗しました");
            } else {
                debug!(platform = %name, "アップロードしました");
            }
            results.insert(name.clone(), outcome);
        }
        results
    }

    /// 1つのプラットフォームで投稿をスケジュール
    pub async fn schedule_on(
        &self,
        name: &str,
        content_id: &str,
        time: DateTime<Utc>,
        caption: &str,
    ) -> Value {
        let Some(client) = self.platforms.get(name) else {
            return failure(&ProviderError::UnknownPlatform(name.to_string()));
        };
        match client.schedule_post(content_id, time, caption).await {
            Ok(receipt) => json!({ "success": true, "schedule_id": receipt.schedule_id }),
            Err(e) => {
                warn!(platform = %name, error = %e, "スケジュールに失敗しました");
                failure(&e)
            }
        }
    }

    /// 複数プラットフォームで同じコンテンツ ID の投稿をスケジュール
    pub async fn schedule_to_platforms(
        &self,
        names: &[String],
        content_id: &str,
        time: DateTime<Utc>,
        caption: &str,
    ) -> Params {
        let mut results = Params::new();
        for name in names {
            let outcome = self.schedule_on(name, content_id, time, caption).await;
            results.insert(name.clone(), outcome);
        }
        results
    }

    /// 全プラットフォームの分析値を取得し、views と revenue を合算
    pub async fn combined_analytics(&self, content_id: &str) -> Value {
        let mut platforms = Params::new();
        let mut total_views = 0.0;
        let mut total_revenue = 0.0;

        for (name, client) in &self.platforms {
            match client.get_analytics(content_id).await {
                Ok(analytics) => {
                    total_views += analytics.get("views").and_then(Value::as_f64).unwrap_or(0.0);
                    total_revenue += analytics.get("revenue").and_then(Value::as_f64).unwrap_or(0.0);
                    platforms.insert(name.clone(), Value::Object(analytics));
                }
                Err(e) => {
                    platforms.insert(name.clone(), json!({ "error": e.to_string() }));
                }
            }
        }

        json!({
            "platforms": platforms,
            "combined": {
                "total_views": total_views,
                "total_revenue": total_revenue,
            }
        })
    }
}

fn upload_outcome(result: Result<UploadReceipt, ProviderError>) -> Value {
    match result {
        Ok(receipt) => {
            let mut outcome = Params::new();
            outcome.insert("success".to_string(), Value::Bool(true));
            if let Some(id) = receipt.content_id {
                outcome.insert("content_id".to_string(), Value::String(id));
            }
            if let Some(id) = receipt.post_id {
                outcome.insert("post_id".to_string(), Value::String(id));
            }
            if let Some(url) = receipt.url {
                outcome.insert("url".to_string(), Value::String(url));
            }
            Value::Object(outcome)
        }
        Err(e) => failure(&e),
    }
}

fn failure(error: &ProviderError) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::traits::ScheduleReceipt;
    use crate::provider::dry_run::DryRunPlatform;
    use async_trait::async_trait;

    struct FixedPlatform {
        fail_upload: bool,
    }

    #[async_trait]
    impl PlatformClient for FixedPlatform {
        async fn upload_content(
            &self,
            _data: &str,
            _metadata: &UploadMetadata,
        ) -> Result<UploadReceipt, ProviderError> {
            if self.fail_upload {
                return Err(ProviderError::Reported("rejected".to_string()));
            }
            Ok(UploadReceipt {
                post_id: Some("post-1".to_string()),
                ..Default::default()
            })
        }

        async fn schedule_post(
            &self,
            content_id: &str,
            _time: DateTime<Utc>,
            _caption: &str,
        ) -> Result<ScheduleReceipt, ProviderError> {
            Ok(ScheduleReceipt {
                schedule_id: format!("sched-{content_id}"),
            })
        }

        async fn get_analytics(&self, _content_id: &str) -> Result<Params, ProviderError> {
            let mut analytics = Params::new();
            analytics.insert("views".to_string(), json!(100));
            analytics.insert("revenue".to_string(), json!(2.5));
            Ok(analytics)
        }
    }

    fn metadata() -> UploadMetadata {
        UploadMetadata {
            caption: "caption".to_string(),
            tags: vec![],
            price: 0.0,
        }
    }

    fn manager() -> PlatformManager {
        PlatformManager::new()
            .with_platform("fansly", Arc::new(FixedPlatform { fail_upload: false }))
            .with_platform("onlyfans", Arc::new(FixedPlatform { fail_upload: true }))
    }

    #[tokio::test]
    async fn test_upload_to_all_records_failures_as_data() {
        let results = manager().upload_to_all("img", &metadata()).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["fansly"], json!({ "success": true, "post_id": "post-1" }));
        assert_eq!(results["onlyfans"]["success"], json!(false));
    }

    #[tokio::test]
    async fn test_upload_to_unknown_platform() {
        let names = vec!["fansly".to_string(), "myspace".to_string()];
        let results = manager().upload_to(&names, "img", &metadata()).await;

        assert_eq!(results["fansly"]["success"], json!(true));
        assert_eq!(results["myspace"]["success"], json!(false));
        assert!(results["myspace"]["error"].as_str().unwrap().contains("myspace"));
    }

    #[tokio::test]
    async fn test_schedule_to_platforms() {
        let names = vec!["fansly".to_string()];
        let results = manager()
            .schedule_to_platforms(&names, "post-1", Utc::now(), "")
            .await;

        assert_eq!(results["fansly"], json!({ "success": true, "schedule_id": "sched-post-1" }));
    }

    #[tokio::test]
    async fn test_combined_analytics() {
        let analytics = manager().combined_analytics("post-1").await;

        assert_eq!(analytics["combined"]["total_views"], json!(200.0));
        assert_eq!(analytics["combined"]["total_revenue"], json!(5.0));
        assert_eq!(analytics["platforms"]["fansly"]["views"], json!(100));
    }

    #[tokio::test]
    async fn test_combined_analytics_default_is_empty() {
        let manager = PlatformManager::new()
            .with_platform("patreon", Arc::new(DryRunPlatform::new("patreon")));
        let analytics = manager.combined_analytics("post-1").await;

        assert_eq!(analytics["platforms"]["patreon"], json!({}));
        assert_eq!(analytics["combined"]["total_views"], json!(0.0));
    }
}
