//! 配信系のハンドラー（Target / Upload / Schedule）

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::params::{self, PlatformSelection};
use super::{Services, StepHandler};
use crate::config::step::Params;
use crate::engine::{Payload, StepContext};
use crate::error::StepError;
use crate::provider::{UploadMetadata, UploadReceipt};

/// セグメント1つあたりの推定リーチ
const REACH_PER_SEGMENT: usize = 1000;

/// オーディエンスターゲティングハンドラー
///
/// 外部サービスは使わず、`segments`（既定 `["general"]`）と
/// `platforms`（既定 `["all"]`）から推奨を組み立てます。
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetHandler;

#[async_trait]
impl StepHandler for TargetHandler {
    async fn handle(&self, params: &Params, _context: &StepContext) -> Result<Payload, StepError> {
        let segments = params::string_list(params, "segments")?
            .unwrap_or_else(|| vec!["general".to_string()]);
        let platforms = params::string_list(params, "platforms")?
            .unwrap_or_else(|| vec!["all".to_string()]);
        let best_time = Utc::now() + Duration::hours(4);

        let mut payload = Payload::new();
        payload.insert("estimated_reach".to_string(), json!(segments.len() * REACH_PER_SEGMENT));
        payload.insert("recommended_segments".to_string(), json!(segments));
        payload.insert("platforms".to_string(), json!(platforms));
        payload.insert("best_time".to_string(), json!(best_time.to_rfc3339()));
        Ok(payload)
    }
}

/// アップロードハンドラー
///
/// 改善ステップが再生成していればその画像を、そうでなければ生成ステップの画像を使います。
/// プラットフォームごとの失敗は結果データとして記録され、ステップ自体は成功します。
#[derive(Debug, Clone)]
pub struct UploadHandler {
    services: Arc<Services>,
}

impl UploadHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

/// アップロード対象の画像データを選ぶ
fn select_image(context: &StepContext) -> Result<String, StepError> {
    let enhanced = context
        .previous("enhance")
        .filter(|result| result.get("enhanced").and_then(Value::as_bool) == Some(true));

    let image = match enhanced {
        Some(enhance) => enhance
            .get("result")
            .and_then(|result| result.get("image_data"))
            .and_then(Value::as_str)
            .ok_or_else(|| StepError::MissingInput("enhance.result.image_data".to_string()))?,
        None => context
            .previous("generate")
            .and_then(|result| result.get("image_data"))
            .and_then(Value::as_str)
            .ok_or_else(|| StepError::MissingInput("generate.image_data".to_string()))?,
    };
    Ok(image.to_string())
}

#[async_trait]
impl StepHandler for UploadHandler {
    async fn handle(&self, params: &Params, context: &StepContext) -> Result<Payload, StepError> {
        let image_data = select_image(context)?;

        let Some(platforms) = self.services.platforms.as_ref() else {
            let mut payload = Payload::new();
            payload.insert("uploaded".to_string(), json!(false));
            payload.insert(
                "error".to_string(),
                json!("プラットフォームマネージャーが設定されていません"),
            );
            return Ok(payload);
        };

        let metadata = UploadMetadata {
            caption: params::string(params, "caption", "")?,
            tags: params::string_list(params, "tags")?.unwrap_or_default(),
            price: params::number(params, "price", 0.0)?,
        };

        let results = match params::platforms(params)? {
            PlatformSelection::All => platforms.upload_to_all(&image_data, &metadata).await,
            PlatformSelection::Named(names) => {
                platforms.upload_to(&names, &image_data, &metadata).await
            }
        };
        debug!(platforms = results.len(), "アップロード完了");

        let mut payload = Payload::new();
        payload.insert("uploaded".to_string(), json!(true));
        payload.insert("results".to_string(), Value::Object(results));
        Ok(payload)
    }
}

/// 投稿スケジュールハンドラー
///
/// アップロードに成功したプラットフォームごとに、`post_id`（無ければ `content_id`）で
/// 投稿を予約します。`scheduled_time` の既定は現在時刻から1時間後です。
#[derive(Debug, Clone)]
pub struct ScheduleHandler {
    services: Arc<Services>,
}

impl ScheduleHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

fn not_scheduled(reason: &str) -> Payload {
    let mut payload = Payload::new();
    payload.insert("scheduled".to_string(), json!(false));
    payload.insert("error".to_string(), json!(reason));
    payload
}

#[async_trait]
impl StepHandler for ScheduleHandler {
    async fn handle(&self, params: &Params, context: &StepContext) -> Result<Payload, StepError> {
        let uploads = context
            .previous("upload")
            .and_then(|result| result.get("results"))
            .and_then(Value::as_object)
            .filter(|results| !results.is_empty());
        let Some(uploads) = uploads else {
            return Ok(not_scheduled("スケジュール対象のアップロード結果がありません"));
        };

        let scheduled_time =
            params::timestamp(params, "scheduled_time")?.unwrap_or_else(|| Utc::now() + Duration::hours(1));
        let caption = params::string(params, "caption", "")?;

        let Some(platforms) = self.services.platforms.as_ref() else {
            return Ok(not_scheduled("プラットフォームマネージャーが設定されていません"));
        };

        let mut results = Params::new();
        for (platform, outcome) in uploads {
            if outcome.get("success").and_then(Value::as_bool) != Some(true) {
                continue;
            }
            let receipt = UploadReceipt::deserialize(outcome).unwrap_or_default();
            let entry = match receipt.reference_id() {
                Some(content_id) => {
                    platforms
                        .schedule_on(platform, content_id, scheduled_time, &caption)
                        .await
                }
                None => json!({ "success": false, "error": "コンテンツ ID がありません" }),
            };
            results.insert(platform.clone(), entry);
        }

        let mut payload = Payload::new();
        payload.insert("scheduled".to_string(), json!(true));
        payload.insert("scheduled_time".to_string(), json!(scheduled_time.to_rfc3339()));
        payload.insert("results".to_string(), Value::Object(results));
        Ok(payload)
    }
}
