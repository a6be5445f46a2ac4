//! コンテンツ生成系のハンドラー（Generate / QACheck / Enhance）

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{Services, StepHandler, params};
use crate::config::step::Params;
use crate::engine::{Payload, StepContext};
use crate::error::StepError;
use crate::provider::dry_run::IMPROVEMENT_SUFFIX;
use crate::provider::{GeneratedImage, GenerationRequest};

/// 品質チェック結果を読むステップ名
const QA_STEP: &str = "qa_check";
/// 元プロンプトを読むステップ名
const GENERATE_STEP: &str = "generate";

fn image_payload(image: GeneratedImage) -> Payload {
    let mut payload = Payload::new();
    payload.insert("success".to_string(), json!(true));
    payload.insert("image_data".to_string(), json!(image.image_data));
    payload.insert("filename".to_string(), json!(image.filename));
    payload.insert("metadata".to_string(), Value::Object(image.metadata));
    payload
}

/// 画像生成ハンドラー
///
/// パラメーター: `prompt`（既定 ""）, `style`（"photorealistic"）,
/// `quality`（"standard"）, `workflow`（"default"）
#[derive(Debug, Clone)]
pub struct GenerateHandler {
    services: Arc<Services>,
}

impl GenerateHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl StepHandler for GenerateHandler {
    async fn handle(&self, params: &Params, _context: &StepContext) -> Result<Payload, StepError> {
        let generator = self
            .services
            .generator
            .as_ref()
            .ok_or(StepError::NotConfigured("生成プロバイダー"))?;

        let request = GenerationRequest {
            prompt: params::string(params, "prompt", "")?,
            style: params::string(params, "style", "photorealistic")?,
            quality: params::string(params, "quality", "standard")?,
            workflow: params::string(params, "workflow", "default")?,
        };
        let image = generator.generate(&request).await?;
        debug!(filename = %image.filename, "画像を生成しました");

        Ok(image_payload(image))
    }
}

/// 品質チェックハンドラー
///
/// `source`（既定 "generate"）ステップの `image_data` を分析し、
/// スコアが `min_quality`（既定 0.8）以上かつ変異なしなら合格とします。
/// 品質分析プロバイダーが未設定の場合は常に合格（スコア 1.0）です。
#[derive(Debug, Clone)]
pub struct QaCheckHandler {
    services: Arc<Services>,
}

impl QaCheckHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl StepHandler for QaCheckHandler {
    async fn handle(&self, params: &Params, context: &StepContext) -> Result<Payload, StepError> {
        let Some(quality) = self.services.quality.as_ref() else {
            let mut payload = Payload::new();
            payload.insert("passed".to_string(), json!(true));
            payload.insert("score".to_string(), json!(1.0));
            return Ok(payload);
        };

        let source = params::string(params, "source", GENERATE_STEP)?;
        let image_data = context
            .previous(&source)
            .and_then(|result| result.get("image_data"))
            .and_then(Value::as_str)
            .ok_or_else(|| StepError::MissingInput(format!("{source}.image_data")))?;

        let min_quality = params::number(params, "min_quality", 0.8)?;
        let expected = params::string_list(params, "expected_features")?.unwrap_or_default();

        let analysis = quality.analyze_image(image_data).await?;
        let mutations = quality.check_mutations(image_data, &expected).await?;
        let passed = analysis.quality_score >= min_quality && !mutations.has_mutations;
        debug!(score = analysis.quality_score, min_quality, passed, "品質チェック完了");

        let mut payload = Payload::new();
        payload.insert("passed".to_string(), json!(passed));
        payload.insert("quality_score".to_string(), json!(analysis.quality_score));
        payload.insert("issues".to_string(), json!(analysis.issues));
        payload.insert("mutations".to_string(), json!(mutations.mutation_details));
        Ok(payload)
    }
}

/// 品質改善ハンドラー
///
/// 品質チェックが不合格だった場合のみ、改善プロンプトで再生成します。
/// 品質チェック結果が無い場合は合格扱いです。
#[derive(Debug, Clone)]
pub struct EnhanceHandler {
    services: Arc<Services>,
}

impl EnhanceHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl StepHandler for EnhanceHandler {
    async fn handle(&self, params: &Params, context: &StepContext) -> Result<Payload, StepError> {
        let qa = match context.previous(QA_STEP) {
            Some(qa) if !qa.get("passed").and_then(Value::as_bool).unwrap_or(true) => qa,
            _ => {
                let mut payload = Payload::new();
                payload.insert("enhanced".to_string(), json!(false));
                payload.insert("reason".to_string(), json!("品質チェックに合格しています"));
                return Ok(payload);
            }
        };

        let original_prompt = context
            .previous(GENERATE_STEP)
            .and_then(|result| result.get("metadata"))
            .and_then(|metadata| metadata.get("prompt"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let new_prompt = match self.services.quality.as_ref() {
            Some(quality) => quality.suggest_improvements(qa, original_prompt).await?,
            None => format!("{original_prompt}{IMPROVEMENT_SUFFIX}"),
        };

        let Some(generator) = self.services.generator.as_ref() else {
            let mut payload = Payload::new();
            payload.insert("enhanced".to_string(), json!(false));
            payload.insert("error".to_string(), json!("生成プロバイダーが設定されていません"));
            payload.insert("new_prompt".to_string(), json!(new_prompt));
            return Ok(payload);
        };

        let request = GenerationRequest {
            prompt: new_prompt.clone(),
            style: params::string(params, "style", "photorealistic")?,
            quality: "high".to_string(),
            workflow: params::string(params, "workflow", "default")?,
        };
        let image = generator.generate(&request).await?;
        debug!(prompt = %new_prompt, "改善プロンプトで再生成しました");

        let mut payload = Payload::new();
        payload.insert("enhanced".to_string(), json!(true));
        payload.insert("new_prompt".to_string(), json!(new_prompt));
        payload.insert("result".to_string(), Value::Object(image_payload(image)));
        Ok(payload)
    }
}
