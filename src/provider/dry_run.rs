//! オフライン実行用のプロバイダー
//!
//! 外部サービスに接続せずにワークフロー全体を流すための実装です。
//! CLI の `run` コマンドで使われます。

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::traits::{
    GeneratedImage, GenerationProvider, GenerationRequest, MutationReport, PlatformClient,
    QualityAnalysis, QualityAnalyzer, ScheduleReceipt, UploadMetadata, UploadReceipt,
};
use crate::config::step::Params;
use crate::error::ProviderError;

/// 改善プロンプトに付け足す定型句
pub const IMPROVEMENT_SUFFIX: &str = ", high quality, no artifacts";

/// 連番の画像参照を返す生成プロバイダー
#[derive(Debug, Default)]
pub struct DryRunGenerator {
    counter: AtomicU64,
}

#[async_trait]
impl GenerationProvider for DryRunGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, ProviderError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;

        let mut metadata = Params::new();
        metadata.insert("prompt".to_string(), json!(request.prompt));
        metadata.insert("style".to_string(), json!(request.style));
        metadata.insert("quality".to_string(), json!(request.quality));
        metadata.insert("workflow".to_string(), json!(request.workflow));

        Ok(GeneratedImage {
            image_data: format!("dry-run://image/{n:04}"),
            filename: format!("dry_run_{n:04}.png"),
            metadata,
        })
    }
}

/// 固定スコアを返す品質分析プロバイダー
#[derive(Debug, Clone)]
pub struct HeuristicQualityAnalyzer {
    quality_score: f64,
    issues: Vec<String>,
}

impl HeuristicQualityAnalyzer {
    /// スコアを指定して生成
    pub fn with_score(quality_score: f64) -> Self {
        Self {
            quality_score,
            issues: Vec::new(),
        }
    }

    /// 検出問題を追加
    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }
}

impl Default for HeuristicQualityAnalyzer {
    fn default() -> Self {
        Self::with_score(0.95)
    }
}

#[async_trait]
impl QualityAnalyzer for HeuristicQualityAnalyzer {
    async fn analyze_image(&self, _image_data: &str) -> Result<QualityAnalysis, ProviderError> {
        Ok(QualityAnalysis {
            quality_score: self.quality_score,
            issues: self.issues.clone(),
        })
    }

    async fn check_mutations(
        &self,
        _image_data: &str,
        _expected_features: &[String],
    ) -> Result<MutationReport, ProviderError> {
        Ok(MutationReport {
            has_mutations: false,
            mutation_details: Vec::new(),
        })
    }

    async fn suggest_improvements(
        &self,
        analysis: &Params,
        original_prompt: &str,
    ) -> Result<String, ProviderError> {
        let has_issues = analysis
            .get("issues")
            .and_then(Value::as_array)
            .is_some_and(|issues| !issues.is_empty());

        if has_issues {
            Ok(format!("{original_prompt}{IMPROVEMENT_SUFFIX}"))
        } else {
            Ok(original_prompt.to_string())
        }
    }
}

/// 連番 ID を返す配信プラットフォーム
#[derive(Debug)]
pub struct DryRunPlatform {
    name: String,
    counter: AtomicU64,
}

impl DryRunPlatform {
    /// プラットフォーム名を指定して生成
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl PlatformClient for DryRunPlatform {
    async fn upload_content(
        &self,
        _data: &str,
        _metadata: &UploadMetadata,
    ) -> Result<UploadReceipt, ProviderError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(UploadReceipt {
            content_id: Some(format!("{}-{n}", self.name)),
            post_id: None,
            url: None,
        })
    }

    async fn schedule_post(
        &self,
        content_id: &str,
        time: DateTime<Utc>,
        _caption: &str,
    ) -> Result<ScheduleReceipt, ProviderError> {
        Ok(ScheduleReceipt {
            schedule_id: format!("{content_id}@{}", time.timestamp()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_generator_numbers_images() {
        let generator = DryRunGenerator::default();
        let request = GenerationRequest {
            prompt: "sunset".to_string(),
            style: "photorealistic".to_string(),
            quality: "standard".to_string(),
            workflow: "default".to_string(),
        };

        let first = generator.generate(&request).await.unwrap();
        let second = generator.generate(&request).await.unwrap();

        assert_eq!(first.image_data, "dry-run://image/0001");
        assert_eq!(second.filename, "dry_run_0002.png");
        assert_eq!(first.metadata["prompt"], json!("sunset"));
    }

    #[tokio::test]
    async fn test_suggest_improvements_only_with_issues() {
        let analyzer = HeuristicQualityAnalyzer::default();

        let mut analysis = Params::new();
        analysis.insert("issues".to_string(), json!([]));
        let prompt = analyzer.suggest_improvements(&analysis, "portrait").await.unwrap();
        assert_eq!(prompt, "portrait");

        analysis.insert("issues".to_string(), json!(["blurry"]));
        let prompt = analyzer.suggest_improvements(&analysis, "portrait").await.unwrap();
        assert_eq!(prompt, "portrait, high quality, no artifacts");
    }

    #[tokio::test]
    async fn test_dry_run_platform_ids() {
        let platform = DryRunPlatform::new("fansly");
        let metadata = UploadMetadata {
            caption: String::new(),
            tags: vec![],
            price: 0.0,
        };

        let receipt = platform.upload_content("img", &metadata).await.unwrap();
        assert_eq!(receipt.reference_id(), Some("fansly-1"));
    }
}
