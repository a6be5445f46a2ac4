//! 外部コラボレーターの共通インターフェース定義
//!
//! # 責務
//!
//! - 生成プロバイダー [`GenerationProvider`]
//! - 品質分析プロバイダー [`QualityAnalyzer`]
//! - 配信プラットフォームクライアント [`PlatformClient`]
//! - 通知シンク [`NotificationSink`]
//!
//! エンジンはこれらのトレイトだけに依存し、具体的な API のワイヤー形式は扱いません。
//! 画像データは不透明な文字列（エンコード済みペイロードやストレージ参照）として受け渡します。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::step::Params;
use crate::error::ProviderError;

/// コンテンツ生成リクエスト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// 生成プロンプト
    pub prompt: String,
    /// スタイル（例: "photorealistic"）
    pub style: String,
    /// 品質（例: "standard", "high"）
    pub quality: String,
    /// 生成側のワークフローテンプレート名
    pub workflow: String,
}

/// 生成結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// 画像データ（不透明な文字列）
    pub image_data: String,
    /// ファイル名
    pub filename: String,
    /// 生成時のメタデータ（プロンプト等）
    #[serde(default)]
    pub metadata: Params,
}

/// コンテンツ生成プロバイダー
///
/// `Err` はプロバイダーが `{success: false, error}` を報告したケースに相当します。
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// 画像を生成する
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, ProviderError>;
}

/// 品質分析結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAnalysis {
    /// 品質スコア（0.0〜1.0）
    pub quality_score: f64,
    /// 検出された問題
    #[serde(default)]
    pub issues: Vec<String>,
}

/// 変異（アーティファクト）チェック結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationReport {
    /// 変異が検出されたか
    pub has_mutations: bool,
    /// 変異の詳細
    #[serde(default)]
    pub mutation_details: Vec<String>,
}

/// 品質分析プロバイダー
#[async_trait]
pub trait QualityAnalyzer: Send + Sync {
    /// 画像の品質スコアと問題点を分析
    async fn analyze_image(&self, image_data: &str) -> Result<QualityAnalysis, ProviderError>;

    /// 期待する特徴に対して変異がないかチェック
    async fn check_mutations(
        &self,
        image_data: &str,
        expected_features: &[String],
    ) -> Result<MutationReport, ProviderError>;

    /// 分析結果（品質チェックステップの結果）と元プロンプトから改善プロンプトを生成
    async fn suggest_improvements(
        &self,
        analysis: &Params,
        original_prompt: &str,
    ) -> Result<String, ProviderError>;
}

/// アップロード時のメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMetadata {
    /// キャプション
    pub caption: String,
    /// タグ
    pub tags: Vec<String>,
    /// 価格
    pub price: f64,
}

/// アップロード成功時の受領情報
///
/// プラットフォームによって `content_id` と `post_id` のどちらかが返ります。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl UploadReceipt {
    /// スケジュールに使う ID（`post_id` 優先）
    pub fn reference_id(&self) -> Option<&str> {
        self.post_id.as_deref().or(self.content_id.as_deref())
    }
}

/// スケジュール成功時の受領情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleReceipt {
    pub schedule_id: String,
}

/// 配信プラットフォームクライアント
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// コンテンツをアップロード
    async fn upload_content(
        &self,
        data: &str,
        metadata: &UploadMetadata,
    ) -> Result<UploadReceipt, ProviderError>;

    /// アップロード済みコンテンツの投稿をスケジュール
    async fn schedule_post(
        &self,
        content_id: &str,
        time: DateTime<Utc>,
        caption: &str,
    ) -> Result<ScheduleReceipt, ProviderError>;

    /// コンテンツの分析値（views, revenue 等）を取得
    async fn get_analytics(&self, _content_id: &str) -> Result<Params, ProviderError> {
        Ok(Params::new())
    }
}

/// 通知ペイロード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// 通知種別（例: "email"）
    #[serde(rename = "type")]
    pub kind: String,
    /// 宛先
    pub recipient: String,
    /// 件名
    pub subject: String,
    /// 本文（前段ステップ結果の JSON）
    pub body: String,
}

impl Notification {
    /// JSON 値に変換
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "type": self.kind,
            "recipient": self.recipient,
            "subject": self.subject,
            "body": self.body,
        })
    }
}

/// 通知シンク
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// 通知を送信
    async fn send(&self, notification: &Notification) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_receipt_reference_id() {
        let receipt = UploadReceipt {
            content_id: Some("c-1".to_string()),
            post_id: Some("p-1".to_string()),
            url: None,
        };
        assert_eq!(receipt.reference_id(), Some("p-1"));

        let receipt = UploadReceipt {
            content_id: Some("c-1".to_string()),
            ..Default::default()
        };
        assert_eq!(receipt.reference_id(), Some("c-1"));

        assert_eq!(UploadReceipt::default().reference_id(), None);
    }

    #[test]
    fn test_notification_to_value() {
        let notification = Notification {
            kind: "email".to_string(),
            recipient: "ops@example.com".to_string(),
            subject: "Workflow wf-1 completed".to_string(),
            body: "{}".to_string(),
        };

        let value = notification.to_value();
        assert_eq!(value["type"], "email");
        assert_eq!(value["subject"], "Workflow wf-1 completed");
    }
}
