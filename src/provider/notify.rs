//! 通知シンクの実装
//!
//! - [`LogNotifier`]: 通知内容を `tracing` のイベントとして出力する（デフォルト）
//! - [`WebhookNotifier`]: 通知ペイロードを JSON で Webhook に POST する

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

use super::traits::{Notification, NotificationSink};
use crate::error::ProviderError;

/// ログ出力のみ行う通知シンク
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), ProviderError> {
        info!(
            kind = %notification.kind,
            recipient = %notification.recipient,
            subject = %notification.subject,
            "通知を送信しました"
        );
        Ok(())
    }
}

/// Webhook 通知シンク
///
/// 通知ペイロード `{type, recipient, subject, body}` を JSON として POST します。
/// 2xx 以外のレスポンスはエラーになります。
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// 送信先 URL を指定して生成
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// 送信先 URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), ProviderError> {
        let body = serde_json::to_string(&notification.to_value())
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Reported(format!(
                "Webhook が {status} を返しました"
            )));
        }

        debug!(url = %self.url, %status, "Webhook 通知を送信しました");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let notification = Notification {
            kind: "email".to_string(),
            recipient: "user@example.com".to_string(),
            subject: "Workflow wf completed".to_string(),
            body: "{}".to_string(),
        };
        assert!(LogNotifier.send(&notification).await.is_ok());
    }

    #[test]
    fn test_webhook_notifier_url() {
        let notifier = WebhookNotifier::new("https://hooks.example.com/wf");
        assert_eq!(notifier.url(), "https://hooks.example.com/wf");
    }
}
