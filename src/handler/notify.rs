//! 通知ハンドラー

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::{Services, StepHandler, params};
use crate::config::step::Params;
use crate::engine::{Payload, StepContext};
use crate::error::StepError;
use crate::provider::Notification;

/// 通知ハンドラー
///
/// 件名は `Workflow {id} {status}`、本文は先行ステップ結果の整形済み JSON です。
/// ステータスはコンテキスト構築時点のもの（通常は `running`）になります。
/// 通知シンクの失敗は `notified: false` として記録され、ステップは成功します。
#[derive(Debug, Clone)]
pub struct NotifyHandler {
    services: Arc<Services>,
}

impl NotifyHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl StepHandler for NotifyHandler {
    async fn handle(&self, params: &Params, context: &StepContext) -> Result<Payload, StepError> {
        let notification = Notification {
            kind: params::string(params, "type", "email")?,
            recipient: params::string(params, "recipient", "user@example.com")?,
            subject: format!("Workflow {} {}", context.workflow_id, context.workflow_status),
            body: serde_json::to_string_pretty(&context.previous_results)?,
        };

        let mut payload = Payload::new();
        match self.services.notifier.send(&notification).await {
            Ok(()) => {
                payload.insert("notified".to_string(), json!(true));
            }
            Err(e) => {
                warn!(error = %e, recipient = %notification.recipient, "通知の送信に失敗しました");
                payload.insert("notified".to_string(), json!(false));
                payload.insert("error".to_string(), json!(e.to_string()));
            }
        }
        payload.insert("message".to_string(), notification.to_value());
        Ok(payload)
    }
}
