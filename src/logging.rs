//! ログ出力の初期化
//!
//! stderr への出力（テキストまたは JSON）に加え、ログディレクトリが指定されていれば
//! 日次ローテーションの JSON ファイルにも書き出します。

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, LogSettings};
use crate::error::ConfigError;

/// ログファイル名の接頭辞
const LOG_FILE_PREFIX: &str = "content-workflow.log";

/// `-v` の回数を加味したフィルター指定
pub fn filter_directive(settings: &LogSettings, verbose: u8) -> String {
    match verbose {
        0 => settings.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn env_filter(directive: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(directive)
        .map_err(|e| ConfigError::Validation(format!("ログレベルの指定が不正です '{directive}': {e}")))
}

/// グローバルな subscriber を設定
///
/// ファイル出力を有効にした場合は [`WorkerGuard`] を返します。
/// プロセス終了までドロップしないでください（未書き込みのログが失われます）。
pub fn init(settings: &LogSettings, verbose: u8) -> Result<Option<WorkerGuard>, ConfigError> {
    let directive = filter_directive(settings, verbose);

    let filter = env_filter(&directive)?;
    let stderr_layer = match settings.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    };

    let (file_layer, guard) = match &settings.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(env_filter("debug")?);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::Validation(format!("ロガーの初期化に失敗しました: {e}")))?;

    Ok(guard)
}
