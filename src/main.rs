use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use content_workflow::config::{EngineSettings, Params, TemplateCatalog, WorkflowTemplate};
use content_workflow::provider::dry_run::{DryRunGenerator, DryRunPlatform, HeuristicQualityAnalyzer};
use content_workflow::provider::{LogNotifier, NotificationSink, PlatformManager, WebhookNotifier};
use content_workflow::{WorkflowEngine, WorkflowStatus, logging};

/// プラットフォーム未指定時に登録するもの
const DEFAULT_PLATFORMS: [&str; 2] = ["onlyfans", "fansly"];

#[derive(Debug, Parser)]
#[command(name = "content-workflow", version, about = "コンテンツ制作ワークフローの実行エンジン")]
struct Cli {
    /// 設定ファイル（TOML）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// ログを詳細にする（-v: debug, -vv: trace）
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 利用可能なテンプレートを一覧表示
    Templates,

    /// テンプレートからワークフローを生成し、外部接続なしで実行
    Run {
        /// テンプレートのキー
        template: String,

        /// ワークフローのメタデータ（key=value、値は JSON として解釈できればそのまま）
        #[arg(long = "metadata", value_parser = parse_key_value)]
        metadata: Vec<(String, Value)>,

        /// 登録するプラットフォーム名（複数指定可）
        #[arg(long = "platform")]
        platforms: Vec<String>,
    },

    /// アップロード済みコンテンツの投稿を外部接続なしで予約
    Schedule {
        /// コンテンツ ID（または投稿 ID）
        content_id: String,

        /// 予約日時（RFC 3339、省略時は1時間後）
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// キャプション
        #[arg(long, default_value = "")]
        caption: String,

        /// 予約するプラットフォーム名（複数指定可）
        #[arg(long = "platform")]
        platforms: Vec<String>,
    },

    /// プラットフォーム横断の分析値を外部接続なしで集計
    Analytics {
        /// コンテンツ ID
        content_id: String,

        /// 集計するプラットフォーム名（複数指定可）
        #[arg(long = "platform")]
        platforms: Vec<String>,
    },

    /// テンプレートファイルを検証
    Validate {
        /// テンプレートファイル（TOML）
        file: PathBuf,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("key=value 形式ではありません: {raw}"))?;
    if key.is_empty() {
        return Err(format!("キーが空です: {raw}"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn load_templates(settings: &EngineSettings) -> Result<TemplateCatalog, Box<dyn Error>> {
    let mut catalog = TemplateCatalog::builtin();
    if let Some(dir) = &settings.templates_dir {
        let loaded = catalog.load_dir(dir)?;
        info!(directory = %dir.display(), loaded, "テンプレートを読み込みました");
    }
    Ok(catalog)
}

fn print_templates(catalog: &TemplateCatalog) {
    for template in catalog.iter() {
        let chain: Vec<&str> = template.steps().iter().map(|s| s.resolved_name()).collect();
        println!("{:<20} {}", template.key(), template.name());
        println!("{:<20} {}", "", chain.join(" -> "));
    }
}

/// 指定名（省略時は既定）のドライランプラットフォームを登録
fn dry_run_platforms(names: &[String]) -> PlatformManager {
    let mut platforms = PlatformManager::new();
    if names.is_empty() {
        for name in DEFAULT_PLATFORMS {
            platforms.add_platform(name, Arc::new(DryRunPlatform::new(name)));
        }
    } else {
        for name in names {
            platforms.add_platform(name.clone(), Arc::new(DryRunPlatform::new(name.clone())));
        }
    }
    platforms
}

async fn run(
    settings: EngineSettings,
    catalog: TemplateCatalog,
    template: &str,
    metadata: Vec<(String, Value)>,
    platform_names: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let platforms = dry_run_platforms(&platform_names);

    let notifier: Arc<dyn NotificationSink> = match &settings.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    let engine = WorkflowEngine::builder()
        .settings(settings)
        .templates(catalog)
        .generator(Arc::new(DryRunGenerator::default()))
        .quality_analyzer(Arc::new(HeuristicQualityAnalyzer::default()))
        .platforms(platforms)
        .notifier(notifier)
        .build();

    let metadata: Params = metadata.into_iter().collect();
    let workflow = engine.create_from_template(template, metadata).await?;
    engine.execute_workflow(&workflow.id).await?;

    let snapshot = engine.get_workflow_status(&workflow.id).await?;
    println!("{}", snapshot.to_json()?);

    if snapshot.status == WorkflowStatus::Failed {
        return Err(format!("ワークフロー {} が失敗しました", snapshot.id).into());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => EngineSettings::from_file(path)?,
        None => EngineSettings::default(),
    };
    let _guard = logging::init(&settings.log, cli.verbose)?;

    match cli.command {
        Command::Templates => {
            let catalog = load_templates(&settings)?;
            print_templates(&catalog);
        }
        Command::Run {
            template,
            metadata,
            platforms,
        } => {
            let catalog = load_templates(&settings)?;
            run(settings, catalog, &template, metadata, platforms).await?;
        }
        Command::Schedule {
            content_id,
            at,
            caption,
            platforms,
        } => {
            let manager = dry_run_platforms(&platforms);
            let at = at.unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));
            let results = manager
                .schedule_to_platforms(&manager.names(), &content_id, at, &caption)
                .await;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Analytics {
            content_id,
            platforms,
        } => {
            let analytics = dry_run_platforms(&platforms)
                .combined_analytics(&content_id)
                .await;
            println!("{}", serde_json::to_string_pretty(&analytics)?);
        }
        Command::Validate { file } => {
            let template = WorkflowTemplate::from_file(&file)?;
            println!(
                "OK: {} ({}) - {} ステップ",
                template.key(),
                template.name(),
                template.steps().len()
            );
        }
    }

    Ok(())
}
