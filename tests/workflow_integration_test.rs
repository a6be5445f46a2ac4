use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::Notify;

use content_workflow::config::{EngineSettings, Params, StepSpec, StepType, TemplateCatalog, WorkflowTemplate};
use content_workflow::engine::{EngineError, Payload, WorkflowEngine, WorkflowStatus};
use content_workflow::error::StepError;
use content_workflow::handler::{StepHandler, from_fn};
use content_workflow::provider::dry_run::{DryRunGenerator, DryRunPlatform, HeuristicQualityAnalyzer};
use content_workflow::provider::PlatformManager;

const EXAMPLE_TEMPLATE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/workflows/example.toml");

fn fast_settings() -> EngineSettings {
    EngineSettings::default().with_backoff_unit(Duration::from_millis(1))
}

fn dry_run_platforms() -> PlatformManager {
    PlatformManager::new()
        .with_platform("onlyfans", Arc::new(DryRunPlatform::new("onlyfans")))
        .with_platform("fansly", Arc::new(DryRunPlatform::new("fansly")))
}

fn dry_run_engine(quality_score: f64) -> WorkflowEngine {
    WorkflowEngine::builder()
        .settings(fast_settings())
        .generator(Arc::new(DryRunGenerator::default()))
        .quality_analyzer(Arc::new(HeuristicQualityAnalyzer::with_score(quality_score)))
        .platforms(dry_run_platforms())
        .build()
}

fn counting(counter: Arc<AtomicU32>) -> Arc<dyn StepHandler> {
    from_fn(move |_params, _ctx| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, StepError>(Payload::new())
        }
    })
}

/// 生成 + 品質チェック（スコア 0.95）で合格することをテスト
#[tokio::test]
async fn test_generate_and_qa_pass() {
    let engine = dry_run_engine(0.95);
    let workflow = engine
        .create_workflow(
            "qa_pass",
            vec![
                StepSpec::new("generate").param("prompt", json!("portrait")),
                StepSpec::new("qa_check"),
            ],
        )
        .await
        .unwrap();

    let results = engine.execute_workflow(&workflow.id).await.unwrap();
    let snapshot = engine.get_workflow_status(&workflow.id).await.unwrap();

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(snapshot.count_steps(WorkflowStatus::Completed), 2);
    assert_eq!(results["qa_check"]["passed"], json!(true));
    assert_eq!(results["generate"]["metadata"]["prompt"], json!("portrait"));
    assert!(snapshot.started_at.is_some());
    assert!(snapshot.completed_at.is_some());
}

/// 品質スコアが低くてもステップとしては成功し、ワークフローは完了する
#[tokio::test]
async fn test_qa_low_score_still_completes() {
    let engine = dry_run_engine(0.5);
    let workflow = engine
        .create_from_template("basic_generation", Params::new())
        .await
        .unwrap();

    let results = engine.execute_workflow(&workflow.id).await.unwrap();
    let snapshot = engine.get_workflow_status(&workflow.id).await.unwrap();

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(results["qa_check"]["passed"], json!(false));
    assert_eq!(results["qa_check"]["quality_score"], json!(0.5));
}

/// 画像なしのアップロードは max_retries + 1 回試行して失敗する
#[tokio::test]
async fn test_upload_without_image_fails_after_retries() {
    let notify_calls = Arc::new(AtomicU32::new(0));
    let engine = WorkflowEngine::builder()
        .settings(fast_settings())
        .platforms(dry_run_platforms())
        .handler(StepType::Notify, counting(Arc::clone(&notify_calls)))
        .build();
    let workflow = engine
        .create_workflow(
            "upload_only",
            vec![
                StepSpec::new("upload")
                    .param("platforms", json!(["onlyfans"]))
                    .with_max_retries(2),
                StepSpec::new("notify"),
            ],
        )
        .await
        .unwrap();

    let results = engine.execute_workflow(&workflow.id).await.unwrap();
    let snapshot = engine.get_workflow_status(&workflow.id).await.unwrap();

    assert_eq!(snapshot.status, WorkflowStatus::Failed);
    assert_eq!(snapshot.steps[0].status, WorkflowStatus::Failed);
    assert_eq!(snapshot.steps[0].retry_count, 3);
    assert!(
        snapshot.steps[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("入力が見つかりません")
    );
    assert!(!results.contains_key("upload"));

    // 失敗したステップより後は実行されない
    assert_eq!(snapshot.steps[1].status, WorkflowStatus::Pending);
    assert_eq!(notify_calls.load(Ordering::SeqCst), 0);
    assert!(!engine.is_running(&workflow.id).await);
}

/// 不正なステップ種別では何も登録されない
#[tokio::test]
async fn test_invalid_step_type_registers_nothing() {
    let engine = WorkflowEngine::new();
    let err = engine
        .create_workflow(
            "invalid",
            vec![StepSpec::new("generate"), StepSpec::new("teleport")],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidStepType(ref t) if t == "teleport"));
    assert!(engine.list_workflows().await.is_empty());
}

/// 実行中の二重実行は AlreadyRunning、キャンセルは次のステップ境界で効く
#[tokio::test]
async fn test_concurrent_execute_and_cancel() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let notify_calls = Arc::new(AtomicU32::new(0));

    let gate = {
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        from_fn(move |_params, _ctx| {
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            async move {
                started.notify_one();
                release.notified().await;
                Ok::<_, StepError>(Payload::new())
            }
        })
    };

    let engine = Arc::new(
        WorkflowEngine::builder()
            .handler(StepType::Target, gate)
            .handler(StepType::Notify, counting(Arc::clone(&notify_calls)))
            .build(),
    );
    let workflow = engine
        .create_workflow("gated", vec![StepSpec::new("target"), StepSpec::new("notify")])
        .await
        .unwrap();

    let handle = engine.spawn_workflow(workflow.id.clone());
    started.notified().await;

    // 実行中はステータス照会がブロックされない
    let snapshot = engine.get_workflow_status(&workflow.id).await.unwrap();
    assert_eq!(snapshot.status, WorkflowStatus::Running);
    assert_eq!(snapshot.steps[0].status, WorkflowStatus::Running);

    let err = engine.execute_workflow(&workflow.id).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyRunning(_)));
    assert!(matches!(
        engine.remove_workflow(&workflow.id).await,
        Err(EngineError::StillRunning(_))
    ));

    assert!(engine.cancel_workflow(&workflow.id).await);
    release.notify_one();

    let results = handle.await.unwrap().unwrap();
    let snapshot = engine.get_workflow_status(&workflow.id).await.unwrap();

    assert_eq!(snapshot.status, WorkflowStatus::Cancelled);
    // 実行中だったハンドラーは中断されず完了する
    assert_eq!(snapshot.steps[0].status, WorkflowStatus::Completed);
    assert!(results.contains_key("target"));
    assert_eq!(snapshot.steps[1].status, WorkflowStatus::Pending);
    assert_eq!(notify_calls.load(Ordering::SeqCst), 0);
    assert!(!engine.cancel_workflow(&workflow.id).await);
}

/// リトライ間隔が 2^n 単位で伸びることをテスト（仮想時間）
#[tokio::test(start_paused = true)]
async fn test_backoff_timing() {
    let attempts: Arc<StdMutex<Vec<tokio::time::Instant>>> = Arc::new(StdMutex::new(Vec::new()));
    let flaky = {
        let attempts = Arc::clone(&attempts);
        from_fn(move |_params, _ctx| {
            let attempts = Arc::clone(&attempts);
            async move {
                let n = {
                    let mut attempts = attempts.lock().unwrap();
                    attempts.push(tokio::time::Instant::now());
                    attempts.len()
                };
                if n < 3 {
                    Err(StepError::MissingInput("not yet".to_string()))
                } else {
                    Ok(Payload::new())
                }
            }
        })
    };

    let engine = WorkflowEngine::builder()
        .handler(StepType::Target, flaky)
        .build();
    let workflow = engine
        .create_workflow("backoff", vec![StepSpec::new("target")])
        .await
        .unwrap();

    engine.execute_workflow(&workflow.id).await.unwrap();
    let snapshot = engine.get_workflow_status(&workflow.id).await.unwrap();
    assert_eq!(snapshot.status, WorkflowStatus::Completed);

    let attempts = attempts.lock().unwrap();
    assert_eq!(attempts.len(), 3);
    let first_wait = attempts[1] - attempts[0];
    let second_wait = attempts[2] - attempts[1];
    let tolerance = Duration::from_millis(10);
    assert!(first_wait >= Duration::from_secs(2) && first_wait < Duration::from_secs(2) + tolerance);
    assert!(second_wait >= Duration::from_secs(4) && second_wait < Duration::from_secs(4) + tolerance);
}

/// ハンドラーには先行する完了済みステップの結果とメタデータだけが渡る
#[tokio::test]
async fn test_context_carries_prior_results_and_metadata() {
    let seen: Arc<StdMutex<Vec<(Vec<String>, Value)>>> = Arc::new(StdMutex::new(Vec::new()));
    let recorder = {
        let seen = Arc::clone(&seen);
        from_fn(move |_params, ctx| {
            let seen = Arc::clone(&seen);
            async move {
                let keys = ctx.previous_results.keys().cloned().collect();
                let campaign = ctx.metadata.get("campaign").cloned().unwrap_or(Value::Null);
                seen.lock().unwrap().push((keys, campaign));
                Ok::<_, StepError>(Payload::new())
            }
        })
    };

    let engine = WorkflowEngine::builder()
        .handler(StepType::Notify, recorder)
        .build();
    let mut metadata = Params::new();
    metadata.insert("campaign".to_string(), json!("spring"));
    let workflow = engine
        .create_workflow_with_metadata(
            "ctx",
            vec![
                StepSpec::new("notify").named("first"),
                StepSpec::new("target"),
                StepSpec::new("notify").named("last"),
            ],
            metadata,
        )
        .await
        .unwrap();

    engine.execute_workflow(&workflow.id).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].0.is_empty());
    assert_eq!(seen[1].0, vec!["first".to_string(), "target".to_string()]);
    assert_eq!(seen[1].1, json!("spring"));
}

/// 同名ステップの結果は後のもので上書きされる
#[tokio::test]
async fn test_duplicate_step_names_overwrite() {
    let engine = WorkflowEngine::new();
    let workflow = engine
        .create_workflow(
            "dup",
            vec![
                StepSpec::new("target").param("segments", json!(["a"])),
                StepSpec::new("target").param("segments", json!(["a", "b", "c"])),
            ],
        )
        .await
        .unwrap();

    let results = engine.execute_workflow(&workflow.id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results["target"]["estimated_reach"], json!(3000));
}

/// 全工程テンプレートをオフライン実装で最後まで流す
#[tokio::test]
async fn test_full_pipeline_with_dry_run_providers() {
    let engine = dry_run_engine(0.95);
    let workflow = engine
        .create_from_template("full_pipeline", Params::new())
        .await
        .unwrap();

    let results = engine.execute_workflow(&workflow.id).await.unwrap();
    let snapshot = engine.get_workflow_status(&workflow.id).await.unwrap();

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(snapshot.count_steps(WorkflowStatus::Completed), 7);
    for name in ["generate", "qa_check", "enhance", "target", "upload", "schedule", "notify"] {
        assert!(results.contains_key(name), "{name} の結果がありません");
    }
    assert_eq!(results["enhance"]["enhanced"], json!(false));
    assert_eq!(results["upload"]["results"]["onlyfans"]["success"], json!(true));
    assert_eq!(results["upload"]["results"]["fansly"]["success"], json!(true));
    assert_eq!(results["schedule"]["results"]["onlyfans"]["success"], json!(true));
    assert_eq!(results["notify"]["notified"], json!(true));

    let subject = results["notify"]["message"]["subject"].as_str().unwrap();
    assert_eq!(subject, format!("Workflow {} running", workflow.id));

    let listed = engine.list_workflows().await;
    assert_eq!(listed.len(), 1);
    assert!(snapshot.to_json().unwrap().contains("\"status\": \"completed\""));
}

/// 品質チェック不合格時は改善ステップが再生成し、アップロードはその画像を使う
#[tokio::test]
async fn test_full_pipeline_enhances_on_low_quality() {
    let engine = dry_run_engine(0.5);
    let workflow = engine
        .create_from_template("full_pipeline", Params::new())
        .await
        .unwrap();

    let results = engine.execute_workflow(&workflow.id).await.unwrap();

    assert_eq!(results["qa_check"]["passed"], json!(false));
    assert_eq!(results["enhance"]["enhanced"], json!(true));
    assert_ne!(
        results["enhance"]["result"]["image_data"],
        results["generate"]["image_data"]
    );
    assert_eq!(results["upload"]["uploaded"], json!(true));
}

#[test]
fn test_load_example_template() {
    let template = WorkflowTemplate::from_file(EXAMPLE_TEMPLATE).expect("Failed to load template");

    assert_eq!(template.key(), "spring_campaign");
    assert_eq!(template.name(), "Spring Campaign");
    let names: Vec<&str> = template.steps().iter().map(|s| s.resolved_name()).collect();
    assert_eq!(names, vec!["generate", "qa_check", "enhance", "upload", "notify"]);
    assert_eq!(template.steps()[3].max_retries, Some(2));
}

#[test]
fn test_template_roundtrip_with_real_file() {
    let original = WorkflowTemplate::from_file(EXAMPLE_TEMPLATE).expect("Failed to load template");
    let toml_string = original.to_toml().expect("Failed to serialize");
    let restored = WorkflowTemplate::from_toml(&toml_string).expect("Failed to parse");

    assert_eq!(restored, original);
}

/// ディレクトリから読み込んだテンプレートで実行できる
#[tokio::test]
async fn test_run_template_loaded_from_directory() {
    let mut catalog = TemplateCatalog::builtin();
    let loaded = catalog
        .load_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/workflows"))
        .unwrap();
    assert!(loaded >= 1);

    let engine = WorkflowEngine::builder()
        .settings(fast_settings())
        .templates(catalog)
        .generator(Arc::new(DryRunGenerator::default()))
        .quality_analyzer(Arc::new(HeuristicQualityAnalyzer::default()))
        .platforms(dry_run_platforms())
        .build();

    let workflow = engine
        .create_from_template("spring_campaign", Params::new())
        .await
        .unwrap();
    assert_eq!(workflow.steps[1].max_retries, 1);

    let results = engine.execute_workflow(&workflow.id).await.unwrap();
    let snapshot = engine.get_workflow_status(&workflow.id).await.unwrap();

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(results["generate"]["metadata"]["quality"], json!("high"));
    assert_eq!(results["qa_check"]["passed"], json!(true));
}
