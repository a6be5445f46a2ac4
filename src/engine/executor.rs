//! ワークフロー実行エンジン本体
//!
//! [`WorkflowEngine`] はワークフローの登録・実行・照会・キャンセルを行います。
//!
//! # 並行性
//!
//! - ワークフローごとに1つの実行タスク。ワークフロー内のステップは逐次実行
//! - 実行中 ID の集合（in-flight）で同一ワークフローの二重実行を防ぐ
//! - 各ワークフローレコードは個別の `Mutex` で保護し、ハンドラー呼び出し中は保持しない
//! - ハンドラーは spawn したタスク上で実行する
//!
//! # 使用例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use content_workflow::config::step::StepSpec;
//! use content_workflow::engine::WorkflowEngine;
//! use content_workflow::provider::dry_run::{DryRunGenerator, HeuristicQualityAnalyzer};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = WorkflowEngine::builder()
//!         .generator(Arc::new(DryRunGenerator::default()))
//!         .quality_analyzer(Arc::new(HeuristicQualityAnalyzer::default()))
//!         .build();
//!
//!     let workflow = engine
//!         .create_workflow(
//!             "portrait",
//!             vec![
//!                 StepSpec::new("generate").param("prompt", json!("portrait")),
//!                 StepSpec::new("qa_check"),
//!             ],
//!         )
//!         .await?;
//!
//!     let results = engine.execute_workflow(&workflow.id).await?;
//!     println!("{}", serde_json::to_string_pretty(&results)?);
//!     Ok(())
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::context::StepContext;
use super::result::{EngineError, WorkflowSnapshot};
use super::retry::backoff_delay;
use super::state::{Payload, Step, Workflow, WorkflowStatus};
use crate::config::settings::MAX_RETRIES_LIMIT;
use crate::config::step::{Params, StepSpec, StepType};
use crate::config::{EngineSettings, TemplateCatalog};
use crate::error::{ConfigError, StepError};
use crate::handler::{HandlerRegistry, Services, StepHandler};
use crate::provider::{GenerationProvider, NotificationSink, PlatformManager, QualityAnalyzer};

type WorkflowRecord = Arc<Mutex<Workflow>>;

/// 実行中のワークフローの後始末
///
/// 実行を受け付けた時点で生成し、正常終了時は [`RunGuard::finish`] で解除します。
/// 解除されないままドロップされた場合（future の破棄やタスクの abort）は
/// ワークフローを [`Workflow::abandon`] し、in-flight 集合から外します。
struct RunGuard {
    workflow_id: String,
    record: WorkflowRecord,
    in_flight: Arc<Mutex<HashSet<String>>>,
    armed: bool,
}

impl RunGuard {
    fn finish(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let workflow_id = std::mem::take(&mut self.workflow_id);
        warn!(workflow_id = %workflow_id, "ワークフローの実行が途中で破棄されました");

        if let (Ok(mut workflow), Ok(mut in_flight)) =
            (self.record.try_lock(), self.in_flight.try_lock())
        {
            workflow.abandon();
            in_flight.remove(&workflow_id);
            return;
        }

        // ロック中なら解放を待つタスクに任せる
        let record = Arc::clone(&self.record);
        let in_flight = Arc::clone(&self.in_flight);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    record.lock().await.abandon();
                    in_flight.lock().await.remove(&workflow_id);
                });
            }
            Err(e) => {
                error!(workflow_id = %workflow_id, error = %e, "後始末を実行できませんでした");
            }
        }
    }
}

/// [`WorkflowEngine`] のビルダー
///
/// コラボレーターは任意です。未設定の場合の振る舞いは各ハンドラーが決めます。
#[derive(Default)]
pub struct EngineBuilder {
    settings: EngineSettings,
    templates: Option<TemplateCatalog>,
    services: Services,
    overrides: Vec<(StepType, Option<Arc<dyn StepHandler>>)>,
}

impl EngineBuilder {
    /// エンジン設定を指定
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// テンプレートカタログを指定（省略時は組み込みテンプレート）
    pub fn templates(mut self, templates: TemplateCatalog) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.services.generator = Some(generator);
        self
    }

    pub fn quality_analyzer(mut self, analyzer: Arc<dyn QualityAnalyzer>) -> Self {
        self.services.quality = Some(analyzer);
        self
    }

    pub fn platforms(mut self, platforms: PlatformManager) -> Self {
        self.services.platforms = Some(platforms);
        self
    }

    /// 通知シンクを指定（省略時は [`crate::provider::LogNotifier`]）
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.services.notifier = notifier;
        self
    }

    /// 標準ハンドラーを差し替える
    pub fn handler(mut self, step_type: StepType, handler: Arc<dyn StepHandler>) -> Self {
        self.overrides.push((step_type, Some(handler)));
        self
    }

    /// ハンドラーを登録しない（その種別のステップは NoHandler で失敗する）
    pub fn without_handler(mut self, step_type: StepType) -> Self {
        self.overrides.push((step_type, None));
        self
    }

    pub fn build(self) -> WorkflowEngine {
        let mut handlers = HandlerRegistry::standard(Arc::new(self.services));
        for (step_type, handler) in self.overrides {
            match handler {
                Some(handler) => handlers.register(step_type, handler),
                None => {
                    handlers.remove(step_type);
                }
            }
        }

        WorkflowEngine {
            settings: self.settings,
            templates: self.templates.unwrap_or_else(TemplateCatalog::builtin),
            handlers,
            workflows: RwLock::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

/// ワークフロー実行エンジン
///
/// ワークフローレコードを排他的に所有し、呼び出し側にはクローンかスナップショットを返します。
pub struct WorkflowEngine {
    settings: EngineSettings,
    templates: TemplateCatalog,
    handlers: HandlerRegistry,
    workflows: RwLock<HashMap<String, WorkflowRecord>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl WorkflowEngine {
    /// 標準ハンドラーと組み込みテンプレートでエンジンを生成
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.templates
    }

    /// ステップ定義の列からワークフローを生成して登録
    ///
    /// 1つでも不正な種別があれば [`EngineError::InvalidStepType`] を返し、何も登録しません。
    pub async fn create_workflow(
        &self,
        name: &str,
        steps: Vec<StepSpec>,
    ) -> Result<Workflow, EngineError> {
        self.create_workflow_with_metadata(name, steps, Params::new())
            .await
    }

    /// メタデータ付きでワークフローを生成して登録
    pub async fn create_workflow_with_metadata(
        &self,
        name: &str,
        steps: Vec<StepSpec>,
        metadata: Params,
    ) -> Result<Workflow, EngineError> {
        let steps = steps
            .into_iter()
            .map(|spec| self.build_step(spec))
            .collect::<Result<Vec<_>, _>>()?;

        let workflow = Workflow::new(name, steps, metadata);
        info!(workflow_id = %workflow.id, name, steps = workflow.steps.len(), "ワークフローを登録しました");

        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), Arc::new(Mutex::new(workflow.clone())));
        Ok(workflow)
    }

    /// テンプレートからワークフローを生成して登録
    pub async fn create_from_template(
        &self,
        key: &str,
        metadata: Params,
    ) -> Result<Workflow, EngineError> {
        let template = self
            .templates
            .get(key)
            .ok_or_else(|| EngineError::TemplateNotFound(key.to_string()))?;
        self.create_workflow_with_metadata(template.name(), template.steps().to_vec(), metadata)
            .await
    }

    fn build_step(&self, spec: StepSpec) -> Result<Step, EngineError> {
        let step_type: StepType = spec
            .step_type
            .parse()
            .map_err(|_| EngineError::InvalidStepType(spec.step_type.clone()))?;

        let max_retries = spec.max_retries.unwrap_or(self.settings.default_max_retries);
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Validation(format!(
                "max_retries は {MAX_RETRIES_LIMIT} 以下である必要があります: {max_retries}"
            ))
            .into());
        }

        let name = spec.resolved_name().to_string();
        Ok(Step::new(step_type, name, spec.params, max_retries))
    }

    async fn record(&self, workflow_id: &str) -> Result<WorkflowRecord, EngineError> {
        self.workflows
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(workflow_id.to_string()))
    }

    /// ワークフローを実行し、結果マップを返す
    ///
    /// ステップの失敗はエラーとしては返らず、ワークフローのステータスに反映されます。
    /// 同じワークフローが実行中の場合は [`EngineError::AlreadyRunning`] を返します。
    pub async fn execute_workflow(&self, workflow_id: &str) -> Result<Payload, EngineError> {
        let record = self.record(workflow_id).await?;

        let guard = {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(workflow_id.to_string()) {
                warn!(workflow_id, "ワークフローは既に実行中です");
                return Err(EngineError::AlreadyRunning(workflow_id.to_string()));
            }
            let guard = RunGuard {
                workflow_id: workflow_id.to_string(),
                record: Arc::clone(&record),
                in_flight: Arc::clone(&self.in_flight),
                armed: true,
            };
            record.lock().await.begin_run();
            guard
        };
        info!(workflow_id, "ワークフローの実行を開始します");

        let outcome = self.run_steps(workflow_id, &record).await;

        let (status, results) = {
            let mut workflow = record.lock().await;
            if let Err(e) = outcome {
                error!(workflow_id, error = %e, "ワークフローの実行中にエラーが発生しました");
                workflow.status = WorkflowStatus::Failed;
                workflow.results.insert("error".to_string(), json!(e.to_string()));
            }
            workflow.completed_at = Some(Utc::now());
            (workflow.status, workflow.results.clone())
        };
        self.in_flight.lock().await.remove(workflow_id);
        guard.finish();

        info!(workflow_id, %status, "ワークフローの実行が終了しました");
        Ok(results)
    }

    /// ワークフローを別タスクで実行
    pub fn spawn_workflow(
        self: &Arc<Self>,
        workflow_id: impl Into<String>,
    ) -> JoinHandle<Result<Payload, EngineError>> {
        let engine = Arc::clone(self);
        let workflow_id = workflow_id.into();
        tokio::spawn(async move { engine.execute_workflow(&workflow_id).await })
    }

    async fn run_steps(&self, workflow_id: &str, record: &WorkflowRecord) -> Result<(), EngineError> {
        let step_count = record.lock().await.steps.len();

        for index in 0..step_count {
            if record.lock().await.status == WorkflowStatus::Cancelled {
                info!(workflow_id, "キャンセルされたため残りのステップを実行しません");
                return Ok(());
            }

            if self.execute_step(workflow_id, record, index).await? == WorkflowStatus::Failed {
                record.lock().await.status = WorkflowStatus::Failed;
                return Ok(());
            }
        }

        let mut workflow = record.lock().await;
        if workflow.status == WorkflowStatus::Running {
            workflow.status = WorkflowStatus::Completed;
        }
        Ok(())
    }

    /// 1ステップをリトライ付きで実行し、最終ステータスを返す
    async fn execute_step(
        &self,
        workflow_id: &str,
        record: &WorkflowRecord,
        index: usize,
    ) -> Result<WorkflowStatus, EngineError> {
        let (step_type, step_name) = {
            let mut workflow = record.lock().await;
            let step = &mut workflow.steps[index];
            step.mark_running();
            (step.step_type, step.name.clone())
        };
        info!(workflow_id, step = %step_name, %step_type, "ステップを開始します");

        let Some(handler) = self.handlers.get(step_type) else {
            let err = StepError::NoHandler(step_type.to_string());
            error!(workflow_id, step = %step_name, error = %err, "ステップが失敗しました");
            record.lock().await.steps[index].mark_failed(err.to_string());
            return Ok(WorkflowStatus::Failed);
        };

        loop {
            let (params, context, attempt) = {
                let workflow = record.lock().await;
                let step = &workflow.steps[index];
                let context = StepContext::build(&workflow, &step.id);
                (step.params.clone(), context, step.retry_count + 1)
            };

            let handler = Arc::clone(&handler);
            let task = tokio::spawn(async move { handler.handle(&params, &context).await });
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    let reason = join_error.to_string();
                    record.lock().await.steps[index].mark_failed(reason.clone());
                    return Err(EngineError::HandlerAborted {
                        step: step_name,
                        reason,
                    });
                }
            };

            let mut guard = record.lock().await;
            let workflow = &mut *guard;
            let step = &mut workflow.steps[index];

            match outcome {
                Ok(result) => {
                    workflow
                        .results
                        .insert(step_name.clone(), Value::Object(result.clone()));
                    step.mark_completed(result);
                    info!(workflow_id, step = %step_name, attempt, "ステップが完了しました");
                    return Ok(WorkflowStatus::Completed);
                }
                Err(e) => {
                    step.retry_count += 1;
                    warn!(workflow_id, step = %step_name, attempt, error = %e, "ステップの試行が失敗しました");

                    if step.retry_count > step.max_retries {
                        step.mark_failed(e.to_string());
                        error!(workflow_id, step = %step_name, attempts = attempt, "リトライ上限に達しました");
                        return Ok(WorkflowStatus::Failed);
                    }

                    let delay = backoff_delay(
                        self.settings.backoff_unit,
                        step.retry_count,
                        self.settings.max_backoff,
                    );
                    drop(guard);
                    debug!(workflow_id, step = %step_name, ?delay, "リトライまで待機します");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// ワークフローのスナップショットを取得
    pub async fn get_workflow_status(
        &self,
        workflow_id: &str,
    ) -> Result<WorkflowSnapshot, EngineError> {
        let record = self.record(workflow_id).await?;
        let workflow = record.lock().await;
        Ok(WorkflowSnapshot::from(&*workflow))
    }

    /// ワークフローレコードのコピーを取得
    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, EngineError> {
        let record = self.record(workflow_id).await?;
        let workflow = record.lock().await;
        Ok(workflow.clone())
    }

    /// 登録済みの全ワークフローのスナップショット（生成日時順）
    pub async fn list_workflows(&self) -> Vec<WorkflowSnapshot> {
        let records: Vec<WorkflowRecord> = self.workflows.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(records.len());
        for record in records {
            snapshots.push(WorkflowSnapshot::from(&*record.lock().await));
        }
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        snapshots
    }

    /// 実行中かどうか
    pub async fn is_running(&self, workflow_id: &str) -> bool {
        self.in_flight.lock().await.contains(workflow_id)
    }

    /// 実行中のワークフローをキャンセル
    ///
    /// 次のステップ境界で停止します。実行中のハンドラーは中断しません。
    /// 存在しない・実行中でない場合は何もせず `false` を返します。
    pub async fn cancel_workflow(&self, workflow_id: &str) -> bool {
        let Ok(record) = self.record(workflow_id).await else {
            return false;
        };

        let in_flight = self.in_flight.lock().await;
        if !in_flight.contains(workflow_id) {
            return false;
        }

        let mut workflow = record.lock().await;
        if workflow.status != WorkflowStatus::Running {
            return false;
        }
        workflow.status = WorkflowStatus::Cancelled;
        info!(workflow_id, "ワークフローをキャンセルしました");
        true
    }

    /// 実行中でないワークフローを登録から外し、最終状態を返す
    pub async fn remove_workflow(&self, workflow_id: &str) -> Result<Workflow, EngineError> {
        let in_flight = self.in_flight.lock().await;
        if in_flight.contains(workflow_id) {
            return Err(EngineError::StillRunning(workflow_id.to_string()));
        }

        let record = self
            .workflows
            .write()
            .await
            .remove(workflow_id)
            .ok_or_else(|| EngineError::NotFound(workflow_id.to_string()))?;
        drop(in_flight);

        let workflow = record.lock().await.clone();
        debug!(workflow_id, "ワークフローを登録から外しました");
        Ok(workflow)
    }
}
