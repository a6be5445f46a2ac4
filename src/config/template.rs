//! ワークフローテンプレートの読み込みと管理を行うモジュール
//!
//! # 責務
//!
//! ワークフローの雛形（名前付きのステップ列）を定義し、エンジンがそこから
//! [`Workflow`](crate::engine::Workflow) を生成できるようにします。
//!
//! ## 主な機能
//!
//! - **組み込みテンプレート**: `basic_generation` / `full_pipeline` / `batch_generation`
//! - **TOML パース**: 外部定義のテンプレートを読み込み、[`WorkflowTemplate`] に変換
//! - **カタログ**: [`TemplateCatalog`] がキーでテンプレートを引けるようにする
//!
//! ## 使用例
//!
//! ```toml
//! [template]
//! key = "quick_post"
//! name = "Quick Post"
//!
//! [[steps]]
//! type = "generate"
//! [steps.params]
//! quality = "standard"
//!
//! [[steps]]
//! type = "upload"
//! [steps.params]
//! platforms = "all"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::json;
use tracing::debug;

use super::dto::TemplateDto;
use super::settings::MAX_RETRIES_LIMIT;
use super::step::{StepSpec, StepType};
use crate::error::ConfigError;

/// ワークフローテンプレート（ドメインモデル）
///
/// バリデーション済みの状態を保証します。ステップの種別文字列はすべて
/// 既知の [`StepType`] です。
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTemplate {
    key: String,
    name: String,
    steps: Vec<StepSpec>,
}

impl WorkflowTemplate {
    /// テンプレートを生成（バリデーション付き）
    ///
    /// # エラー
    ///
    /// - [`ConfigError::Validation`] - キー・名前が空、ステップがない、未知のステップ種別、
    ///   リトライ上限が大きすぎる場合
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        steps: Vec<StepSpec>,
    ) -> Result<Self, ConfigError> {
        let key = key.into();
        let name = name.into();

        if key.trim().is_empty() {
            return Err(ConfigError::Validation("テンプレートの key が空です".to_string()));
        }
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "テンプレート '{key}' の name が空です"
            )));
        }
        if steps.is_empty() {
            return Err(ConfigError::Validation(format!(
                "テンプレート '{key}' にステップがありません"
            )));
        }
        for (index, step) in steps.iter().enumerate() {
            step.step_type.parse::<StepType>().map_err(|e| {
                ConfigError::Validation(format!("テンプレート '{key}' のステップ {index}: {e}"))
            })?;
            if step.max_retries.is_some_and(|n| n > MAX_RETRIES_LIMIT) {
                return Err(ConfigError::Validation(format!(
                    "テンプレート '{key}' のステップ {index}: max_retries は {MAX_RETRIES_LIMIT} 以下にしてください"
                )));
            }
        }

        Ok(Self { key, name, steps })
    }

    /// TOML ファイルからテンプレートを読み込む
    ///
    /// # 処理フロー
    ///
    /// 1. ファイル読み込み
    /// 2. TOML デシリアライズ → `TemplateDto`
    /// 3. バリデーション & 変換 → [`WorkflowTemplate`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// TOML 文字列からテンプレートを読み込む
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let dto: TemplateDto = toml::from_str(toml)?;
        Self::try_from(dto)
    }

    /// テンプレートを TOML 文字列に変換
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let dto = TemplateDto::from(self.clone());
        Ok(toml::to_string(&dto)?)
    }

    /// テンプレートを TOML ファイルに保存
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// テンプレートのキー（例: "full_pipeline"）
    pub fn key(&self) -> &str {
        &self.key
    }

    /// ワークフロー名として使われる表示名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// ステップ定義の列
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    /// 組み込みテンプレート: 生成 → 品質チェック
    pub fn basic_generation() -> Self {
        Self {
            key: "basic_generation".to_string(),
            name: "Basic Content Generation".to_string(),
            steps: vec![
                StepSpec::new("generate")
                    .named("generate")
                    .param("quality", json!("standard")),
                StepSpec::new("qa_check")
                    .named("qa_check")
                    .param("min_quality", json!(0.8)),
            ],
        }
    }

    /// 組み込みテンプレート: 生成から通知までの全工程
    pub fn full_pipeline() -> Self {
        Self {
            key: "full_pipeline".to_string(),
            name: "Full Content Pipeline".to_string(),
            steps: vec![
                StepSpec::new("generate")
                    .named("generate")
                    .param("quality", json!("high")),
                StepSpec::new("qa_check")
                    .named("qa_check")
                    .param("min_quality", json!(0.9)),
                StepSpec::new("enhance").named("enhance"),
                StepSpec::new("target")
                    .named("target")
                    .param("segments", json!(["high_engagement", "premium"])),
                StepSpec::new("upload")
                    .named("upload")
                    .param("platforms", json!(["onlyfans", "fansly"])),
                StepSpec::new("schedule").named("schedule"),
                StepSpec::new("notify")
                    .named("notify")
                    .param("type", json!("email")),
            ],
        }
    }

    /// 組み込みテンプレート: バッチ生成
    ///
    /// ステップ名が種別名と異なるため、品質チェックは `source` で
    /// 生成ステップの結果を参照します。
    pub fn batch_generation() -> Self {
        Self {
            key: "batch_generation".to_string(),
            name: "Batch Content Generation".to_string(),
            steps: vec![
                StepSpec::new("generate")
                    .named("generate_batch")
                    .param("batch_size", json!(5))
                    .param("quality", json!("standard")),
                StepSpec::new("qa_check")
                    .named("qa_batch")
                    .param("min_quality", json!(0.75))
                    .param("source", json!("generate_batch")),
                StepSpec::new("target")
                    .named("target_batch")
                    .param("segments", json!(["general"])),
            ],
        }
    }
}

/// DTO からドメインモデルへの変換（読み込み方向）
///
/// バリデーションを実施し、不正なデータの場合は [`ConfigError::Validation`] を返します。
impl TryFrom<TemplateDto> for WorkflowTemplate {
    type Error = ConfigError;

    fn try_from(dto: TemplateDto) -> Result<Self, Self::Error> {
        let steps = dto.steps.into_iter().map(StepSpec::from).collect();
        Self::new(dto.template.key, dto.template.name, steps)
    }
}

/// ドメインモデルから DTO への変換（書き込み方向）
impl From<WorkflowTemplate> for TemplateDto {
    fn from(template: WorkflowTemplate) -> Self {
        Self {
            template: super::dto::TemplateMetadataDto {
                key: template.key,
                name: template.name,
            },
            steps: template.steps.into_iter().map(Into::into).collect(),
        }
    }
}

/// キーで引けるテンプレートの集合
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, WorkflowTemplate>,
}

impl TemplateCatalog {
    /// 空のカタログ
    pub fn new() -> Self {
        Self::default()
    }

    /// 組み込みテンプレート3種を含むカタログ
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert(WorkflowTemplate::basic_generation());
        catalog.insert(WorkflowTemplate::full_pipeline());
        catalog.insert(WorkflowTemplate::batch_generation());
        catalog
    }

    /// テンプレートを追加（同じキーは上書き）
    pub fn insert(&mut self, template: WorkflowTemplate) {
        self.templates.insert(template.key.clone(), template);
    }

    /// キーでテンプレートを取得
    pub fn get(&self, key: &str) -> Option<&WorkflowTemplate> {
        self.templates.get(key)
    }

    /// 登録済みテンプレート（キー順）
    pub fn iter(&self) -> impl Iterator<Item = &WorkflowTemplate> {
        self.templates.values()
    }

    /// ディレクトリ内の `*.toml` をすべて読み込んで追加
    ///
    /// # 戻り値
    ///
    /// 読み込んだテンプレート数
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                let template = WorkflowTemplate::from_file(&path)?;
                debug!(key = template.key(), path = %path.display(), "テンプレートを読み込みました");
                self.insert(template);
                loaded += 1;
            }
        }
        Ok(loaded)
    }
}
