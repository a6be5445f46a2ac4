//! エラー型の定義
//!
//! このモジュールは、content-workflow 全体で使用されるエラー型を定義します。
//!
//! - [`ConfigError`]: 設定ファイル・テンプレートファイルの読み込みエラー
//! - [`ProviderError`]: 外部コラボレーター（生成・品質分析・配信・通知）のエラー
//! - [`StepError`]: ステップハンドラーが返すエラー（リトライ対象）
//!
//! エンジン操作のエラー [`EngineError`](crate::engine::EngineError) は
//! `engine::result` に定義されています。

use thiserror::Error;

/// 設定関連のエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// ファイルの読み込みに失敗
    #[error("設定ファイルの読み込みに失敗しました: {0}")]
    FileRead(#[from] std::io::Error),

    /// TOML のデシリアライズに失敗
    #[error("TOML のデシリアライズに失敗しました: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    /// TOML のシリアライズに失敗
    #[error("TOML のシリアライズに失敗しました: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// バリデーションエラー
    #[error("設定のバリデーションに失敗しました: {0}")]
    Validation(String),
}

/// 外部コラボレーターのエラー
///
/// 生成プロバイダー、品質分析プロバイダー、配信プラットフォーム、
/// 通知シンクが失敗を報告した場合に使用します。
#[derive(Debug, Error)]
pub enum ProviderError {
    /// プロバイダーが失敗を報告した（`{success: false, error}` に相当）
    #[error("プロバイダーが失敗を報告しました: {0}")]
    Reported(String),

    /// HTTP 通信エラー
    #[error("HTTP 通信に失敗しました: {0}")]
    Http(#[from] reqwest::Error),

    /// 不正なレスポンス
    #[error("不正なレスポンス: {0}")]
    InvalidResponse(String),

    /// 未登録のプラットフォーム
    #[error("プラットフォーム '{0}' は登録されていません")]
    UnknownPlatform(String),
}

/// ステップハンドラーのエラー
///
/// ハンドラーが返したエラーはエンジンのリトライループで捕捉され、
/// リトライ上限を超えるとステップの `error` として記録されます。
#[derive(Debug, Error)]
pub enum StepError {
    /// ステップ種別に対応するハンドラーが登録されていない
    #[error("ステップ種別 '{0}' のハンドラーが登録されていません")]
    NoHandler(String),

    /// 前段ステップの結果が存在しない
    #[error("入力が見つかりません: {0}")]
    MissingInput(String),

    /// 外部コラボレーターの失敗
    #[error("プロバイダーエラー: {0}")]
    ProviderFailure(#[from] ProviderError),

    /// 必要なコラボレーターが未設定
    #[error("{0} が設定されていません")]
    NotConfigured(&'static str),

    /// パラメーターが不正
    #[error("パラメーター '{name}' が不正です: {reason}")]
    InvalidParam {
        /// パラメーター名
        name: String,
        /// 理由
        reason: String,
    },

    /// 結果のシリアライズに失敗
    #[error("シリアライズに失敗しました: {0}")]
    Serialization(#[from] serde_json::Error),
}
