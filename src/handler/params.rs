//! パラメーター読み取りの補助関数
//!
//! 値が存在しない場合はデフォルトを使い、型が合わない場合は
//! [`StepError::InvalidParam`] を返します。

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::step::Params;
use crate::error::StepError;

fn invalid(name: &str, reason: impl Into<String>) -> StepError {
    StepError::InvalidParam {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// 文字列パラメーター
pub fn string(params: &Params, name: &str, default: &str) -> Result<String, StepError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(invalid(name, "文字列ではありません")),
    }
}

/// 数値パラメーター
pub fn number(params: &Params, name: &str, default: f64) -> Result<f64, StepError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value.as_f64().ok_or_else(|| invalid(name, "数値ではありません")),
    }
}

/// 文字列リストパラメーター
///
/// 単一の文字列は要素1つのリストとして扱います。
pub fn string_list(params: &Params, name: &str) -> Result<Option<Vec<String>>, StepError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(name, "文字列以外の要素が含まれています"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(invalid(name, "文字列のリストではありません")),
    }
}

/// RFC 3339 形式の日時パラメーター
pub fn timestamp(params: &Params, name: &str) -> Result<Option<DateTime<Utc>>, StepError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| invalid(name, format!("RFC 3339 形式ではありません ({e})"))),
        Some(_) => Err(invalid(name, "文字列ではありません")),
    }
}

/// 配信先プラットフォームの指定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformSelection {
    /// 登録済みのすべて（`"all"` / `["all"]` / 省略）
    All,
    /// 名前で指定
    Named(Vec<String>),
}

/// `platforms` パラメーターを解釈
pub fn platforms(params: &Params) -> Result<PlatformSelection, StepError> {
    let names = string_list(params, "platforms")?;
    Ok(match names {
        None => PlatformSelection::All,
        Some(names) if names.len() == 1 && names[0] == "all" => PlatformSelection::All,
        Some(names) => PlatformSelection::Named(names),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_string_default_and_type_error() {
        let p = params(json!({"style": "anime", "quality": 3}));
        assert_eq!(string(&p, "style", "photorealistic").unwrap(), "anime");
        assert_eq!(string(&p, "workflow", "default").unwrap(), "default");
        assert!(matches!(
            string(&p, "quality", "standard"),
            Err(StepError::InvalidParam { .. })
        ));
    }

    #[test]
    fn test_number() {
        let p = params(json!({"min_quality": 0.9, "price": "free"}));
        assert_eq!(number(&p, "min_quality", 0.8).unwrap(), 0.9);
        assert_eq!(number(&p, "missing", 0.8).unwrap(), 0.8);
        assert!(number(&p, "price", 0.0).is_err());
    }

    #[test]
    fn test_string_list() {
        let p = params(json!({"tags": ["a", "b"], "single": "x", "bad": [1]}));
        assert_eq!(
            string_list(&p, "tags").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(string_list(&p, "single").unwrap(), Some(vec!["x".to_string()]));
        assert_eq!(string_list(&p, "none").unwrap(), None);
        assert!(string_list(&p, "bad").is_err());
    }

    #[test]
    fn test_timestamp() {
        let p = params(json!({"at": "2025-03-01T12:00:00Z", "bad": "tomorrow"}));
        let at = timestamp(&p, "at").unwrap().unwrap();
        assert_eq!(at.to_rfc3339(), "2025-03-01T12:00:00+00:00");
        assert!(timestamp(&p, "bad").is_err());
        assert!(timestamp(&p, "none").unwrap().is_none());
    }

    #[test]
    fn test_platform_selection() {
        assert_eq!(platforms(&Params::new()).unwrap(), PlatformSelection::All);
        assert_eq!(
            platforms(&params(json!({"platforms": "all"}))).unwrap(),
            PlatformSelection::All
        );
        assert_eq!(
            platforms(&params(json!({"platforms": ["onlyfans"]}))).unwrap(),
            PlatformSelection::Named(vec!["onlyfans".to_string()])
        );
        assert_eq!(
            platforms(&params(json!({"platforms": ["all"]}))).unwrap(),
            PlatformSelection::All
        );
    }

    #[test]
    fn test_platform_selection_mixed_list_stays_named() {
        assert_eq!(
            platforms(&params(json!({"platforms": ["onlyfans", "all"]}))).unwrap(),
            PlatformSelection::Named(vec!["onlyfans".to_string(), "all".to_string()])
        );
    }
}
