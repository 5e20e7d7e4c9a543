//! Lenient decoding of model output.
//!
//! Models often wrap JSON in Markdown fences, add a sentence before it, or
//! return `{"results": [...]}` when asked for a bare array. Text-level
//! strategies are tried in [`DecodeStrategy::ORDER`]; list-shaped payloads are
//! then recovered via [`ListShape`].

use crate::utils::error::{AuditError, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// The whole (trimmed) text is JSON.
    Direct,
    /// JSON surrounded by ``` or ```json fences.
    Unfenced,
    /// JSON embedded in prose: first opening bracket to last closing one.
    Embedded,
}

impl DecodeStrategy {
    pub const ORDER: [DecodeStrategy; 3] = [
        DecodeStrategy::Direct,
        DecodeStrategy::Unfenced,
        DecodeStrategy::Embedded,
    ];

    pub fn apply(&self, raw: &str) -> Option<Value> {
        let candidate = match self {
            DecodeStrategy::Direct => Some(raw.trim()),
            DecodeStrategy::Unfenced => strip_code_fences(raw),
            DecodeStrategy::Embedded => embedded_json(raw),
        }?;
        serde_json::from_str(candidate).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListShape {
    TopLevel,
    /// Array found one level down, under this object key.
    NestedField(String),
}

#[derive(Debug, Clone)]
pub struct DecodedList {
    pub items: Vec<Value>,
    pub strategy: DecodeStrategy,
    pub shape: ListShape,
}

/// 去掉前後的 ``` 標記；沒有 fence 時回傳 None
pub fn strip_code_fences(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let rest = trimmed.strip_prefix("```")?;
    // 開頭 fence 後面可能接語言標籤，例如 ```json
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    Some(body.trim())
}

fn embedded_json(raw: &str) -> Option<&str> {
    let start = raw.find(['[', '{'])?;
    let closing = if raw[start..].starts_with('[') { ']' } else { '}' };
    let end = raw.rfind(closing)?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

/// 依序嘗試各策略，回傳第一個成功解析的 JSON 值
pub fn lenient_decode(raw: &str) -> Result<(Value, DecodeStrategy)> {
    DecodeStrategy::ORDER
        .iter()
        .find_map(|strategy| strategy.apply(raw).map(|value| (value, *strategy)))
        .ok_or_else(|| AuditError::DecodeError {
            message: format!("no JSON found in {} chars of model output", raw.len()),
        })
}

/// 取出 JSON 陣列：頂層陣列，或物件中第一個陣列欄位
pub fn recover_list(value: Value) -> Option<(Vec<Value>, ListShape)> {
    match value {
        Value::Array(items) => Some((items, ListShape::TopLevel)),
        Value::Object(map) => map.into_iter().find_map(|(key, v)| match v {
            Value::Array(items) => Some((items, ListShape::NestedField(key))),
            _ => None,
        }),
        _ => None,
    }
}

pub fn lenient_decode_list(raw: &str) -> Result<DecodedList> {
    let (value, strategy) = lenient_decode(raw)?;
    let (items, shape) = recover_list(value).ok_or_else(|| AuditError::DecodeError {
        message: "model output is valid JSON but contains no list".to_string(),
    })?;
    Ok(DecodedList {
        items,
        strategy,
        shape,
    })
}
