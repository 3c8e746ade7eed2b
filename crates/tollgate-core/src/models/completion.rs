//! Completion requests and responses exchanged with the model-invocation
//! service.

use serde::{Deserialize, Serialize};

use crate::models::cache_entry::TokenUsage;
use crate::money::Money;

/// Whether the caller allows a previously stored answer to be reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    Cacheable,
    /// Always call the model; never serve from cache.
    #[default]
    Fresh,
}

/// Sampling parameters that influence the model's output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default)]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    /// Prompt or message list, opaque to the control plane.
    pub input: serde_json::Value,
    #[serde(default)]
    pub params: SamplingParams,
    #[serde(default)]
    pub cache_policy: CachePolicy,
    /// Worst-case cost, reserved against the budget before the call.
    pub estimated_cost: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub payload: serde_json::Value,
    pub usage: TokenUsage,
    /// Metered cost reported by billing.
    pub cost: Money,
}
