use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Token accounting attached to a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl UsageMetadata {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            cached_input_tokens: None,
            reasoning_tokens: None,
        }
    }
}

fn add_optional(left: Option<u64>, right: Option<u64>) -> Option<u64> {
    match (left, right) {
        (Some(left), Some(right)) => Some(left + right),
        (left, right) => left.or(right),
    }
}

impl AddAssign for UsageMetadata {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.total_tokens += rhs.total_tokens;
        self.cached_input_tokens = add_optional(self.cached_input_tokens, rhs.cached_input_tokens);
        self.reasoning_tokens = add_optional(self.reasoning_tokens, rhs.reasoning_tokens);
    }
}

impl Add for UsageMetadata {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl Sum for UsageMetadata {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl fmt::Display for UsageMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{input_tokens: {}, output_tokens: {}, total_tokens: {}",
            self.input_tokens, self.output_tokens, self.total_tokens
        )?;
        if let Some(cached) = self.cached_input_tokens {
            write!(f, ", cached_input_tokens: {cached}")?;
        }
        if let Some(reasoning) = self.reasoning_tokens {
            write!(f, ", reasoning_tokens: {reasoning}")?;
        }
        write!(f, "}}")
    }
}

/// Aggregates usage per model name across any number of calls.
#[derive(Debug, Default)]
pub struct UsageTracker {
    by_model: Mutex<BTreeMap<String, UsageMetadata>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, model: &str, usage: &UsageMetadata) {
        let mut by_model = self.by_model.lock().unwrap_or_else(PoisonError::into_inner);
        *by_model.entry(model.to_string()).or_default() += usage.clone();
        debug!(
            model = %model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "recorded token usage"
        );
    }

    pub fn snapshot(&self) -> BTreeMap<String, UsageMetadata> {
        self.by_model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn total(&self) -> UsageMetadata {
        self.snapshot().into_values().sum()
    }

    pub fn reset(&self) {
        self.by_model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
