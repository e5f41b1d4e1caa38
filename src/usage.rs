//! Token accounting and cost estimation.
//!
//! [`TokenUsage`] is an immutable value; two usages combine by pointwise
//! addition. [`UsageMeter`] is the running total owned by one
//! [`crate::gateway::ModelGateway`]. It is mutex-guarded so the gateway can be
//! shared behind an `Arc` even though the drivers call it one request at a time.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::sync::Mutex;

/// Prompt / completion / total token counts reported for one or more calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub const ZERO: TokenUsage = TokenUsage {
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
    };

    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Pointwise sum of two usages.
    pub fn combine(self, other: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        self.combine(rhs)
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = self.combine(rhs);
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> TokenUsage {
        iter.fold(TokenUsage::ZERO, TokenUsage::combine)
    }
}

/// Per-million-token prices in USD. Used for estimation only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Price of the default model, `gemini-2.5-flash`.
pub const DEFAULT_PRICING: Pricing = Pricing {
    input_per_million: 0.30,
    output_per_million: 2.50,
};

/// Known model prices (USD per 1M tokens: input, output).
const PRICE_TABLE: &[(&str, f64, f64)] = &[
    ("gemini-2.5-flash", 0.30, 2.50),
    ("gemini-2.5-pro", 1.25, 10.00),
    ("gemini-2.0-flash", 0.10, 0.40),
    ("gpt-4.1-nano", 0.10, 0.40),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1", 2.00, 8.00),
    ("gpt-4o", 2.50, 10.00),
];

impl Default for Pricing {
    fn default() -> Self {
        DEFAULT_PRICING
    }
}

impl Pricing {
    /// Look up the price of `model`, falling back to [`DEFAULT_PRICING`].
    pub fn for_model(model: &str) -> Pricing {
        PRICE_TABLE
            .iter()
            .find(|(name, _, _)| *name == model)
            .map(|&(_, input, output)| Pricing {
                input_per_million: input,
                output_per_million: output,
            })
            .unwrap_or(DEFAULT_PRICING)
    }

    /// `prompt/1e6 * input + completion/1e6 * output`.
    pub fn estimate(&self, usage: &TokenUsage) -> f64 {
        usage.prompt_tokens as f64 / 1e6 * self.input_per_million
            + usage.completion_tokens as f64 / 1e6 * self.output_per_million
    }
}

/// Render a dollar amount the way paper files store it: `$X.XXXX`.
pub fn format_cost(cost: f64) -> String {
    format!("${:.4}", cost)
}

/// Running total of every successful call made through one gateway.
#[derive(Debug, Default)]
pub struct UsageMeter {
    total: Mutex<TokenUsage>,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: TokenUsage) {
        let mut total = self.total.lock().unwrap_or_else(|p| p.into_inner());
        *total += usage;
    }

    pub fn snapshot(&self) -> TokenUsage {
        *self.total.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn reset(&self) {
        *self.total.lock().unwrap_or_else(|p| p.into_inner()) = TokenUsage::ZERO;
    }
}
