//! Model price tables.
//!
//! Prices are immutable values handed to whoever needs them; nothing here is
//! global. Costs are in nanodollars (1e-9 USD) per token, so $10.00 per 1M
//! tokens is 10_000 nanodollars per token.

use std::collections::HashMap;

/// Nanodollars per USD.
pub const NANOS_PER_USD: f64 = 1_000_000_000.0;

/// Pricing information for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPricing {
    /// Cost per input token in nanodollars.
    pub input_nanos_per_token: i64,
    /// Cost per output token in nanodollars.
    pub output_nanos_per_token: i64,
}

impl ModelPricing {
    pub const fn new(input: i64, output: i64) -> Self {
        Self {
            input_nanos_per_token: input,
            output_nanos_per_token: output,
        }
    }

    /// Calculate cost for a request.
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> i64 {
        (input_tokens as i64) * self.input_nanos_per_token
            + (output_tokens as i64) * self.output_nanos_per_token
    }
}

// =============================================================================
// PRICING DATA
// =============================================================================

// OpenAI chat, per 1M tokens:
// gpt-4-turbo: $10.00 input, $30.00 output
// gpt-4: $30.00 input, $60.00 output
// gpt-3.5-turbo: $0.50 input, $1.50 output
// Batch API: 50% discount

const GPT_4_TURBO: ModelPricing = ModelPricing::new(10_000, 30_000);
const GPT_4: ModelPricing = ModelPricing::new(30_000, 60_000);
const GPT_35_TURBO: ModelPricing = ModelPricing::new(500, 1_500);

const GPT_4_TURBO_BATCH: ModelPricing = ModelPricing::new(5_000, 15_000);
const GPT_4_BATCH: ModelPricing = ModelPricing::new(15_000, 30_000);
const GPT_35_TURBO_BATCH: ModelPricing = ModelPricing::new(250, 750);

// OpenAI embeddings
// text-embedding-3-large: $0.13/1M tokens
// text-embedding-3-small: $0.02/1M tokens
const OPENAI_EMBED_3_LARGE: ModelPricing = ModelPricing::new(130, 0);
const OPENAI_EMBED_3_SMALL: ModelPricing = ModelPricing::new(20, 0);

/// Per-model price table. Unknown models cost nothing.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    models: HashMap<String, ModelPricing>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.models.insert(model.into(), pricing);
        self
    }

    /// Synchronous chat and embedding prices.
    pub fn openai_sync() -> Self {
        Self::new()
            .with_model("gpt-4-turbo", GPT_4_TURBO)
            .with_model("gpt-4", GPT_4)
            .with_model("gpt-3.5-turbo", GPT_35_TURBO)
            .with_model("text-embedding-3-large", OPENAI_EMBED_3_LARGE)
            .with_model("text-embedding-3-small", OPENAI_EMBED_3_SMALL)
    }

    /// Discounted prices for the asynchronous batch API.
    pub fn openai_batch() -> Self {
        Self::new()
            .with_model("gpt-4-turbo", GPT_4_TURBO_BATCH)
            .with_model("gpt-4", GPT_4_BATCH)
            .with_model("gpt-3.5-turbo", GPT_35_TURBO_BATCH)
    }

    /// Get pricing for a model.
    pub fn get(&self, model_id: &str) -> Option<ModelPricing> {
        self.models.get(model_id).copied()
    }

    /// Cost of a call in nanodollars; zero for models not in the table.
    pub fn cost(&self, model_id: &str, input_tokens: u32, output_tokens: u32) -> i64 {
        self.get(model_id)
            .map(|p| p.calculate_cost(input_tokens, output_tokens))
            .unwrap_or(0)
    }
}

/// Convert nanodollars to USD for display.
pub fn nanos_to_usd(nanos: i64) -> f64 {
    nanos as f64 / NANOS_PER_USD
}
