//! Built-in pricing table for the remote completion services.
//!
//! Prices are in USD per 1 million tokens, keyed `provider/model`. Each
//! provider may also carry a fallback price used for models it serves that
//! are not listed individually.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub const FREE: ModelPricing = ModelPricing {
        input_per_m: 0.0,
        output_per_m: 0.0,
    };

    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

const BUILTIN: &[(&str, f64, f64)] = &[
    // OpenAI
    ("openai/gpt-4o-mini", 0.15, 0.60),
    ("openai/gpt-4o", 2.5, 10.0),
    ("openai/gpt-4-turbo", 10.0, 30.0),
    ("openai/gpt-4", 30.0, 60.0),
    // Anthropic
    ("anthropic/claude-3-5-sonnet", 3.0, 15.0),
    ("anthropic/claude-3-5-haiku", 0.8, 4.0),
    ("anthropic/claude-3-opus", 15.0, 75.0),
    ("anthropic/claude-3-haiku", 0.25, 1.25),
    // Google
    ("google/gemini-2.0-flash", 0.075, 0.3),
    ("google/gemini-1.5-pro", 1.25, 5.0),
    // DeepSeek
    ("deepseek/deepseek-chat", 0.14, 0.28),
    ("deepseek/deepseek-reasoner", 0.55, 2.19),
    // Mistral
    ("mistral/mistral-small", 0.2, 0.6),
    ("mistral/mistral-large", 2.0, 6.0),
    ("mistral/codestral", 0.2, 0.6),
    // xAI
    ("xai/grok-2", 2.0, 10.0),
    ("xai/grok-2-mini", 0.2, 1.0),
    ("xai/grok-3", 3.0, 15.0),
    ("xai/grok-3-mini", 0.3, 1.5),
    // Together
    ("together/meta-llama/Llama-3.3-70B-Instruct-Turbo", 0.88, 0.88),
];

const PROVIDER_DEFAULTS: &[(&str, f64, f64)] = &[
    ("openai", 0.15, 0.60),
    ("anthropic", 3.0, 15.0),
    ("google", 0.075, 0.3),
    ("deepseek", 0.14, 0.28),
    ("mistral", 0.2, 0.6),
    ("xai", 2.0, 10.0),
    ("together", 0.6, 0.6),
];

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
    providers: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    pub fn with_defaults() -> Self {
        let prices = BUILTIN
            .iter()
            .map(|(key, i, o)| ((*key).to_string(), ModelPricing::new(*i, *o)))
            .collect();
        let providers = PROVIDER_DEFAULTS
            .iter()
            .map(|(key, i, o)| ((*key).to_string(), ModelPricing::new(*i, *o)))
            .collect();
        Self {
            prices: RwLock::new(prices),
            providers: RwLock::new(providers),
        }
    }

    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Exact `provider/model` lookup.
    pub fn get(&self, key: &str) -> Option<ModelPricing> {
        self.prices.read().get(key).copied()
    }

    pub fn set(&self, key: impl Into<String>, pricing: ModelPricing) {
        self.prices.write().insert(key.into(), pricing);
    }

    /// Fallback price for models of `provider` that have no entry.
    pub fn set_provider_default(&self, provider: impl Into<String>, pricing: ModelPricing) {
        self.providers.write().insert(provider.into(), pricing);
    }

    /// Resolve the price of `model` as served by `provider`.
    ///
    /// Tries `provider/model`, then any provider's entry for the bare model
    /// name, then the longest listed model name that prefixes `model`
    /// (`gpt-4o-mini-2024-07-18` resolves to `gpt-4o-mini`), and finally the
    /// provider's fallback price.
    pub fn resolve(&self, provider: &str, model: &str) -> Option<ModelPricing> {
        {
            let prices = self.prices.read();

            if let Some(p) = prices.get(&format!("{provider}/{model}")) {
                return Some(*p);
            }
            if let Some(p) = prices.get(model) {
                return Some(*p);
            }

            let model_lower = model.to_lowercase();
            let mut best: Option<(usize, ModelPricing)> = None;
            for (key, pricing) in prices.iter() {
                let bare_key = key
                    .split_once('/')
                    .map_or(key.as_str(), |(_, rest)| rest)
                    .to_lowercase();
                if model_lower.starts_with(&bare_key)
                    && best.is_none_or(|(len, _)| bare_key.len() > len)
                {
                    best = Some((bare_key.len(), *pricing));
                }
            }
            if let Some((_, p)) = best {
                return Some(p);
            }
        }

        self.providers.read().get(provider).copied()
    }

    /// Cost of a call, 0.0 when nothing resolves.
    pub fn compute_cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> f64 {
        self.resolve(provider, model)
            .map_or(0.0, |p| p.cost(input_tokens, output_tokens))
    }

    /// All listed `provider/model` keys, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.prices.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        let table = PricingTable::with_defaults();
        // (1000 * 0.15 + 500 * 0.60) / 1M
        let cost = table.compute_cost("openai", "gpt-4o-mini", 1000, 500);
        assert!((cost - 0.00045).abs() < 1e-10);
    }

    #[test]
    fn versioned_model_matches_longest_prefix() {
        let table = PricingTable::with_defaults();
        let p = table.resolve("openai", "gpt-4o-mini-2024-07-18").unwrap();
        assert_eq!(p, ModelPricing::new(0.15, 0.60));
        let p = table.resolve("xai", "grok-2-mini-beta").unwrap();
        assert_eq!(p, ModelPricing::new(0.2, 1.0));
    }

    #[test]
    fn provider_default_covers_unlisted_models() {
        let table = PricingTable::with_defaults();
        let p = table.resolve("together", "Qwen/Qwen2.5-72B").unwrap();
        assert_eq!(p, ModelPricing::new(0.6, 0.6));
    }

    #[test]
    fn unknown_provider_and_model_costs_nothing() {
        let table = PricingTable::with_defaults();
        assert!(table.resolve("acme", "rocket-1").is_none());
        assert!((table.compute_cost("acme", "rocket-1", 1000, 500) - 0.0).abs() < 1e-10);
    }

    #[test]
    fn overrides_replace_builtin_prices() {
        let table = PricingTable::with_defaults();
        table.set("openai/gpt-4o", ModelPricing::new(5.0, 20.0));
        let cost = table.compute_cost("openai", "gpt-4o", 1_000_000, 0);
        assert!((cost - 5.0).abs() < 1e-10);

        let empty = PricingTable::empty();
        assert!(empty.is_empty());
        empty.set_provider_default("acme", ModelPricing::new(1.0, 2.0));
        let cost = empty.compute_cost("acme", "anything", 1_000_000, 1_000_000);
        assert!((cost - 3.0).abs() < 1e-10);
    }

    #[test]
    fn models_are_sorted() {
        let models = PricingTable::with_defaults().models();
        assert!(models.contains(&"deepseek/deepseek-chat".to_string()));
        assert!(models.windows(2).all(|w| w[0] <= w[1]));
    }
}
