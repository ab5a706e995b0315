//! Model-shorthand resolution and per-million-token pricing (§4.6, §4.13,
//! design notes "dynamic model shorthand").

/// USD price per million tokens, input and output, for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Model id this pricing applies to.
    pub model: &'static str,
    /// USD per million input tokens.
    pub input_per_million: f64,
    /// USD per million output tokens.
    pub output_per_million: f64,
}

const PRICING_TABLE: &[ModelPricing] = &[
    ModelPricing {
        model: "claude-opus-4",
        input_per_million: 15.0,
        output_per_million: 75.0,
    },
    ModelPricing {
        model: "claude-sonnet-4",
        input_per_million: 3.0,
        output_per_million: 15.0,
    },
    ModelPricing {
        model: "claude-haiku-4",
        input_per_million: 0.25,
        output_per_million: 1.25,
    },
];

/// The cheapest entry, used as the fallback for an unrecognized model id.
fn cheapest() -> ModelPricing {
    PRICING_TABLE
        .iter()
        .min_by(|a, b| a.input_per_million.total_cmp(&b.input_per_million))
        .copied()
        .unwrap_or(ModelPricing {
            model: "claude-haiku-4",
            input_per_million: 0.25,
            output_per_million: 1.25,
        })
}

/// Resolves a model shorthand (`haiku`, `sonnet`, `opus`) to its full model
/// id. Anything else (including an already-full id) passes through
/// unchanged, per the design notes' lookup-table rule.
#[must_use]
pub fn resolve_model_shorthand(shorthand: &str) -> String {
    match shorthand.to_ascii_lowercase().as_str() {
        "haiku" => "claude-haiku-4".to_string(),
        "sonnet" => "claude-sonnet-4".to_string(),
        "opus" => "claude-opus-4".to_string(),
        _ => shorthand.to_string(),
    }
}

/// Looks up the pricing row for `model`, falling back to the cheapest
/// known model for anything unrecognized.
#[must_use]
pub fn pricing_for(model: &str) -> ModelPricing {
    PRICING_TABLE
        .iter()
        .find(|p| p.model == model)
        .copied()
        .unwrap_or_else(cheapest)
}

/// Estimates USD cost for `input_tokens`/`output_tokens` at `model`'s price.
#[must_use]
pub fn estimate_cost_usd(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let pricing = pricing_for(model);
    (input_tokens as f64 / 1_000_000.0) * pricing.input_per_million
        + (output_tokens as f64 / 1_000_000.0) * pricing.output_per_million
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_resolves_to_full_ids() {
        assert_eq!(resolve_model_shorthand("haiku"), "claude-haiku-4");
        assert_eq!(resolve_model_shorthand("Sonnet"), "claude-sonnet-4");
        assert_eq!(resolve_model_shorthand("opus"), "claude-opus-4");
    }

    #[test]
    fn unknown_shorthand_passes_through() {
        assert_eq!(resolve_model_shorthand("claude-custom-id"), "claude-custom-id");
    }

    #[test]
    fn unknown_model_falls_back_to_cheapest() {
        let cost = estimate_cost_usd("totally-unknown-model", 1_000_000, 0);
        assert_eq!(cost, 0.25);
    }

    #[test]
    fn opus_is_priciest() {
        let opus = estimate_cost_usd("claude-opus-4", 1_000_000, 1_000_000);
        let haiku = estimate_cost_usd("claude-haiku-4", 1_000_000, 1_000_000);
        assert!(opus > haiku);
    }
}
