//! Cost estimation for generation jobs
//!
//! Every adapter prices its calls through one [`PriceTable`]. A handful of
//! models historically charged a fixed per-call constant that disagrees with
//! the table; those constants are kept in [`CostQuote::legacy_credits`] so both
//! figures can be compared, but the table value is what gets charged.

use crate::config::AtelierConfig;
use crate::protocol::{GenerationRequest, Quality};
use crate::providers::catalog::ModelId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a model's price is computed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceRule {
    /// Credits per generated image
    PerImage(f64),

    /// Credits per generated image, by requested quality
    PerImageByQuality { draft: f64, standard: f64, premium: f64 },

    /// Credits per second of generated video
    PerSecond(f64),

    /// Credits per call regardless of output
    Flat(f64),
}

impl PriceRule {
    pub fn is_non_negative(&self) -> bool {
        match *self {
            PriceRule::PerImage(price) | PriceRule::PerSecond(price) | PriceRule::Flat(price) => {
                price >= 0.0
            }
            PriceRule::PerImageByQuality {
                draft,
                standard,
                premium,
            } => draft >= 0.0 && standard >= 0.0 && premium >= 0.0,
        }
    }

    /// Billing unit, for messages
    pub fn unit(&self) -> &'static str {
        match self {
            PriceRule::PerImage(_) | PriceRule::PerImageByQuality { .. } => "per image",
            PriceRule::PerSecond(_) => "per second",
            PriceRule::Flat(_) => "per call",
        }
    }

    fn apply(&self, inputs: &CostInputs) -> f64 {
        match *self {
            PriceRule::PerImage(price) => price * inputs.count as f64,
            PriceRule::PerImageByQuality {
                draft,
                standard,
                premium,
            } => {
                let price = match inputs.quality {
                    Quality::Draft => draft,
                    Quality::Standard => standard,
                    Quality::Premium => premium,
                };
                price * inputs.count as f64
            }
            PriceRule::PerSecond(rate) => rate * inputs.duration_seconds.unwrap_or(0) as f64,
            PriceRule::Flat(price) => price,
        }
    }
}

/// Quantities that drive a price, independent of any live request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostInputs {
    /// Number of images
    pub count: u32,
    pub quality: Quality,
    /// Video length; models with a fixed clip length fall back to it
    pub duration_seconds: Option<u32>,
}

impl Default for CostInputs {
    fn default() -> Self {
        Self {
            count: 1,
            quality: Quality::Standard,
            duration_seconds: None,
        }
    }
}

impl CostInputs {
    pub fn images(count: u32) -> Self {
        Self {
            count,
            ..Default::default()
        }
    }

    pub fn seconds(duration_seconds: u32) -> Self {
        Self {
            duration_seconds: Some(duration_seconds),
            ..Default::default()
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Extract the priced quantities of a request
    pub fn from_request(request: &GenerationRequest) -> Self {
        let image = request.image_parameters();
        Self {
            count: request.count(),
            quality: image.and_then(|p| p.quality).unwrap_or_default(),
            duration_seconds: request.video_parameters().and_then(|p| p.duration_seconds),
        }
    }
}

/// Table price and, where one exists, the old per-adapter constant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostQuote {
    pub credits: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_credits: Option<f64>,
}

impl CostQuote {
    /// Whether the legacy constant disagrees with the table
    pub fn diverges(&self) -> bool {
        self.legacy_credits
            .map(|legacy| (legacy - self.credits).abs() > 1e-9)
            .unwrap_or(false)
    }
}

/// Per-model price rules
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    rules: HashMap<ModelId, PriceRule>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl PriceTable {
    /// Table with no prices; every estimate is zero
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Built-in list prices
    pub fn standard() -> Self {
        let rules = ModelId::ALL
            .iter()
            .map(|&model| (model, default_rule(model)))
            .collect();
        Self { rules }
    }

    /// Built-in prices with the `models.*.pricing` overrides applied
    pub fn from_config(config: &AtelierConfig) -> Self {
        let mut table = Self::standard();
        for (model, settings) in config.model_overrides() {
            if let Some(rule) = settings.pricing {
                table.set(model, rule);
            }
        }
        table
    }

    pub fn set(&mut self, model: ModelId, rule: PriceRule) {
        self.rules.insert(model, rule);
    }

    pub fn with_rule(mut self, model: ModelId, rule: PriceRule) -> Self {
        self.set(model, rule);
        self
    }

    pub fn rule(&self, model: ModelId) -> Option<&PriceRule> {
        self.rules.get(&model)
    }

    /// Estimated credits for `model`, rounded to four decimal places
    pub fn estimate(&self, model: ModelId, inputs: &CostInputs) -> f64 {
        let Some(rule) = self.rules.get(&model) else {
            return 0.0;
        };

        let inputs = CostInputs {
            duration_seconds: inputs
                .duration_seconds
                .or_else(|| model.default_duration_seconds()),
            ..*inputs
        };
        round_credits(rule.apply(&inputs))
    }

    pub fn quote(&self, model: ModelId, inputs: &CostInputs) -> CostQuote {
        CostQuote {
            credits: self.estimate(model, inputs),
            legacy_credits: legacy_credits(model),
        }
    }
}

fn round_credits(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn default_rule(model: ModelId) -> PriceRule {
    match model {
        ModelId::Imagen3 => PriceRule::PerImage(0.03),
        ModelId::GeminiFlashImage => PriceRule::PerImage(0.039),
        ModelId::Veo2 => PriceRule::PerSecond(0.35),
        ModelId::Veo3 => PriceRule::PerSecond(0.40),
        ModelId::StableImageUltra => PriceRule::PerImage(0.08),
        ModelId::StableImageCore => PriceRule::PerImage(0.03),
        ModelId::Sd3Large => PriceRule::PerImage(0.065),
        ModelId::StabilityInpaint => PriceRule::PerImage(0.03),
        ModelId::StabilityErase => PriceRule::PerImage(0.03),
        ModelId::StabilitySearchAndReplace => PriceRule::PerImage(0.04),
        ModelId::StabilityRemoveBackground => PriceRule::PerImage(0.02),
        ModelId::StabilityUpscaleFast => PriceRule::PerImage(0.01),
        ModelId::StabilityImageToVideo => PriceRule::Flat(0.20),
        ModelId::FluxSchnell => PriceRule::PerImage(0.003),
        ModelId::Flux11Pro => PriceRule::PerImage(0.04),
        ModelId::FluxFillPro => PriceRule::PerImage(0.05),
        ModelId::RecraftV3 => PriceRule::PerImage(0.04),
        ModelId::MinimaxVideo01 => PriceRule::Flat(0.50),
        ModelId::KlingVideo => PriceRule::PerSecond(0.05),
        ModelId::DallE3 => PriceRule::PerImageByQuality {
            draft: 0.04,
            standard: 0.04,
            premium: 0.08,
        },
        ModelId::GptImage1 => PriceRule::PerImageByQuality {
            draft: 0.011,
            standard: 0.042,
            premium: 0.167,
        },
        ModelId::FluxKontextPro => PriceRule::PerImage(0.04),
    }
}

/// Fixed per-call charges the adapters used before the table existed
fn legacy_credits(model: ModelId) -> Option<f64> {
    match model {
        ModelId::StabilityImageToVideo => Some(0.20),
        ModelId::StabilityRemoveBackground => Some(0.03),
        ModelId::StabilityUpscaleFast => Some(0.025),
        ModelId::MinimaxVideo01 => Some(0.50),
        ModelId::FluxKontextPro => Some(0.04),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_per_second_video_price() {
        let table = PriceTable::standard();
        assert_eq!(table.estimate(ModelId::Veo3, &CostInputs::seconds(8)), 3.20);
    }

    #[test]
    fn test_missing_duration_uses_model_default() {
        let table = PriceTable::standard();
        assert_eq!(table.estimate(ModelId::KlingVideo, &CostInputs::default()), 0.25);
    }

    #[test_case(Quality::Draft, 0.04 ; "draft")]
    #[test_case(Quality::Standard, 0.04 ; "standard")]
    #[test_case(Quality::Premium, 0.08 ; "premium")]
    fn test_quality_tiers(quality: Quality, expected: f64) {
        let table = PriceTable::standard();
        let inputs = CostInputs::images(1).with_quality(quality);
        assert_eq!(table.estimate(ModelId::DallE3, &inputs), expected);
    }

    #[test]
    fn test_per_image_scales_with_count() {
        let table = PriceTable::standard();
        assert_eq!(table.estimate(ModelId::Imagen3, &CostInputs::images(4)), 0.12);
    }

    #[test]
    fn test_flat_ignores_quantities() {
        let table = PriceTable::standard();
        assert_eq!(
            table.estimate(ModelId::MinimaxVideo01, &CostInputs::seconds(30)),
            0.50
        );
    }

    #[test]
    fn test_override_replaces_rule() {
        let table = PriceTable::standard().with_rule(ModelId::Veo2, PriceRule::PerSecond(0.40));
        assert_eq!(table.estimate(ModelId::Veo2, &CostInputs::seconds(8)), 3.20);
    }

    #[test]
    fn test_quote_keeps_legacy_constant() {
        let table = PriceTable::standard();
        let quote = table.quote(ModelId::StabilityUpscaleFast, &CostInputs::images(1));
        assert_eq!(quote.credits, 0.01);
        assert_eq!(quote.legacy_credits, Some(0.025));
        assert!(quote.diverges());

        let agreeing = table.quote(ModelId::FluxKontextPro, &CostInputs::images(1));
        assert!(!agreeing.diverges());

        let table_only = table.quote(ModelId::Imagen3, &CostInputs::images(1));
        assert_eq!(table_only.legacy_credits, None);
    }

    #[test]
    fn test_price_rule_serde_form() {
        let rule: PriceRule = serde_yaml::from_str("per_second: 0.35").unwrap();
        assert_eq!(rule, PriceRule::PerSecond(0.35));

        let by_quality: PriceRule =
            serde_yaml::from_str("per_image_by_quality:\n  draft: 0.01\n  standard: 0.02\n  premium: 0.03")
                .unwrap();
        assert_eq!(by_quality.unit(), "per image");
        assert!(!PriceRule::Flat(-1.0).is_non_negative());
    }

    #[test]
    fn test_empty_table_is_free() {
        assert_eq!(
            PriceTable::empty().estimate(ModelId::Veo3, &CostInputs::seconds(8)),
            0.0
        );
    }
}
