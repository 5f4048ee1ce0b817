//! Registry mapping model-family identifiers to backend variants.
//!
//! The set of variants is closed: every identifier resolves to one of the
//! [`ModelFamily`] values. Identifiers that are not registered fall back to
//! [`ModelFamily::GeneralVision2Seq`], which handles any encoder-decoder export
//! with a generic image processor.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Backend variants supported by the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Encoder-decoder trained for single text lines with fixed-geometry input.
    SpecializedEncoder,
    /// Generic vision-to-sequence model with aspect-preserving input.
    GeneralVision2Seq,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::SpecializedEncoder => write!(f, "specialized_encoder"),
            ModelFamily::GeneralVision2Seq => write!(f, "general_vision2seq"),
        }
    }
}

impl FromStr for ModelFamily {
    type Err = crate::core::config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "specialized_encoder" | "specialized" | "trocr" => Ok(ModelFamily::SpecializedEncoder),
            "general_vision2seq" | "general" | "vision2seq" => Ok(ModelFamily::GeneralVision2Seq),
            other => Err(crate::core::config::ConfigError::InvalidConfig {
                message: format!("unknown model family '{other}'"),
            }),
        }
    }
}

static FAMILIES: Lazy<HashMap<&'static str, ModelFamily>> = Lazy::new(|| {
    HashMap::from([
        ("trocr", ModelFamily::SpecializedEncoder),
        ("vision-encoder-decoder", ModelFamily::SpecializedEncoder),
        ("vision_encoder_decoder", ModelFamily::SpecializedEncoder),
        ("donut", ModelFamily::GeneralVision2Seq),
        ("donut-swin", ModelFamily::GeneralVision2Seq),
        ("nougat", ModelFamily::GeneralVision2Seq),
        ("pix2struct", ModelFamily::GeneralVision2Seq),
        ("vision2seq", ModelFamily::GeneralVision2Seq),
    ])
});

/// Lookup of model families by the `model_type` found in a model's `config.json`.
pub struct ModelFamilyRegistry;

impl ModelFamilyRegistry {
    /// Returns the registered family for `model_type`, if any.
    pub fn lookup(model_type: &str) -> Option<ModelFamily> {
        FAMILIES.get(model_type.trim().to_lowercase().as_str()).copied()
    }

    /// Resolves the family for a model, honouring an explicit override.
    ///
    /// `model_types` are tried in order; the first registered one decides.
    pub fn resolve(model_types: &[&str], explicit: Option<ModelFamily>) -> ModelFamily {
        if let Some(family) = explicit {
            return family;
        }
        if let Some(family) = model_types.iter().find_map(|t| Self::lookup(t)) {
            return family;
        }
        if !model_types.is_empty() {
            warn!(
                "model types {:?} are not registered, using {}",
                model_types,
                ModelFamily::GeneralVision2Seq
            );
        }
        ModelFamily::GeneralVision2Seq
    }

    /// Registered identifiers, sorted.
    pub fn identifiers() -> Vec<&'static str> {
        let mut ids: Vec<_> = FAMILIES.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trocr_identifiers_map_to_specialized() {
        assert_eq!(
            ModelFamilyRegistry::lookup("trocr"),
            Some(ModelFamily::SpecializedEncoder)
        );
        assert_eq!(
            ModelFamilyRegistry::lookup("Vision-Encoder-Decoder"),
            Some(ModelFamily::SpecializedEncoder)
        );
    }

    #[test]
    fn test_unknown_identifier_falls_back_to_general() {
        assert_eq!(ModelFamilyRegistry::lookup("blip"), None);
        assert_eq!(
            ModelFamilyRegistry::resolve(&["blip"], None),
            ModelFamily::GeneralVision2Seq
        );
        assert_eq!(
            ModelFamilyRegistry::resolve(&[], None),
            ModelFamily::GeneralVision2Seq
        );
    }

    #[test]
    fn test_donut_export_resolves_through_its_encoder() {
        assert_eq!(
            ModelFamilyRegistry::resolve(&["donut-swin", "mbart", "vision-encoder-decoder"], None),
            ModelFamily::GeneralVision2Seq
        );
        assert_eq!(
            ModelFamilyRegistry::resolve(&["vit", "trocr", "vision-encoder-decoder"], None),
            ModelFamily::SpecializedEncoder
        );
        assert_eq!(
            ModelFamilyRegistry::resolve(&["vit", "gpt2", "vision-encoder-decoder"], None),
            ModelFamily::SpecializedEncoder
        );
    }

    #[test]
    fn test_explicit_family_wins() {
        assert_eq!(
            ModelFamilyRegistry::resolve(&["trocr"], Some(ModelFamily::GeneralVision2Seq)),
            ModelFamily::GeneralVision2Seq
        );
    }

    #[test]
    fn test_family_parsing() {
        assert_eq!(
            "TrOCR".parse::<ModelFamily>().ok(),
            Some(ModelFamily::SpecializedEncoder)
        );
        assert!("resnet".parse::<ModelFamily>().is_err());
        assert!(ModelFamilyRegistry::identifiers().contains(&"donut"));
    }
}
