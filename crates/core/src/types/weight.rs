//! Weight tiers for purchase-size options.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown weight tier.
#[derive(thiserror::Error, Debug, Clone)]
#[error("unknown weight tier: {0}")]
pub struct WeightTierError(pub String);

/// A discrete purchase-size option for a product.
///
/// Each tier scales the product's base price by a fixed multiplier. Cart
/// lines for distinct tiers of the same product are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightTier {
    /// Full unit, base price unscaled.
    Full,
    /// Half unit at half the base price.
    Half,
    /// Quarter unit at a quarter of the base price.
    Quarter,
}

impl WeightTier {
    /// Price multiplier applied to the product's base price.
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Full => 1.0,
            Self::Half => 0.5,
            Self::Quarter => 0.25,
        }
    }

    /// Unit price for this tier, rounded to the nearest integer currency unit.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn unit_price(self, base_price: i64) -> i64 {
        (base_price as f64 * self.multiplier()).round() as i64
    }

    /// Canonical lowercase name, as stored and serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Half => "half",
            Self::Quarter => "quarter",
        }
    }
}

impl fmt::Display for WeightTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WeightTier {
    type Err = WeightTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "half" => Ok(Self::Half),
            "quarter" => Ok(Self::Quarter),
            other => Err(WeightTierError(other.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_price_scaling() {
        assert_eq!(WeightTier::Full.unit_price(1000), 1000);
        assert_eq!(WeightTier::Half.unit_price(1000), 500);
        assert_eq!(WeightTier::Quarter.unit_price(1000), 250);
    }

    #[test]
    fn test_unit_price_rounds_to_nearest() {
        // 999 * 0.5 = 499.5 and 999 * 0.25 = 249.75
        assert_eq!(WeightTier::Half.unit_price(999), 500);
        assert_eq!(WeightTier::Quarter.unit_price(999), 250);
        // 998 * 0.25 = 249.5 rounds up
        assert_eq!(WeightTier::Quarter.unit_price(998), 250);
    }

    #[test]
    fn test_parse_roundtrip() {
        for tier in [WeightTier::Full, WeightTier::Half, WeightTier::Quarter] {
            assert_eq!(tier.as_str().parse::<WeightTier>().unwrap(), tier);
        }
        assert!("double".parse::<WeightTier>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&WeightTier::Half).unwrap(),
            "\"half\""
        );
        let tier: WeightTier = serde_json::from_str("\"quarter\"").unwrap();
        assert_eq!(tier, WeightTier::Quarter);
    }
}
