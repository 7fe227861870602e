//! Trade regime tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Market condition attached to an active trading cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeRegime {
    VolatilityExpansion,
    RangeBound,
    Trending,
    MeanReversion,
    /// Tag not in the known set; kept verbatim.
    Custom(String),
}

impl TradeRegime {
    /// Parse a tag. Accepts `snake_case` and `kebab-case`; unknown tags
    /// become [`TradeRegime::Custom`].
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "volatility_expansion" => Self::VolatilityExpansion,
            "range_bound" => Self::RangeBound,
            "trending" => Self::Trending,
            "mean_reversion" => Self::MeanReversion,
            _ => Self::Custom(tag.trim().to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::VolatilityExpansion => "volatility_expansion",
            Self::RangeBound => "range_bound",
            Self::Trending => "trending",
            Self::MeanReversion => "mean_reversion",
            Self::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for TradeRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tags() {
        assert_eq!(
            TradeRegime::from_tag("volatility-expansion"),
            TradeRegime::VolatilityExpansion
        );
        assert_eq!(TradeRegime::from_tag("RANGE_BOUND"), TradeRegime::RangeBound);
    }

    #[test]
    fn test_custom_tag_preserved() {
        let regime = TradeRegime::from_tag("funding_squeeze");
        assert_eq!(regime, TradeRegime::Custom("funding_squeeze".to_string()));
        assert_eq!(regime.tag(), "funding_squeeze");
    }
}
