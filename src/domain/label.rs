use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Trading direction a vote or action commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeLabel {
    /// Enter or add to a long position
    Buy,
    /// Enter or add to a short position
    Sell,
    /// Stay out of the market
    Hold,
}

impl TradeLabel {
    /// All labels, in encoding order
    pub fn all() -> &'static [TradeLabel] {
        &[TradeLabel::Buy, TradeLabel::Sell, TradeLabel::Hold]
    }

    /// Stable index used by tallies and the state encoder
    pub fn index(self) -> usize {
        match self {
            TradeLabel::Buy => 0,
            TradeLabel::Sell => 1,
            TradeLabel::Hold => 2,
        }
    }

    /// Label at the given encoding index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(TradeLabel::Buy),
            1 => Some(TradeLabel::Sell),
            2 => Some(TradeLabel::Hold),
            _ => None,
        }
    }

    /// The opposing direction; `Hold` has none and maps to itself
    pub fn opposite(self) -> Self {
        match self {
            TradeLabel::Buy => TradeLabel::Sell,
            TradeLabel::Sell => TradeLabel::Buy,
            TradeLabel::Hold => TradeLabel::Hold,
        }
    }

    /// Whether this label commits capital
    pub fn is_directional(self) -> bool {
        !matches!(self, TradeLabel::Hold)
    }
}

impl Default for TradeLabel {
    fn default() -> Self {
        TradeLabel::Hold
    }
}

impl std::fmt::Display for TradeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeLabel::Buy => write!(f, "buy"),
            TradeLabel::Sell => write!(f, "sell"),
            TradeLabel::Hold => write!(f, "hold"),
        }
    }
}

impl FromStr for TradeLabel {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" | "long" => Ok(TradeLabel::Buy),
            "sell" | "short" => Ok(TradeLabel::Sell),
            "hold" | "neutral" => Ok(TradeLabel::Hold),
            _ => Err("invalid label; expected buy|sell|hold"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        for label in TradeLabel::all() {
            assert_eq!(TradeLabel::from_index(label.index()), Some(*label));
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("long".parse::<TradeLabel>().unwrap(), TradeLabel::Buy);
        assert_eq!("SHORT".parse::<TradeLabel>().unwrap(), TradeLabel::Sell);
        assert!("flat".parse::<TradeLabel>().is_err());
    }

    #[test]
    fn test_opposite() {
        assert_eq!(TradeLabel::Buy.opposite(), TradeLabel::Sell);
        assert_eq!(TradeLabel::Hold.opposite(), TradeLabel::Hold);
    }
}
