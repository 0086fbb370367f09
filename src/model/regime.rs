use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Market-condition label attached to every step of a return series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeLabel {
    TrendingUp,
    TrendingDown,
    HighVol,
    Crash,
}

impl RegimeLabel {
    pub const ALL: [RegimeLabel; 4] = [
        RegimeLabel::TrendingUp,
        RegimeLabel::TrendingDown,
        RegimeLabel::HighVol,
        RegimeLabel::Crash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrendingUp => "TRENDING_UP",
            Self::TrendingDown => "TRENDING_DOWN",
            Self::HighVol => "HIGH_VOL",
            Self::Crash => "CRASH",
        }
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegimeLabel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_uppercase();
        RegimeLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == key)
            .ok_or_else(|| AppError::invalid_config(format!("unknown regime label '{}'", s)))
    }
}
