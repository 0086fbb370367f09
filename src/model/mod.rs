pub mod features;
pub mod portfolio;
pub mod regime;
pub mod returns;
pub mod weights;

pub use features::{FeatureSet, RegimeFeatures};
pub use portfolio::{CashDecision, DeclineReasonCode, PortfolioState, RebalanceFill};
pub use regime::RegimeLabel;
pub use returns::{ReturnSeries, TRADING_DAYS_PER_YEAR};
pub use weights::{WeightVector, WEIGHT_SUM_TOLERANCE};
