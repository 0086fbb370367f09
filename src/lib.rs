pub mod allocation;
pub mod backtest;
pub mod config;
pub mod data;
pub mod decision_log;
pub mod error;
pub mod input;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod regime;
pub mod risk_overlay;
pub mod runtime;
pub mod simulation;
pub mod stress;
