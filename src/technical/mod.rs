//! Technical signal generation over cached series

mod generator;
mod indicators;
mod patterns;

pub use generator::{
    generate, Direction, SignalKind, TechnicalConfig, TechnicalReport, TechnicalSignal,
    VolatilityRegime,
};
pub use patterns::{PatternDirection, PatternHit};
