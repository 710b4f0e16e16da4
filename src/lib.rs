//! tradeloop: hybrid crypto trading decision engine
//!
//! This library provides the core components for:
//! - Historical OHLCV series caching with incremental refresh and gap repair
//! - Technical signal generation (RSI, MACD, Bollinger, MA cross, stochastic, patterns)
//! - Sentiment signals with hard timeouts and neutral fallbacks
//! - Deterministic technical/sentiment fusion into trade decisions
//! - Adaptive risk management with loss-streak throttling
//! - Position lifecycle state machine (open, closing, closed)
//! - Capital-based strategy tier selection
//! - Paper execution gateway and durable state snapshots
//! - Full observability stack

pub mod candles;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod fusion;
pub mod lifecycle;
pub mod providers;
pub mod risk;
pub mod sentiment;
pub mod strategy;
pub mod technical;
pub mod telemetry;
