//! Historical candle series and cache
//!
//! Leaf dependency for all analysis: OHLCV series per (symbol, interval),
//! fetched page by page and maintained incrementally.

mod cache;
mod types;

pub use cache::{CacheConfig, SeriesCache};
pub use types::{merge_candles, CachedSeries, Candle, Interval};
