//! Prometheus metric descriptions
//!
//! Recording happens at the call sites; this module owns the catalog so the
//! exporter can serve described metrics from the first scrape.

/// Register descriptions for every metric the engine records
pub fn describe_metrics() {
    metrics::describe_counter!(
        "tradeloop_entries_total",
        "Positions opened by the decision loop"
    );
    metrics::describe_counter!(
        "tradeloop_close_failures_total",
        "Closing-order submissions that failed"
    );
    metrics::describe_counter!(
        "tradeloop_data_gaps_total",
        "Series served stale after failed gap repair"
    );
    metrics::describe_counter!(
        "tradeloop_sentiment_fallbacks_total",
        "Sentiment calls replaced by a neutral fallback"
    );
    metrics::describe_counter!(
        "tradeloop_snapshot_failures_total",
        "Background snapshot saves that failed"
    );
    metrics::describe_gauge!("tradeloop_open_positions", "Active (non-closed) positions");
    metrics::describe_gauge!("tradeloop_capital", "Allocatable capital");
    metrics::describe_gauge!("tradeloop_risk_multiplier", "Current risk multiplier");
    metrics::describe_gauge!("tradeloop_daily_trades", "Trades settled in the current UTC day");
    metrics::describe_histogram!(
        "tradeloop_cycle_duration_ms",
        "Wall-clock duration of one decision cycle"
    );
}
