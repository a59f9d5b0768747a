//! Return and comparison metrics.
//!
//! - Monthly percent-return matrix across symbols
//! - Rolling correlation and volatility between two series
//! - Price ratio and cumulative return

pub mod comparison;
pub mod monthly;

pub use comparison::{
    compare_against_benchmark, compute_pairwise_metrics, index_display_name, BenchmarkComparison,
    PairwiseMetrics, DEFAULT_BENCHMARK, DEFAULT_COMPARISON_INDICES, ROLLING_WINDOW,
};
pub use monthly::{
    compute_monthly_returns, lookback_start, month_end, DroppedSymbol, Heatmap, MatrixError,
    ReturnMatrix, DEFAULT_LOOKBACK_YEARS,
};
