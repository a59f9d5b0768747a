pub mod config;
pub mod data;
pub mod graph;
pub mod metrics;

// Re-export commonly used types
pub use config::{AppConfig, FeedConfig};
pub use data::{CsvPriceFeed, FeedError, FmpClient, MemoryPriceFeed, PriceBar, PriceFeed, PriceSeries};
pub use graph::{build_company_graph, extract_view, CompanyGraph, CompanyNode, GraphError};
pub use metrics::{compute_monthly_returns, compute_pairwise_metrics, PairwiseMetrics, ReturnMatrix};
