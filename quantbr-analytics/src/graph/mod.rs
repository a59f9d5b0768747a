//! Acquisition graph.
//!
//! - Acquirer name → ticker resolution
//! - Directed company graph with sector and market-cap attributes
//! - JSON persistence
//! - Ego-subgraph views

pub mod company_graph;
pub mod resolve;
pub mod view;

pub use company_graph::{
    build_company_graph, CompanyGraph, CompanyGraphBuilder, CompanyNode, EdgeRecord, GraphArtifact,
    GraphError, SCHEMA_VERSION,
};
pub use resolve::{match_tickers, resolve_acquisitions, write_resolved, ResolvedAcquisition, UNKNOWN_SECTOR};
pub use view::{extract_view, ALL_COMPANIES, DEFAULT_RADIUS};
