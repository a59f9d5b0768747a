//! Acquisition graph.
//!
//! Directed acquirer → target graph keyed by company name. Built once from
//! resolved acquisitions, persisted as JSON and read many times.
//!
//! Artifact layout (`schema_version` 1):
//! - `nodes`: every [`CompanyNode`] with all attributes, in insertion order
//! - `edges`: `{source, target}` company names, in insertion order

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::resolve::{resolve_acquisitions, ResolvedAcquisition, UNKNOWN_SECTOR};
use super::view::ALL_COMPANIES;
use crate::data::{AcquisitionRecord, MarketCapRow, TickerName, TickerSector};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported graph schema version {found}")]
    UnsupportedSchema { found: u32 },

    #[error("Duplicate node '{0}' in graph artifact")]
    DuplicateNode(String),

    #[error("Edge {from} -> {to} references an unknown node")]
    DanglingEdge { from: String, to: String },
}

/// A company and whatever each of its roles has told us about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyNode {
    pub name: String,

    /// Sector of the most recent deal touching this company.
    pub industry: String,

    /// Set once the company has been seen as an acquirer.
    #[serde(default)]
    pub market_cap: Option<Decimal>,
    #[serde(default)]
    pub ticker: Option<String>,

    /// Set once the company has been seen as a target.
    #[serde(default)]
    pub year_acquired: Option<i32>,
    #[serde(default)]
    pub deal_date: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
}

impl CompanyNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            industry: UNKNOWN_SECTOR.to_string(),
            market_cap: None,
            ticker: None,
            year_acquired: None,
            deal_date: None,
            parent: None,
        }
    }
}

/// Serialized edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
}

/// On-disk form of a [`CompanyGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphArtifact {
    pub schema_version: u32,
    pub nodes: Vec<CompanyNode>,
    pub edges: Vec<EdgeRecord>,
}

/// Simple directed graph of companies, no parallel edges.
#[derive(Debug, Clone, Default)]
pub struct CompanyGraph {
    pub(crate) graph: DiGraph<CompanyNode, ()>,
    pub(crate) index: HashMap<String, NodeIndex>,
}

impl CompanyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_graph(graph: DiGraph<CompanyNode, ()>) -> Self {
        let index = graph
            .node_indices()
            .map(|idx| (graph[idx].name.clone(), idx))
            .collect();
        Self { graph, index }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&CompanyNode> {
        self.index.get(name).map(|&idx| &self.graph[idx])
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &CompanyNode> + '_ {
        self.graph.node_weights()
    }

    /// `(source, target)` names in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.graph.edge_references().map(|e| {
            (
                self.graph[e.source()].name.as_str(),
                self.graph[e.target()].name.as_str(),
            )
        })
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        match (self.index.get(source), self.index.get(target)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Companies acquired by `name`.
    pub fn acquisitions_of(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n].name.as_str())
            .collect();
        out.sort_unstable();
        out
    }

    /// Focus selector entries: [`ALL_COMPANIES`] then every name, sorted.
    pub fn company_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index.keys().cloned().collect();
        names.sort();
        std::iter::once(ALL_COMPANIES.to_string())
            .chain(names)
            .collect()
    }

    /// Distinct industries, sorted.
    pub fn industries(&self) -> Vec<&str> {
        self.graph
            .node_weights()
            .map(|n| n.industry.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn upsert(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(CompanyNode::new(name));
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn to_artifact(&self) -> GraphArtifact {
        GraphArtifact {
            schema_version: SCHEMA_VERSION,
            nodes: self.graph.node_weights().cloned().collect(),
            edges: self
                .edges()
                .map(|(source, target)| EdgeRecord {
                    source: source.to_string(),
                    target: target.to_string(),
                })
                .collect(),
        }
    }

    pub fn from_artifact(artifact: GraphArtifact) -> Result<Self, GraphError> {
        if artifact.schema_version != SCHEMA_VERSION {
            return Err(GraphError::UnsupportedSchema {
                found: artifact.schema_version,
            });
        }

        let mut graph = Self::new();
        for node in artifact.nodes {
            if graph.index.contains_key(&node.name) {
                return Err(GraphError::DuplicateNode(node.name));
            }
            let name = node.name.clone();
            let idx = graph.graph.add_node(node);
            graph.index.insert(name, idx);
        }

        for edge in artifact.edges {
            match (graph.index.get(&edge.source), graph.index.get(&edge.target)) {
                (Some(&a), Some(&b)) => {
                    graph.graph.update_edge(a, b, ());
                }
                _ => {
                    return Err(GraphError::DanglingEdge {
                        from: edge.source,
                        to: edge.target,
                    })
                }
            }
        }

        Ok(graph)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.to_artifact())?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        let artifact: GraphArtifact = serde_json::from_str(&content)?;
        Self::from_artifact(artifact)
    }
}

/// Accumulates resolved acquisitions into a [`CompanyGraph`].
///
/// Rows are applied strictly in order. Each role overwrites only its own
/// fields, so a company seen as both acquirer and target keeps both sets.
#[derive(Debug, Default)]
pub struct CompanyGraphBuilder {
    market_caps: HashMap<String, Decimal>,
    graph: CompanyGraph,
    applied: usize,
}

impl CompanyGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Market caps for acquirer nodes. Later rows replace earlier ones.
    pub fn with_market_caps(mut self, rows: &[MarketCapRow]) -> Self {
        for row in rows {
            if let Some(cap) = row.market_cap_decimal() {
                self.market_caps.insert(row.symbol.clone(), cap);
            }
        }
        self
    }

    pub fn add(&mut self, row: &ResolvedAcquisition) {
        let market_cap = self
            .market_caps
            .get(&row.ticker)
            .copied()
            .unwrap_or(Decimal::ZERO);

        let acquirer = self.graph.upsert(row.acquirer());
        {
            let node = &mut self.graph.graph[acquirer];
            node.industry = row.sector.clone();
            node.market_cap = Some(market_cap);
            node.ticker = Some(row.ticker.clone());
        }

        let target = self.graph.upsert(row.target());
        {
            let node = &mut self.graph.graph[target];
            node.industry = row.sector.clone();
            node.year_acquired = row.record.year;
            node.deal_date = row.record.deal_date.clone();
            node.parent = Some(row.acquirer().to_string());
        }

        self.graph.graph.update_edge(acquirer, target, ());
        self.applied += 1;
    }

    pub fn extend<'a>(&mut self, rows: impl IntoIterator<Item = &'a ResolvedAcquisition>) {
        for row in rows {
            self.add(row);
        }
    }

    pub fn build(self) -> CompanyGraph {
        info!(
            "Built company graph: {} nodes, {} edges from {} resolved rows",
            self.graph.node_count(),
            self.graph.edge_count(),
            self.applied
        );
        self.graph
    }
}

/// Resolve acquirers and build the graph in one pass.
///
/// Acquirer nodes get a zero market cap; use [`CompanyGraphBuilder`] with
/// [`CompanyGraphBuilder::with_market_caps`] to attach real values.
pub fn build_company_graph(
    acquisitions: &[AcquisitionRecord],
    names: &[TickerName],
    sectors: &[TickerSector],
) -> CompanyGraph {
    let resolved = resolve_acquisitions(acquisitions, names, sectors);
    let mut builder = CompanyGraphBuilder::new();
    builder.extend(&resolved);
    builder.build()
}
