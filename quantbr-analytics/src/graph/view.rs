//! Ego-subgraph views for the network display.

use std::borrow::Cow;
use std::collections::VecDeque;

use tracing::debug;

use super::company_graph::CompanyGraph;

/// Focus value that selects the whole graph.
pub const ALL_COMPANIES: &str = "All Companies";

/// Hops around the focus company shown by default.
pub const DEFAULT_RADIUS: usize = 1;

/// Neighbourhood of `focus` within `radius` hops, ignoring edge direction.
///
/// Every edge between retained nodes is kept, direction unchanged.
/// [`ALL_COMPANIES`] and unknown names both return the full graph unchanged.
pub fn extract_view<'a>(graph: &'a CompanyGraph, focus: &str, radius: usize) -> Cow<'a, CompanyGraph> {
    if focus == ALL_COMPANIES {
        return Cow::Borrowed(graph);
    }

    let Some(&start) = graph.index.get(focus) else {
        debug!("Unknown focus '{}', showing the full graph", focus);
        return Cow::Borrowed(graph);
    };

    let mut keep = vec![false; graph.graph.node_count()];
    let mut queue = VecDeque::from([(start, 0usize)]);
    keep[start.index()] = true;

    while let Some((node, depth)) = queue.pop_front() {
        if depth == radius {
            continue;
        }
        for next in graph.graph.neighbors_undirected(node) {
            if !keep[next.index()] {
                keep[next.index()] = true;
                queue.push_back((next, depth + 1));
            }
        }
    }

    let sub = graph.graph.filter_map(
        |idx, node| keep[idx.index()].then(|| node.clone()),
        |_, edge| Some(*edge),
    );
    Cow::Owned(CompanyGraph::from_graph(sub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AcquisitionRecord, TickerName, TickerSector};
    use crate::graph::build_company_graph;

    /// A -> B -> C -> D, plus E -> B.
    fn chain() -> CompanyGraph {
        let records = vec![
            AcquisitionRecord::new("Alpha", "Bravo", Some(2010)),
            AcquisitionRecord::new("Bravo", "Charlie", Some(2011)),
            AcquisitionRecord::new("Charlie", "Delta", Some(2012)),
            AcquisitionRecord::new("Echo", "Bravo", Some(2013)),
        ];
        let names: Vec<TickerName> = ["Alpha", "Bravo", "Charlie", "Echo"]
            .iter()
            .map(|n| TickerName {
                symbol: n[..1].to_string(),
                name: Some(format!("{} Corp", n)),
            })
            .collect();
        let sectors = vec![TickerSector { symbol: "A".into(), sector: Some("Energy".into()) }];
        build_company_graph(&records, &names, &sectors)
    }

    #[test]
    fn test_all_companies_is_full_graph() {
        let graph = chain();
        let view = extract_view(&graph, ALL_COMPANIES, DEFAULT_RADIUS);
        assert!(matches!(view, Cow::Borrowed(_)));
        assert_eq!(view.node_count(), 5);
        assert_eq!(view.edge_count(), 4);
    }

    #[test]
    fn test_unknown_focus_fails_open() {
        let graph = chain();
        let view = extract_view(&graph, "Zulu", DEFAULT_RADIUS);
        assert!(matches!(view, Cow::Borrowed(_)));
        assert_eq!(view.node_count(), graph.node_count());
    }

    #[test]
    fn test_radius_one_is_undirected() {
        let graph = chain();
        let view = extract_view(&graph, "Bravo", 1);

        let mut names: Vec<&str> = view.nodes().map(|n| n.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Alpha", "Bravo", "Charlie", "Echo"]);
        assert_eq!(view.edge_count(), 3);
        assert!(view.has_edge("Alpha", "Bravo"));
        assert!(view.has_edge("Echo", "Bravo"));
        assert!(!view.has_edge("Bravo", "Alpha"));
    }

    #[test]
    fn test_radius_grows_view() {
        let graph = chain();
        assert_eq!(extract_view(&graph, "Delta", 0).node_count(), 1);
        assert_eq!(extract_view(&graph, "Delta", 1).node_count(), 2);
        assert_eq!(extract_view(&graph, "Delta", 2).node_count(), 3);
        assert_eq!(extract_view(&graph, "Delta", 3).node_count(), 5);
    }

    #[test]
    fn test_view_keeps_node_attributes() {
        let graph = chain();
        let view = extract_view(&graph, "Alpha", 1);
        assert_eq!(view.node("Alpha").unwrap().industry, "Energy");
        assert_eq!(view.node("Bravo").unwrap().parent.as_deref(), Some("Echo"));
        assert!(view.contains("Bravo"));
        assert!(!view.contains("Charlie"));
    }
}
