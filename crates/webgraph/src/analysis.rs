//! Structural metrics and the targeted-node-removal attack simulation.
//!
//! Every function here ignores nodes tagged [`MARKED_AS_DELETED`] — they
//! remain in the graph structurally but are logically absent from any
//! analysis.

use rand::Rng;

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::node::{Node, NodeId, MARKED_AS_DELETED};

fn live_nodes(graph: &Graph) -> impl Iterator<Item = (NodeId, &Node)> {
    graph.nodes().filter(|(_, n)| !n.is_deleted())
}

/// Fraction of non-deleted nodes with at least one inbound or outbound edge,
/// over the *total* node count (deleted nodes included in the denominator).
pub fn edges_index(graph: &Graph) -> f64 {
    let n = graph.node_count();
    if n == 0 {
        return 0.0;
    }

    let with_edges = live_nodes(graph)
        .filter(|(_, node)| !node.inbound().is_empty() || !node.outbound().is_empty())
        .count();

    with_edges as f64 / n as f64
}

/// `L / (N * (N - 1))`, using the graph's total link counter and total node
/// count. Zero for graphs of zero or one node.
pub fn links_index(graph: &Graph) -> f64 {
    let n = graph.node_count() as u64;
    if n < 2 {
        return 0.0;
    }
    graph.total_links() as f64 / (n * (n - 1)) as f64
}

/// The link index of the subgraph formed by `node` and its distinct
/// in/out neighbors (in/out counted separately, not deduplicated).
fn local_link_index(node: &Node) -> f64 {
    let k = node.inbound().len() + node.outbound().len() + 1;
    if k < 2 {
        return 0.0;
    }
    let s = node.inbound_count() + node.outbound_count();
    s as f64 / (k * (k - 1)) as f64
}

/// Mean [`local_link_index`] over non-deleted nodes with total degree >= 2;
/// zero if no such node exists.
pub fn clustering_coefficient(graph: &Graph) -> f64 {
    let mut sum = 0.0;
    let mut count = 0u64;

    for (_, node) in live_nodes(graph) {
        if node.inbound().len() + node.outbound().len() >= 2 {
            sum += local_link_index(node);
            count += 1;
        }
    }

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    Inductor,
    Collector,
    Mediator,
}

fn classify_one(node: &Node) -> NodeClass {
    let ci = node.inbound_count() as f64;
    let co = node.outbound_count() as f64;
    if ci * 1.5 <= co {
        NodeClass::Inductor
    } else if co * 1.5 <= ci {
        NodeClass::Collector
    } else {
        NodeClass::Mediator
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeClassCounts {
    pub inductors: u64,
    pub collectors: u64,
    pub mediators: u64,
}

/// Classify every non-deleted node by weighted in/out degree ratio.
pub fn classify_nodes(graph: &Graph) -> NodeClassCounts {
    let mut counts = NodeClassCounts::default();
    for (_, node) in live_nodes(graph) {
        match classify_one(node) {
            NodeClass::Inductor => counts.inductors += 1,
            NodeClass::Collector => counts.collectors += 1,
            NodeClass::Mediator => counts.mediators += 1,
        }
    }
    counts
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisResult {
    pub edges_index: f64,
    pub links_index: f64,
    pub clustering_coeff: f64,
    pub classes: NodeClassCounts,
}

pub fn analyze(graph: &Graph) -> AnalysisResult {
    AnalysisResult {
        edges_index: edges_index(graph),
        links_index: links_index(graph),
        clustering_coeff: clustering_coefficient(graph),
        classes: classify_nodes(graph),
    }
}

/// Tag or untag every node independently with probability `chance`: nodes
/// drawn as deleted that aren't already tagged get tagged; nodes not drawn
/// as deleted that are tagged get untagged. `chance` outside `[0, 1]` is
/// rejected.
pub fn simulate_nodes_deletion(graph: &mut Graph, chance: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&chance) {
        return Err(Error::InvalidArgument(format!(
            "deletion chance must be within [0, 1], got {chance}"
        )));
    }

    let mut rng = rand::thread_rng();
    let ids: Vec<NodeId> = graph.nodes().map(|(id, _)| id).collect();

    for id in ids {
        let should_delete = chance == 1.0 || (chance > 0.0 && rng.gen_bool(chance));
        let already_deleted = graph.has_tag(id, MARKED_AS_DELETED);

        if should_delete && !already_deleted {
            graph.add_tag(id, MARKED_AS_DELETED);
        } else if !should_delete && already_deleted {
            graph.remove_tag(id, MARKED_AS_DELETED);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    /// Builds the S4 scenario: nodes {a, b, c, d}, edges a->b, a->c, b->c, c->d.
    fn s4_graph() -> Graph {
        let mut g = Graph::create("a");
        let a = g.root().unwrap();
        let b = g.add_node("b");
        let c = g.add_node("c");
        let d = g.add_node("d");
        g.add_link(b, a);
        g.add_link(c, a);
        g.add_link(c, b);
        g.add_link(d, c);
        g
    }

    #[test]
    fn s4_metrics() {
        let g = s4_graph();
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.total_links(), 4);
        assert!((links_index(&g) - 4.0 / 12.0).abs() < 1e-9);
        assert!((edges_index(&g) - 1.0).abs() < 1e-9);

        let counts = classify_nodes(&g);
        assert_eq!(counts.inductors, 1);
        assert_eq!(counts.collectors, 2);
        assert_eq!(counts.mediators, 1);
    }

    #[test]
    fn links_index_degenerate_cases() {
        assert_eq!(links_index(&Graph::empty()), 0.0);
        assert_eq!(links_index(&Graph::create("a")), 0.0);
    }

    #[test]
    fn clustering_coefficient_degenerate_case() {
        let g = Graph::create("a");
        assert_eq!(clustering_coefficient(&g), 0.0);
    }

    #[test]
    fn deleted_nodes_are_excluded_from_metrics() {
        let mut g = s4_graph();
        let d = g
            .nodes()
            .find(|(_, n)| n.original_url() == "d")
            .map(|(id, _)| id)
            .unwrap();
        g.add_tag(d, MARKED_AS_DELETED);

        let counts = classify_nodes(&g);
        assert_eq!(counts.inductors + counts.collectors + counts.mediators, 3);
    }

    #[test]
    fn simulate_deletion_rejects_out_of_range_chance() {
        let mut g = s4_graph();
        assert!(simulate_nodes_deletion(&mut g, 1.5).is_err());
        assert!(simulate_nodes_deletion(&mut g, -0.1).is_err());
    }

    #[test]
    fn simulate_deletion_chance_zero_is_noop() {
        let mut g = s4_graph();
        simulate_nodes_deletion(&mut g, 0.0).unwrap();
        assert!(g.nodes().all(|(id, _)| !g.has_tag(id, MARKED_AS_DELETED)));
    }

    #[test]
    fn simulate_deletion_chance_one_tags_everything() {
        let mut g = s4_graph();
        simulate_nodes_deletion(&mut g, 1.0).unwrap();
        assert!(g.nodes().all(|(id, _)| g.has_tag(id, MARKED_AS_DELETED)));
    }
}
