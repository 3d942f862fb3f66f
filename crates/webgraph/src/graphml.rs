//! GraphML persistence. The writer targets third-party GraphML tool
//! compatibility; the reader only needs to round-trip files in the exact
//! shape this writer produces, so it's a line-oriented scan rather than a
//! full GraphML parser.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::node::MARKED_AS_DELETED;

const HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n";
const GRAPH_OPEN: &str = "    <graph id=\"WebSiteGraph\" edgedefault=\"directed\">\n";
const GRAPH_CLOSE: &str = "    </graph>\n</graphml>";

fn io_err(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `graph` to `path` as GraphML. Tagged (`MARKED_AS_DELETED`) nodes,
/// and any edge touching one, are omitted.
pub fn serialize(graph: &Graph, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut out = fs::File::create(path).map_err(|e| io_err(path, e))?;

    out.write_all(HEADER.as_bytes())
        .and_then(|_| out.write_all(GRAPH_OPEN.as_bytes()))
        .map_err(|e| io_err(path, e))?;

    for (_, node) in graph.nodes().filter(|(_, n)| !n.is_deleted()) {
        writeln!(out, "        <node id=\"{}\"/>", node.original_url()).map_err(|e| io_err(path, e))?;
    }

    for (_, node) in graph.nodes().filter(|(_, n)| !n.is_deleted()) {
        for (&to_id, &count) in node.outbound() {
            let Some(to_node) = graph.node(to_id) else {
                continue;
            };
            if to_node.is_deleted() {
                continue;
            }
            for _ in 0..count {
                writeln!(
                    out,
                    "        <edge source=\"{}\" target=\"{}\"/>",
                    node.original_url(),
                    to_node.original_url()
                )
                .map_err(|e| io_err(path, e))?;
            }
        }
    }

    out.write_all(GRAPH_CLOSE.as_bytes())
        .map_err(|e| io_err(path, e))?;
    Ok(())
}

/// Load a graph previously written by [`serialize`]. Scans line by line:
/// the first `<node .../>` line seeds the graph (becomes root); later node
/// lines add further nodes. Once any `<edge .../>` line has matched, node
/// matching stops entirely (edge mode is sticky) — an edge line can never
/// be mistaken for a node line, but a node-shaped line appearing after the
/// first edge is silently ignored, matching the reference scanner.
pub fn deserialize(path: impl AsRef<Path>) -> Result<Graph> {
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(|e| io_err(path, e))?;
    let reader = BufReader::new(file);

    let node_re = Regex::new(r#"<node id="(\S+)"/>"#).expect("static regex");
    let edge_re = Regex::new(r#"<edge source="(\S+)" target="(\S+)"/>"#).expect("static regex");

    let mut graph: Option<Graph> = None;
    let mut edges_started = false;

    for line in reader.lines() {
        let line = line.map_err(|e| io_err(path, e))?;

        if !edges_started {
            if let Some(m) = node_re.captures(&line) {
                let url = &m[1];
                match graph.as_mut() {
                    Some(g) => {
                        g.add_node(url);
                    }
                    None => graph = Some(Graph::create(url)),
                }
                continue;
            }
        }

        if let Some(m) = edge_re.captures(&line) {
            edges_started = true;
            let source = &m[1];
            let target = &m[2];

            let g = graph.as_mut().ok_or_else(|| {
                Error::GraphCorrupted(
                    "edges present but no node seeded the graph yet".to_string(),
                )
            })?;

            let from = g.get_node(source).ok_or_else(|| {
                Error::GraphCorrupted(format!("edge source node not found: {source}"))
            })?;
            let to = g.get_node(target).ok_or_else(|| {
                Error::GraphCorrupted(format!("edge target node not found: {target}"))
            })?;

            g.add_link(to, from);
        }
    }

    graph.ok_or_else(|| Error::GraphCorrupted("no nodes found in graphml file".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s4_graph() -> Graph {
        let mut g = Graph::create("http://a.example.com");
        let a = g.root().unwrap();
        let b = g.add_node("http://b.example.com");
        let c = g.add_node("http://c.example.com");
        let d = g.add_node("http://d.example.com");
        g.add_link(b, a);
        g.add_link(c, a);
        g.add_link(c, b);
        g.add_link(d, c);
        g
    }

    #[test]
    fn round_trip_preserves_nodes_and_edge_counts() {
        let dir = tempdir();
        let path = dir.join("graph.graphml");

        let original = s4_graph();
        serialize(&original, &path).unwrap();
        let loaded = deserialize(&path).unwrap();

        let mut original_urls: Vec<_> = original.nodes().map(|(_, n)| n.original_url().to_string()).collect();
        let mut loaded_urls: Vec<_> = loaded.nodes().map(|(_, n)| n.original_url().to_string()).collect();
        original_urls.sort();
        loaded_urls.sort();
        assert_eq!(original_urls, loaded_urls);

        assert_eq!(original.total_links(), loaded.total_links());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn tagged_nodes_and_their_edges_are_omitted() {
        let dir = tempdir();
        let path = dir.join("graph.graphml");

        let mut g = s4_graph();
        let b = g
            .nodes()
            .find(|(_, n)| n.original_url() == "http://b.example.com")
            .map(|(id, _)| id)
            .unwrap();
        g.add_tag(b, MARKED_AS_DELETED);

        serialize(&g, &path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("b.example.com"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn deserialize_rejects_edge_with_unknown_node() {
        let dir = tempdir();
        let path = dir.join("bad.graphml");
        std::fs::write(
            &path,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n    <graph id=\"WebSiteGraph\" edgedefault=\"directed\">\n        <node id=\"http://a.example.com\"/>\n        <edge source=\"http://a.example.com\" target=\"http://missing.example.com\"/>\n    </graph>\n</graphml>",
        )
        .unwrap();

        assert!(deserialize(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn deserialize_rejects_edges_with_no_nodes() {
        let dir = tempdir();
        let path = dir.join("bad2.graphml");
        std::fs::write(
            &path,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n    <graph id=\"WebSiteGraph\" edgedefault=\"directed\">\n        <edge source=\"http://a.example.com\" target=\"http://b.example.com\"/>\n    </graph>\n</graphml>",
        )
        .unwrap();

        assert!(deserialize(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> std::path::PathBuf {
        let name = std::thread::current()
            .name()
            .unwrap_or("t")
            .replace(':', "_");
        let dir = std::env::temp_dir().join(format!(
            "webgraph-graphml-test-{}-{name}",
            std::process::id(),
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
