//! The directed multigraph of hyperlinks between pages of a crawled site,
//! plus the structural metrics, attack simulation, and GraphML persistence
//! computed over it.

pub mod analysis;
mod error;
mod graph;
mod graphml;
mod node;
mod url;

pub use analysis::{
    analyze, classify_nodes, simulate_nodes_deletion, AnalysisResult, NodeClass, NodeClassCounts,
};
pub use error::{Error, Result};
pub use graph::Graph;
pub use graphml::{deserialize, serialize};
pub use node::{Node, NodeId, TagId, MARKED_AS_DELETED};
pub use url::{canon, percent_decode, CanonicalUrl};
