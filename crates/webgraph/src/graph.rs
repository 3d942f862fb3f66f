use hashbrown::HashMap;

use crate::node::{Node, NodeId, TagId};
use crate::url::{canon, CanonicalUrl};

/// The directed multigraph of crawled pages.
///
/// Nodes live in an arena (`Vec<Option<Node>>`) addressed by stable
/// [`NodeId`]s; a deleted node leaves a tombstone (`None`) rather than
/// shifting every later index. A side table maps [`CanonicalUrl`] to
/// `NodeId` for identity lookups. Only the operations below mutate the
/// arena, the index, or the root — callers cannot reach into either.
pub struct Graph {
    nodes: Vec<Option<Node>>,
    index: HashMap<CanonicalUrl, NodeId>,
    root: Option<NodeId>,
    total_links: u64,
}

impl Graph {
    /// An empty graph with no root. The first [`Graph::add_node`] call
    /// becomes the root, mirroring the reference's "root is set only if the
    /// graph was previously empty" rule.
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            root: None,
            total_links: 0,
        }
    }

    /// Construct a graph whose sole, initial node is `root_url`.
    pub fn create(root_url: &str) -> Self {
        let mut graph = Self::empty();
        graph.add_node(root_url);
        graph
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn root_url(&self) -> Option<&str> {
        self.root.and_then(|id| self.node(id)).map(Node::original_url)
    }

    /// Total node count, including tombstoned (deleted) ids... no: including
    /// tagged-deleted nodes, which remain in the arena. Tombstones left by
    /// [`Graph::delete_node`] are not counted.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn total_links(&self) -> u64 {
        self.total_links
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(|n| n.as_mut())
    }

    /// Iterate over all live (non-tombstoned) nodes in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i), n)))
    }

    /// Resolve `url` to a node id without inserting. Mirrors the reference's
    /// asymmetric `GetNode`: the root also matches its *original* URL string
    /// verbatim (not just its canonical key), which lets callers recover the
    /// root before they know its canonical form.
    pub fn get_node(&self, url: &str) -> Option<NodeId> {
        if let Some(root) = self.root {
            if self.node(root).map(Node::original_url) == Some(url) {
                return Some(root);
            }
        }
        self.index.get(&CanonicalUrl::new(url)).copied()
    }

    /// Insert-or-get a node for `url`. Returns the existing node if one with
    /// the same canonical key is already present.
    pub fn add_node(&mut self, url: &str) -> NodeId {
        let key = CanonicalUrl::new(url);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(url.to_string())));
        self.index.insert(key, id);
        if self.root.is_none() {
            self.root = Some(id);
        }
        id
    }

    /// Resolve `to_url` to a node (inserting if absent), then add a link
    /// from `from`.
    pub fn add_link_to_url(&mut self, to_url: &str, from: NodeId) -> NodeId {
        let to = self.add_node(to_url);
        self.add_link(to, from);
        to
    }

    /// Add a parallel edge `from -> to`, incrementing both edge maps and the
    /// total link counter by one.
    pub fn add_link(&mut self, to: NodeId, from: NodeId) {
        if to == from {
            if let Some(node) = self.node_mut(to) {
                *node.outbound_mut().entry(to).or_insert(0) += 1;
                *node.inbound_mut().entry(from).or_insert(0) += 1;
            }
        } else {
            let (lo_idx, hi_idx) = if from.0 < to.0 { (from.0, to.0) } else { (to.0, from.0) };
            let (head, tail) = self.nodes.split_at_mut(hi_idx);
            let lo_node = head[lo_idx].as_mut();
            let hi_node = tail[0].as_mut();
            match (lo_node, hi_node) {
                (Some(lo_node), Some(hi_node)) => {
                    let (from_node, to_node) = if from.0 < to.0 {
                        (lo_node, hi_node)
                    } else {
                        (hi_node, lo_node)
                    };
                    *from_node.outbound_mut().entry(to).or_insert(0) += 1;
                    *to_node.inbound_mut().entry(from).or_insert(0) += 1;
                }
                _ => return,
            }
        }
        self.total_links += 1;
    }

    /// Remove `id` from the graph: drops it from the key index, scrubs every
    /// other live node's edge maps of references to it, and adjusts the
    /// total link counter so invariant 2 (`sum(outbound) == total_links`)
    /// keeps holding afterward. If `id` was the root, the root rebinds to an
    /// arbitrary outbound neighbor, or to `None` if it had none. Returns
    /// `false` if `id` did not name a live node.
    pub fn delete_node(&mut self, id: NodeId) -> bool {
        let Some(slot) = self.nodes.get_mut(id.0) else {
            return false;
        };
        let Some(node) = slot.take() else {
            return false;
        };

        self.index.remove(&CanonicalUrl::new(node.original_url()));
        self.total_links -= node.outbound_count();

        for other in self.nodes.iter_mut().flatten() {
            if let Some(count) = other.outbound_mut().remove(&id) {
                self.total_links -= count;
            }
            other.inbound_mut().remove(&id);
        }

        if self.root == Some(id) {
            self.root = node.outbound().keys().next().copied();
        }

        true
    }

    pub fn add_tag(&mut self, id: NodeId, tag: TagId) {
        if let Some(node) = self.node_mut(id) {
            node.add_tag(tag);
        }
    }

    pub fn remove_tag(&mut self, id: NodeId, tag: TagId) {
        if let Some(node) = self.node_mut(id) {
            node.remove_tag(tag);
        }
    }

    pub fn has_tag(&self, id: NodeId, tag: TagId) -> bool {
        self.node(id).is_some_and(|n| n.has_tag(tag))
    }

    /// Convenience accessor mirroring `canon`, exposed so callers (the
    /// crawl pipeline, the serializer) key on the same definition of
    /// identity this graph uses internally.
    pub fn canonical_key(url: &str) -> String {
        canon(url)
    }
}
