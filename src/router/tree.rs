//! The routing trie for one HTTP method.

use std::sync::Arc;

use super::metadata::RouteMetadata;
use super::node::{Segment, TrieNode};
use super::{Handler, Route};
use crate::context::Params;
use crate::http::Method;

/// A registered route as seen by introspection.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Normalized path: static segments lower-cased, parameters as `:name`.
    pub path: String,
    pub metadata: Arc<RouteMetadata>,
}

impl RouteEntry {
    pub fn method(&self) -> &Method {
        self.metadata.method()
    }

    pub fn handler(&self) -> &Handler {
        self.metadata.handler()
    }

    pub fn handler_name(&self) -> Option<&str> {
        self.metadata.handler_name()
    }
}

/// Owns the trie root for one method.
///
/// Paths are split on `/` with empty segments discarded, so `/users/`, `//users` and
/// `/users` all address the same node. Static segments match case-insensitively.
#[derive(Debug)]
pub struct RouteTree {
    root: TrieNode,
}

impl Default for RouteTree {
    fn default() -> Self {
        Self::new()
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl RouteTree {
    pub fn new() -> Self {
        Self {
            root: TrieNode::root(),
        }
    }

    /// Compiles `route` and attaches it at its path, replacing whatever was there.
    pub fn insert(&mut self, route: Route) {
        // Owned, since compiling consumes the record that holds the path.
        let segments: Vec<String> = split(route.url()).map(str::to_owned).collect();
        let metadata = Arc::new(RouteMetadata::compile(route));
        self.root.insert(&segments, metadata);
    }

    /// Finds the route for `path` (no query string) and the parameters it binds.
    pub fn search(&self, path: &str) -> Option<(Arc<RouteMetadata>, Params)> {
        let segments: Vec<Segment<'_>> = split(path).map(Segment::new).collect();
        let mut params = Params::new();
        let metadata = self.root.search(&segments, &mut params)?;
        Some((metadata, params))
    }

    /// Every route in the tree, depth first, static children before the parametric
    /// child.
    pub fn routes(&self) -> Vec<RouteEntry> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        collect(&self.root, &mut prefix, &mut out);
        out
    }

    pub fn root(&self) -> &TrieNode {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.routes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collect<'n>(node: &'n TrieNode, prefix: &mut Vec<&'n str>, out: &mut Vec<RouteEntry>) {
    if let Some(metadata) = node.metadata() {
        out.push(RouteEntry {
            path: format!("/{}", prefix.join("/")),
            metadata: Arc::clone(metadata),
        });
    }

    let mut statics: Vec<&TrieNode> = node.static_children().collect();
    statics.sort_by(|a, b| a.segment().cmp(b.segment()));
    for child in statics.into_iter().chain(node.param_child()) {
        prefix.push(child.segment());
        collect(child, prefix, out);
        prefix.pop();
    }
}
