//! A single node of a per-method routing trie.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use super::metadata::RouteMetadata;
use crate::context::Params;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Static,
    Param,
}

/// One request path segment, kept in its original spelling for parameter binding and
/// case-folded for static matching.
#[derive(Debug)]
pub(crate) struct Segment<'p> {
    pub(crate) raw: &'p str,
    pub(crate) folded: Cow<'p, str>,
}

impl<'p> Segment<'p> {
    pub(crate) fn new(raw: &'p str) -> Self {
        Self {
            raw,
            folded: fold(raw),
        }
    }
}

/// Case-folds a static segment. Registration and lookup must both go through here so
/// that a registered spelling always finds its own node.
pub(crate) fn fold(raw: &str) -> Cow<'_, str> {
    // Titlecase letters such as `ǅ` are not uppercase yet still change when lowered.
    if raw.chars().any(|c| c.to_lowercase().ne(std::iter::once(c))) {
        Cow::Owned(raw.to_lowercase())
    } else {
        Cow::Borrowed(raw)
    }
}

/// A trie node.
///
/// Static children are keyed by their lower-cased segment. There is at most one
/// parametric child per node; its parameter name is fixed by the first route that
/// created it.
#[derive(Debug)]
pub struct TrieNode {
    segment: String,
    kind: NodeKind,
    param_name: Option<String>,
    children: HashMap<String, TrieNode>,
    param_child: Option<Box<TrieNode>>,
    metadata: Option<Arc<RouteMetadata>>,
}

impl TrieNode {
    pub(crate) fn root() -> Self {
        Self::new_static(String::new())
    }

    fn new_static(segment: String) -> Self {
        Self {
            segment,
            kind: NodeKind::Static,
            param_name: None,
            children: HashMap::new(),
            param_child: None,
            metadata: None,
        }
    }

    fn new_param(name: &str) -> Self {
        Self {
            segment: format!(":{name}"),
            kind: NodeKind::Param,
            param_name: Some(name.to_owned()),
            children: HashMap::new(),
            param_child: None,
            metadata: None,
        }
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn param_name(&self) -> Option<&str> {
        self.param_name.as_deref()
    }

    pub fn metadata(&self) -> Option<&Arc<RouteMetadata>> {
        self.metadata.as_ref()
    }

    pub fn static_children(&self) -> impl Iterator<Item = &TrieNode> {
        self.children.values()
    }

    pub fn param_child(&self) -> Option<&TrieNode> {
        self.param_child.as_deref()
    }

    /// Walks or creates the path for `segments`, then replaces the metadata of the
    /// final node.
    pub(crate) fn insert(&mut self, segments: &[String], metadata: Arc<RouteMetadata>) {
        let Some((segment, rest)) = segments.split_first() else {
            self.metadata = Some(metadata);
            return;
        };

        let child = match segment.strip_prefix(':') {
            Some(name) => &mut **self
                .param_child
                .get_or_insert_with(|| Box::new(Self::new_param(name))),
            None => {
                let key = fold(segment).into_owned();
                self.children
                    .entry(key.clone())
                    .or_insert_with(|| Self::new_static(key))
            }
        };
        child.insert(rest, metadata);
    }

    /// Depth-first match with backtracking. The static child is tried first; when its
    /// subtree cannot complete the match, the parametric child gets the same segment.
    pub(crate) fn search(
        &self,
        segments: &[Segment<'_>],
        params: &mut Params,
    ) -> Option<Arc<RouteMetadata>> {
        let Some((segment, rest)) = segments.split_first() else {
            return self.metadata.clone();
        };

        if let Some(found) = self
            .children
            .get(segment.folded.as_ref())
            .and_then(|child| child.search(rest, params))
        {
            return Some(found);
        }

        let child = self.param_child.as_deref()?;
        let name = child.param_name.as_deref()?;
        let previous = params.remove(name);
        params.insert(name, segment.raw);
        if let Some(found) = child.search(rest, params) {
            return Some(found);
        }
        // Unwind the binding so a sibling branch further up starts clean.
        params.remove(name);
        if let Some(previous) = previous {
            params.insert(name, previous);
        }
        None
    }
}
