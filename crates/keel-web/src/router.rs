//! Route registration and lookup.

use crate::middleware::{HandleFunc, Middleware};
use crate::tree::{NodeType, RouteNode};
use http::Method;
use std::collections::HashMap;

/// One tree per HTTP method. Built at startup, read-only while serving.
#[derive(Default)]
pub struct Router {
    trees: HashMap<Method, RouteNode>,
}

/// Outcome of a successful walk: the terminal node's handler (which may
/// be absent), the captured parameters, the aggregated middlewares, and
/// the deepest registered path that was reached.
pub(crate) struct RouteMatch {
    pub(crate) handler: Option<HandleFunc>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) middlewares: Vec<Middleware>,
    pub(crate) matched_route: String,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` under `method`. The handler may be absent for a
    /// middleware-only registration. Panics on malformed paths and
    /// duplicate handler registrations: route tables are wired at
    /// startup, and a broken table must not boot.
    pub fn add_route(
        &mut self,
        method: Method,
        path: &str,
        handler: Option<HandleFunc>,
        middlewares: Vec<Middleware>,
    ) {
        if path.is_empty() {
            panic!("route path may not be empty");
        }
        if !path.starts_with('/') {
            panic!("route {path:?} must start with '/'");
        }
        if path != "/" && path.ends_with('/') {
            panic!("route {path:?} must not end with '/'");
        }

        let root = self
            .trees
            .entry(method)
            .or_insert_with(RouteNode::root);

        if path == "/" {
            if handler.is_some() && root.handler.is_some() {
                panic!("route / registered twice");
            }
            if let Some(handler) = handler {
                root.handler = Some(handler);
            }
            root.middlewares.extend(middlewares);
            return;
        }

        let mut node = root;
        let mut full_path = String::new();
        for seg in path[1..].split('/') {
            if seg.is_empty() {
                panic!("route {path:?} has an empty segment");
            }
            full_path.push('/');
            full_path.push_str(seg);
            node = node.child_or_create(seg, &full_path);
        }
        if handler.is_some() && node.handler.is_some() {
            panic!("route {path:?} registered twice");
        }
        if let Some(handler) = handler {
            node.handler = Some(handler);
        }
        node.middlewares.extend(middlewares);
    }

    /// Walks the request path through the method's tree. Returns `None`
    /// when no node can absorb the path at all.
    pub(crate) fn find_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let root = self.trees.get(method)?;
        let trimmed = path.trim_matches('/');

        if trimmed.is_empty() {
            return Some(RouteMatch {
                handler: root.handler.clone(),
                params: HashMap::new(),
                middlewares: root.middlewares.clone(),
                matched_route: root.full_path.clone(),
            });
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        let mut params = HashMap::new();
        let mut node = root;
        for seg in &segments {
            match node.child_of(seg) {
                Some(child) => {
                    match child.node_type {
                        NodeType::Param | NodeType::Regex => {
                            if let Some(name) = &child.param_name {
                                params.insert(name.clone(), (*seg).to_string());
                            }
                        }
                        NodeType::Static | NodeType::Wildcard => {}
                    }
                    node = child;
                }
                // A wildcard node absorbs the rest of the path.
                None if node.node_type == NodeType::Wildcard => continue,
                None => return None,
            }
        }

        Some(RouteMatch {
            handler: node.handler.clone(),
            params,
            middlewares: self.aggregate_middlewares(root, &segments),
            matched_route: node.full_path.clone(),
        })
    }

    /// Collects middlewares from every node the request's segments could
    /// reach, level by level from the root, so middleware registered on
    /// shallower (and sibling) prefixes wraps deeper registrations.
    fn aggregate_middlewares(&self, root: &RouteNode, segments: &[&str]) -> Vec<Middleware> {
        let mut collected: Vec<Middleware> = root.middlewares.clone();
        let mut layer: Vec<&RouteNode> = vec![root];
        for seg in segments {
            let mut next: Vec<&RouteNode> = Vec::new();
            for &node in &layer {
                // A wildcard keeps absorbing; its middlewares were
                // collected when it was first reached.
                if node.node_type == NodeType::Wildcard {
                    next.push(node);
                }
                for child in node.children_of(seg) {
                    collected.extend(child.middlewares.iter().cloned());
                    next.push(child);
                }
            }
            layer = next;
        }
        collected
    }
}
