//! Route trie nodes.

use crate::middleware::{HandleFunc, Middleware};
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeType {
    Static,
    Regex,
    Param,
    Wildcard,
}

/// One segment of the trie. A node holds at most one non-static child of
/// each kind, and mixing wildcard, parametric and regex children on the
/// same node is a registration error.
pub(crate) struct RouteNode {
    pub(crate) segment: String,
    /// Registered path down to this node.
    pub(crate) full_path: String,
    pub(crate) node_type: NodeType,
    pub(crate) children: HashMap<String, RouteNode>,
    pub(crate) param_child: Option<Box<RouteNode>>,
    pub(crate) regex_child: Option<Box<RouteNode>>,
    pub(crate) wildcard_child: Option<Box<RouteNode>>,
    /// Capture name for parametric and regex nodes.
    pub(crate) param_name: Option<String>,
    pub(crate) pattern: Option<Regex>,
    pub(crate) handler: Option<HandleFunc>,
    pub(crate) middlewares: Vec<Middleware>,
}

impl RouteNode {
    pub(crate) fn new(segment: &str, full_path: &str, node_type: NodeType) -> Self {
        Self {
            segment: segment.to_string(),
            full_path: full_path.to_string(),
            node_type,
            children: HashMap::new(),
            param_child: None,
            regex_child: None,
            wildcard_child: None,
            param_name: None,
            pattern: None,
            handler: None,
            middlewares: Vec::new(),
        }
    }

    pub(crate) fn root() -> Self {
        Self::new("/", "/", NodeType::Static)
    }

    /// Finds or creates the child for a registration segment, enforcing
    /// the conflict rules. Panics on conflicts: route shape is fixed at
    /// startup and a bad table is not worth limping along with.
    pub(crate) fn child_or_create(&mut self, seg: &str, full_path: &str) -> &mut RouteNode {
        if let Some(rest) = seg.strip_prefix(':') {
            let (param_name, expr) = parse_param(rest);
            return match expr {
                Some(expr) => self.regex_child_or_create(seg, full_path, &expr, &param_name),
                None => self.param_child_or_create(seg, full_path, &param_name),
            };
        }

        if seg == "*" {
            if self.param_child.is_some() {
                panic!("route {full_path}: wildcard conflicts with existing parametric child");
            }
            if self.regex_child.is_some() {
                panic!("route {full_path}: wildcard conflicts with existing regex child");
            }
            return self.wildcard_child.get_or_insert_with(|| {
                Box::new(RouteNode::new(seg, full_path, NodeType::Wildcard))
            });
        }

        self.children
            .entry(seg.to_string())
            .or_insert_with(|| RouteNode::new(seg, full_path, NodeType::Static))
    }

    fn regex_child_or_create(
        &mut self,
        seg: &str,
        full_path: &str,
        expr: &str,
        param_name: &str,
    ) -> &mut RouteNode {
        if self.wildcard_child.is_some() {
            panic!("route {full_path}: regex conflicts with existing wildcard child");
        }
        if self.param_child.is_some() {
            panic!("route {full_path}: regex conflicts with existing parametric child");
        }
        if let Some(existing) = &self.regex_child {
            let same_pattern = existing
                .pattern
                .as_ref()
                .map(|p| p.as_str() == expr)
                .unwrap_or(false);
            let same_name = existing.param_name.as_deref() == Some(param_name);
            if !same_pattern || !same_name {
                panic!("route {full_path}: conflicting regex registrations on one node");
            }
            return self.regex_child.as_mut().unwrap();
        }
        let pattern = Regex::new(expr)
            .unwrap_or_else(|err| panic!("route {full_path}: invalid regex {expr:?}: {err}"));
        let mut node = RouteNode::new(seg, full_path, NodeType::Regex);
        node.param_name = Some(param_name.to_string());
        node.pattern = Some(pattern);
        self.regex_child.get_or_insert(Box::new(node))
    }

    fn param_child_or_create(
        &mut self,
        seg: &str,
        full_path: &str,
        param_name: &str,
    ) -> &mut RouteNode {
        if self.wildcard_child.is_some() {
            panic!("route {full_path}: parametric conflicts with existing wildcard child");
        }
        if self.regex_child.is_some() {
            panic!("route {full_path}: parametric conflicts with existing regex child");
        }
        if let Some(existing) = &self.param_child {
            if existing.segment != seg {
                panic!(
                    "route {full_path}: parametric conflict: {} vs {seg}",
                    existing.segment
                );
            }
            return self.param_child.as_mut().unwrap();
        }
        let mut node = RouteNode::new(seg, full_path, NodeType::Param);
        node.param_name = Some(param_name.to_string());
        self.param_child.get_or_insert(Box::new(node))
    }

    /// The one child a request segment matches, in priority order:
    /// static > regex > parametric > wildcard.
    pub(crate) fn child_of(&self, seg: &str) -> Option<&RouteNode> {
        if let Some(child) = self.children.get(seg) {
            return Some(child);
        }
        if let Some(regex_child) = &self.regex_child {
            if regex_child
                .pattern
                .as_ref()
                .map(|p| p.is_match(seg))
                .unwrap_or(false)
            {
                return Some(regex_child);
            }
        }
        if let Some(param_child) = &self.param_child {
            return Some(param_child);
        }
        self.wildcard_child.as_deref()
    }

    /// Every child a request segment could reach, for middleware
    /// aggregation across sibling branches.
    pub(crate) fn children_of(&self, seg: &str) -> Vec<&RouteNode> {
        let mut nodes = Vec::new();
        if let Some(child) = self.children.get(seg) {
            nodes.push(child);
        }
        if let Some(regex_child) = &self.regex_child {
            if regex_child
                .pattern
                .as_ref()
                .map(|p| p.is_match(seg))
                .unwrap_or(false)
            {
                nodes.push(regex_child.as_ref());
            }
        }
        if let Some(param_child) = &self.param_child {
            nodes.push(param_child.as_ref());
        }
        if let Some(wildcard_child) = &self.wildcard_child {
            nodes.push(wildcard_child.as_ref());
        }
        nodes
    }
}

/// Splits a `:name(regex)` registration segment (already stripped of the
/// leading `:`) into the capture name and the optional pattern.
fn parse_param(seg: &str) -> (String, Option<String>) {
    if let Some((name, rest)) = seg.split_once('(') {
        if let Some(expr) = rest.strip_suffix(')') {
            return (name.to_string(), Some(expr.to_string()));
        }
    }
    (seg.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_param_handles_plain_and_regex() {
        assert_eq!(parse_param("id"), ("id".to_string(), None));
        assert_eq!(
            parse_param("id([0-9]+)"),
            ("id".to_string(), Some("[0-9]+".to_string()))
        );
        // Unclosed parenthesis falls back to a plain parameter.
        assert_eq!(parse_param("id(([0-9]"), ("id(([0-9]".to_string(), None));
    }

    #[test]
    fn static_beats_regex_beats_param_beats_wildcard() {
        let mut root = RouteNode::root();
        root.child_or_create("fixed", "/fixed");
        let mut dynamic = RouteNode::root();
        dynamic.child_or_create(":id([0-9]+)", "/:id([0-9]+)");

        assert_eq!(root.child_of("fixed").unwrap().node_type, NodeType::Static);
        assert_eq!(dynamic.child_of("42").unwrap().node_type, NodeType::Regex);
        // Segment the regex rejects has nothing to fall back to here.
        assert!(dynamic.child_of("abc").is_none());
    }

    #[test]
    #[should_panic(expected = "wildcard conflicts with existing parametric")]
    fn wildcard_and_param_cannot_share_a_node() {
        let mut root = RouteNode::root();
        root.child_or_create(":id", "/:id");
        root.child_or_create("*", "/*");
    }

    #[test]
    #[should_panic(expected = "conflicting regex registrations")]
    fn differing_regexes_on_one_node_conflict() {
        let mut root = RouteNode::root();
        root.child_or_create(":id([0-9]+)", "/:id([0-9]+)");
        root.child_or_create(":id([a-z]+)", "/:id([a-z]+)");
    }

    #[test]
    fn static_child_coexists_with_one_dynamic_child() {
        let mut root = RouteNode::root();
        root.child_or_create("users", "/users");
        root.child_or_create(":id", "/:id");
        assert_eq!(root.child_of("users").unwrap().node_type, NodeType::Static);
        assert_eq!(root.child_of("99").unwrap().node_type, NodeType::Param);
    }
}
