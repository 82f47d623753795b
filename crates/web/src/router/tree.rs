//! The route trie.
//!
//! Patterns are slash-delimited sequences of literal segments, `{name}`
//! parameters (one non-empty segment) and a `#name` tail wildcard (the
//! rest of the path, slashes included). Each trie node keeps its literal
//! children apart from its single parameter child and optional wildcard
//! terminal, which gives the matcher its precedence order for free:
//! literal first, then parameter, then wildcard, with backtracking when a
//! literal descent dead-ends.
//!
//! Terminals store one entry per HTTP method; inserting the same
//! `(method, pattern)` twice is a build-time error.

use http::Method;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Route-table construction errors.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("duplicate route: {method} {pattern}")]
    DuplicateRoute { method: Method, pattern: String },

    #[error("conflicting parameter name in {pattern:?}: segment {{{name}}} already registered as {{{existing}}}")]
    ConflictingParameter { pattern: String, name: String, existing: String },
}

impl RouterError {
    fn invalid(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern { pattern: pattern.to_owned(), reason: reason.into() }
    }
}

/// Why a lookup produced no handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MatchError {
    NotFound,
    MethodNotAllowed { allowed: Vec<Method> },
}

/// A segment of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, RouterError> {
    let Some(rest) = pattern.strip_prefix('/') else {
        return Err(RouterError::invalid(pattern, "must start with '/'"));
    };

    if rest.is_empty() {
        return Ok(Vec::new());
    }

    let raw_segments: Vec<&str> = rest.split('/').collect();
    let mut segments = Vec::with_capacity(raw_segments.len());

    for (index, raw) in raw_segments.iter().enumerate() {
        let is_last = index == raw_segments.len() - 1;

        let segment = if let Some(name) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            check_ident(pattern, name)?;
            Segment::Param(name.to_owned())
        } else if let Some(name) = raw.strip_prefix('#') {
            check_ident(pattern, name)?;
            if !is_last {
                return Err(RouterError::invalid(pattern, "'#' wildcard is only allowed as the last segment"));
            }
            Segment::Wildcard(name.to_owned())
        } else {
            if raw.is_empty() {
                return Err(RouterError::invalid(pattern, "empty segment"));
            }
            if raw.contains(['{', '}', '#']) {
                return Err(RouterError::invalid(pattern, "'{', '}' and '#' are reserved in literal segments"));
            }
            Segment::Literal((*raw).to_owned())
        };

        segments.push(segment);
    }

    Ok(segments)
}

fn check_ident(pattern: &str, name: &str) -> Result<(), RouterError> {
    if name.is_empty() {
        return Err(RouterError::invalid(pattern, "capture name must not be empty"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(RouterError::invalid(pattern, format!("invalid capture name {name:?}")));
    }
    Ok(())
}

/// Parameters captured during a successful match, in pattern order.
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: Vec<(Arc<str>, String)>,
}

impl Params {
    pub(crate) fn from_entries(entries: Vec<(Arc<str>, String)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(key, _)| &**key == name).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(key, value)| (&**key, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The pattern that matched, the concrete path and the captures.
#[derive(Debug, Clone)]
pub struct PathInfo {
    pattern: Arc<str>,
    path: String,
    params: Params,
}

impl PathInfo {
    pub(crate) fn new(pattern: Arc<str>, path: String, params: Params) -> Self {
        Self { pattern, path, params }
    }

    /// An empty match, used when no route was involved (default handler).
    pub(crate) fn none(path: String) -> Self {
        Self { pattern: Arc::from(""), path, params: Params::default() }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

/// A successful lookup.
pub(crate) struct Matched<'t, T> {
    pub(crate) value: &'t T,
    pub(crate) pattern: Arc<str>,
    pub(crate) params: Params,
}

struct Leaf<T> {
    method: Method,
    pattern: Arc<str>,
    value: T,
}

struct ParamEdge<T> {
    name: Arc<str>,
    node: Node<T>,
}

struct WildcardLeaves<T> {
    name: Arc<str>,
    leaves: Vec<Leaf<T>>,
}

struct Node<T> {
    literals: BTreeMap<String, Node<T>>,
    param: Option<Box<ParamEdge<T>>>,
    wildcard: Option<WildcardLeaves<T>>,
    leaves: Vec<Leaf<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self { literals: BTreeMap::new(), param: None, wildcard: None, leaves: Vec::new() }
    }
}

/// The route table: a trie over pattern segments with per-method leaves.
pub(crate) struct PathTrie<T> {
    root: Node<T>,
}

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        Self { root: Node::default() }
    }
}

impl<T> PathTrie<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `(method, pattern)`; rejects malformed patterns,
    /// conflicting parameter names and exact duplicates.
    pub(crate) fn insert(&mut self, method: Method, pattern: &str, value: T) -> Result<(), RouterError> {
        let segments = parse_pattern(pattern)?;
        let pattern_arc: Arc<str> = Arc::from(pattern);

        let mut node = &mut self.root;
        for segment in segments {
            match segment {
                Segment::Literal(literal) => {
                    node = node.literals.entry(literal).or_default();
                }
                Segment::Param(name) => {
                    let edge = node
                        .param
                        .get_or_insert_with(|| Box::new(ParamEdge { name: Arc::from(name.as_str()), node: Node::default() }));
                    if &*edge.name != name {
                        return Err(RouterError::ConflictingParameter {
                            pattern: pattern.to_owned(),
                            name,
                            existing: edge.name.to_string(),
                        });
                    }
                    node = &mut edge.node;
                }
                Segment::Wildcard(name) => {
                    let wildcard = node
                        .wildcard
                        .get_or_insert_with(|| WildcardLeaves { name: Arc::from(name.as_str()), leaves: Vec::new() });
                    if &*wildcard.name != name {
                        return Err(RouterError::ConflictingParameter {
                            pattern: pattern.to_owned(),
                            name,
                            existing: wildcard.name.to_string(),
                        });
                    }
                    return insert_leaf(&mut wildcard.leaves, method, pattern_arc, value);
                }
            }
        }

        insert_leaf(&mut node.leaves, method, pattern_arc, value)
    }

    /// Finds the route for `(method, path)`.
    ///
    /// Precedence per node: literal child, then parameter child, then
    /// wildcard. A literal descent that dead-ends backtracks to the
    /// parameter alternative. Methods registered on otherwise-matching
    /// terminals are collected so a miss can be reported as 405 rather
    /// than 404.
    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Result<Matched<'_, T>, MatchError> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let segments: Vec<&str> = if trimmed.is_empty() { Vec::new() } else { trimmed.split('/').collect() };

        let mut captures: Vec<(Arc<str>, String)> = Vec::new();
        let mut allowed: Vec<Method> = Vec::new();

        match walk(&self.root, &segments, method, &mut captures, &mut allowed) {
            Some(leaf) => {
                Ok(Matched { value: &leaf.value, pattern: Arc::clone(&leaf.pattern), params: Params { entries: captures } })
            }
            None if allowed.is_empty() => Err(MatchError::NotFound),
            None => {
                allowed.sort_by_key(|method| method.to_string());
                allowed.dedup();
                Err(MatchError::MethodNotAllowed { allowed })
            }
        }
    }
}

fn insert_leaf<T>(leaves: &mut Vec<Leaf<T>>, method: Method, pattern: Arc<str>, value: T) -> Result<(), RouterError> {
    if leaves.iter().any(|leaf| leaf.method == method) {
        return Err(RouterError::DuplicateRoute { method, pattern: pattern.to_string() });
    }
    leaves.push(Leaf { method, pattern, value });
    Ok(())
}

fn walk<'t, T>(
    node: &'t Node<T>,
    segments: &[&str],
    method: &Method,
    captures: &mut Vec<(Arc<str>, String)>,
    allowed: &mut Vec<Method>,
) -> Option<&'t Leaf<T>> {
    if segments.is_empty() {
        if let Some(leaf) = node.leaves.iter().find(|leaf| &leaf.method == method) {
            return Some(leaf);
        }
        allowed.extend(node.leaves.iter().map(|leaf| leaf.method.clone()));

        // A tail wildcard also matches an empty remainder.
        if let Some(wildcard) = &node.wildcard {
            if let Some(leaf) = wildcard.leaves.iter().find(|leaf| &leaf.method == method) {
                captures.push((Arc::clone(&wildcard.name), String::new()));
                return Some(leaf);
            }
            allowed.extend(wildcard.leaves.iter().map(|leaf| leaf.method.clone()));
        }

        return None;
    }

    let (segment, rest) = (segments[0], &segments[1..]);

    if let Some(child) = node.literals.get(segment) {
        if let Some(leaf) = walk(child, rest, method, captures, allowed) {
            return Some(leaf);
        }
    }

    if !segment.is_empty() {
        if let Some(edge) = &node.param {
            captures.push((Arc::clone(&edge.name), segment.to_owned()));
            if let Some(leaf) = walk(&edge.node, rest, method, captures, allowed) {
                return Some(leaf);
            }
            captures.pop();
        }
    }

    if let Some(wildcard) = &node.wildcard {
        if let Some(leaf) = wildcard.leaves.iter().find(|leaf| &leaf.method == method) {
            captures.push((Arc::clone(&wildcard.name), segments.join("/")));
            return Some(leaf);
        }
        allowed.extend(wildcard.leaves.iter().map(|leaf| leaf.method.clone()));
    }

    None
}
