//! Ordered route table with `:param` segments.
//!
//! Matching is exact on segment count; literal segments compare equal and
//! parameter segments capture any non-empty value. The first entry in
//! registration order wins. There is no prefix or wildcard matching.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::RouteError;

/// Captured parameters, keyed by name.
pub type RouteParams = BTreeMap<String, String>;

/// Callback invoked with the captured parameters after a screen mounts.
pub type RouteHandler = Arc<dyn Fn(&RouteParams) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed path pattern such as `/forums/:channelId/thread/:threadId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('/') {
            return Err(invalid(raw, "pattern must start with '/'"));
        }

        let mut segments = Vec::new();
        let mut seen = BTreeSet::new();
        for part in split_path(trimmed) {
            if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(invalid(raw, "parameter name is empty"));
                }
                if !seen.insert(name.to_string()) {
                    return Err(invalid(raw, &format!("parameter {name:?} repeats")));
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Match already-split path segments.
    pub fn match_segments(&self, parts: &[&str]) -> Option<RouteParams> {
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = RouteParams::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Some(params)
    }

    /// Whether every path `other` matches is also matched by `self`.
    pub fn subsumes(&self, other: &RoutePattern) -> bool {
        if self.segments.len() != other.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(&other.segments)
            .all(|(mine, theirs)| match (mine, theirs) {
                (Segment::Param(_), _) => true,
                (Segment::Literal(a), Segment::Literal(b)) => a == b,
                (Segment::Literal(_), Segment::Param(_)) => false,
            })
    }

    /// Build a concrete path by filling each parameter from `params`.
    pub fn format(&self, params: &RouteParams) -> Result<String, RouteError> {
        if self.segments.is_empty() {
            return Ok("/".to_string());
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(literal) => out.push_str(literal),
                Segment::Param(name) => match params.get(name).filter(|v| !v.is_empty()) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(RouteError::MissingParam {
                            pattern: self.raw.clone(),
                            name: name.clone(),
                        })
                    }
                },
            }
        }
        Ok(out)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Who may land on a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteAccess {
    #[default]
    Public,
    /// Logged-out visitors are sent to login and the path is kept as the
    /// pending route.
    Authenticated,
}

#[derive(Clone)]
pub struct RouteEntry {
    pub pattern: RoutePattern,
    pub screen_id: String,
    pub title: String,
    pub access: RouteAccess,
    pub handler: RouteHandler,
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("pattern", &self.pattern.as_str())
            .field("screen_id", &self.screen_id)
            .field("title", &self.title)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct MatchResult<'a> {
    pub entry: &'a RouteEntry,
    pub params: RouteParams,
}

/// A later pattern that can never win because an earlier one covers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOverlap {
    pub earlier: String,
    pub later: String,
}

#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    overlaps: Vec<RouteOverlap>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(
        &mut self,
        pattern: &str,
        screen_id: &str,
        title: &str,
        handler: F,
    ) -> Result<(), RouteError>
    where
        F: Fn(&RouteParams) + Send + Sync + 'static,
    {
        self.insert(pattern, screen_id, title, RouteAccess::Public, Arc::new(handler))
    }

    pub fn register_protected<F>(
        &mut self,
        pattern: &str,
        screen_id: &str,
        title: &str,
        handler: F,
    ) -> Result<(), RouteError>
    where
        F: Fn(&RouteParams) + Send + Sync + 'static,
    {
        self.insert(
            pattern,
            screen_id,
            title,
            RouteAccess::Authenticated,
            Arc::new(handler),
        )
    }

    fn insert(
        &mut self,
        pattern: &str,
        screen_id: &str,
        title: &str,
        access: RouteAccess,
        handler: RouteHandler,
    ) -> Result<(), RouteError> {
        let pattern = RoutePattern::parse(pattern)?;
        if self
            .entries
            .iter()
            .any(|entry| entry.pattern.as_str() == pattern.as_str())
        {
            return Err(RouteError::DuplicatePattern {
                pattern: pattern.as_str().to_string(),
            });
        }

        if let Some(earlier) = self
            .entries
            .iter()
            .find(|entry| entry.pattern.subsumes(&pattern))
        {
            tracing::warn!(
                earlier = earlier.pattern.as_str(),
                later = pattern.as_str(),
                "route is shadowed by an earlier registration and will never match"
            );
            self.overlaps.push(RouteOverlap {
                earlier: earlier.pattern.as_str().to_string(),
                later: pattern.as_str().to_string(),
            });
        }

        self.entries.push(RouteEntry {
            pattern,
            screen_id: screen_id.to_string(),
            title: title.to_string(),
            access,
            handler,
        });
        Ok(())
    }

    pub fn match_path(&self, path: &str) -> Result<MatchResult<'_>, RouteError> {
        let parts = split_path(path);
        self.entries
            .iter()
            .find_map(|entry| {
                entry
                    .pattern
                    .match_segments(&parts)
                    .map(|params| MatchResult { entry, params })
            })
            .ok_or_else(|| RouteError::NotFound {
                path: path.to_string(),
            })
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn overlaps(&self) -> &[RouteOverlap] {
        &self.overlaps
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split a path into non-empty segments, ignoring any query or fragment.
pub fn split_path(path: &str) -> Vec<&str> {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    path[..end].split('/').filter(|part| !part.is_empty()).collect()
}

/// Non-empty and absolute.
pub fn is_valid_path(path: &str) -> bool {
    !path.trim().is_empty() && path.starts_with('/')
}

fn invalid(pattern: &str, reason: &str) -> RouteError {
    RouteError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}
