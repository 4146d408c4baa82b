//! Request verbs and path patterns used by handler maps.

use std::fmt;

/// HTTP verb for handler registration and matching.
///
/// `Any` is the wildcard sentinel: a handler registered under `Any` matches
/// every verb, but only after exact-verb entries have been tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Any,
}

impl Verb {
    /// Parse a request-line method token. Unknown methods are rejected by
    /// the request parser before dispatch ever sees them.
    pub fn parse(token: &str) -> Option<Verb> {
        match token {
            "GET" => Some(Verb::Get),
            "POST" => Some(Verb::Post),
            "PUT" => Some(Verb::Put),
            "DELETE" => Some(Verb::Delete),
            "HEAD" => Some(Verb::Head),
            "OPTIONS" => Some(Verb::Options),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::Head => "HEAD",
            Verb::Options => "OPTIONS",
            Verb::Any => "*",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path key for handler registration.
///
/// `Any` is the wildcard sentinel ("any path"). Wildcard entries are
/// fallback-only: an exact entry for the request path always wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathPattern {
    Exact(String),
    Any,
}

impl From<&str> for PathPattern {
    fn from(s: &str) -> Self {
        if s == "*" {
            PathPattern::Any
        } else {
            PathPattern::Exact(crate::request::normalize_path(s))
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPattern::Exact(p) => f.write_str(p),
            PathPattern::Any => f.write_str("*"),
        }
    }
}
