//! Route matching logic.
//!
//! # Responsibilities
//! - Match host header (exact match, case-insensitive)
//! - Match path prefix (case-sensitive, on segment boundaries)
//! - Match a relocator's local root
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching ignores the port unless the expected host names one
//! - Empty condition list = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use std::sync::Arc;

use crate::http::RequestHead;
use crate::rewrite::Relocator;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &RequestHead) -> bool;
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &RequestHead) -> bool {
        let Some(host) = req.host() else {
            return false;
        };
        let host = host.to_lowercase();
        if host == self.expected_host {
            return true;
        }
        match host.rsplit_once(':') {
            Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => {
                name == self.expected_host
            }
            _ => false,
        }
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &RequestHead) -> bool {
        let path = req.path();
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => self.prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Matches requests under a relocator's local root.
#[derive(Debug, Clone)]
pub struct LocalRootMatcher {
    relocator: Arc<Relocator>,
}

impl LocalRootMatcher {
    pub fn new(relocator: Arc<Relocator>) -> Self {
        Self { relocator }
    }
}

impl Matcher for LocalRootMatcher {
    fn matches(&self, req: &RequestHead) -> bool {
        self.relocator.matches_local(&req.uri)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &RequestHead) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::RelocatorKind;

    fn with_host(uri: &str, host: &str) -> RequestHead {
        let mut req = RequestHead::new("GET", uri);
        req.headers.append("Host", host);
        req
    }

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new("example.com");
        assert!(matcher.matches(&with_host("/", "example.com")));
        assert!(matcher.matches(&with_host("/", "EXAMPLE.COM")));
        assert!(matcher.matches(&with_host("/", "example.com:8080")));
        assert!(!matcher.matches(&with_host("/", "other.com")));
        assert!(!matcher.matches(&RequestHead::new("GET", "/")));
    }

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/api");
        assert!(matcher.matches(&RequestHead::new("GET", "http://example.com/api/v1")));
        assert!(matcher.matches(&RequestHead::new("GET", "/api?x=1")));
        assert!(!matcher.matches(&RequestHead::new("GET", "/apis")));
        assert!(!matcher.matches(&RequestHead::new("GET", "/images")));
    }

    #[test]
    fn test_local_root_and_combination() {
        let relocator = Arc::new(
            Relocator::new("/svn", "http://svn.example.com/", RelocatorKind::Plain).unwrap(),
        );
        let matcher = AndMatcher::new(vec![
            Box::new(HostMatcher::new("www.example.com")),
            Box::new(LocalRootMatcher::new(relocator)),
        ]);
        assert!(matcher.matches(&with_host("/svn/trunk", "www.example.com")));
        assert!(!matcher.matches(&with_host("/svn/trunk", "other.example.com")));
        assert!(!matcher.matches(&with_host("/wiki", "www.example.com")));
        assert!(AndMatcher::new(Vec::new()).matches(&RequestHead::new("GET", "/")));
    }
}
