//! Ordered header list with case-insensitive lookup.
//!
//! Headers are kept exactly as received: original name casing, original
//! order, duplicates included. Only framing corrections and explicit rewrites
//! touch them.

use std::fmt;

/// A single header field.
#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: Vec<u8>,
}

impl Header {
    /// Value as UTF-8, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, String::from_utf8_lossy(&self.value))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// First value for `name`, if present and valid UTF-8.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .and_then(Header::value_str)
    }

    /// All raw values for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.entries
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_slice())
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Replaces the first `name` header in place and drops any others.
    /// Appends when the header is absent.
    pub fn set(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(name))
        {
            Some(idx) => {
                self.entries[idx].value = value;
                let mut seen = 0;
                self.entries.retain(|h| {
                    if h.name.eq_ignore_ascii_case(name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.append(name, value),
        }
    }

    /// Removes every `name` header, returning how many were dropped.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|h| !h.name.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// True if any comma-separated element of any `name` header equals
    /// `token`, ignoring ASCII case.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.tokens(name).any(|t| t.eq_ignore_ascii_case(token))
    }

    /// Comma-separated elements across every `name` header.
    pub fn tokens<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.get_all(name)
            .filter_map(|v| std::str::from_utf8(v).ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Rewrites the first `name` header through `f`, if present.
    pub fn update(&mut self, name: &str, f: impl FnOnce(&str) -> String) {
        if let Some(h) = self
            .entries
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(name))
        {
            if let Some(current) = h.value_str() {
                let new = f(current);
                h.value = new.into_bytes();
            }
        }
    }
}

impl<N: Into<String>, V: Into<Vec<u8>>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let headers: Headers = [("Content-Type", "text/plain")].into_iter().collect();
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn duplicates_are_preserved_in_order() {
        let headers: Headers = [("Set-Cookie", "a=1"), ("X-Other", "x"), ("set-cookie", "b=2")]
            .into_iter()
            .collect();
        let all: Vec<_> = headers.get_all("Set-Cookie").collect();
        assert_eq!(all, vec![&b"a=1"[..], &b"b=2"[..]]);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut headers: Headers = [("Host", "a"), ("Content-Length", "1"), ("content-length", "1"), ("Accept", "*/*")]
            .into_iter()
            .collect();
        headers.set("Content-Length", "10");
        let names: Vec<_> = headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Host", "Content-Length", "Accept"]);
        assert_eq!(headers.get("content-length"), Some("10"));
    }

    #[test]
    fn tokens_span_multiple_headers() {
        let headers: Headers = [("Connection", "Upgrade, keep-alive"), ("Connection", "Close")]
            .into_iter()
            .collect();
        assert!(headers.has_token("connection", "close"));
        assert!(headers.has_token("connection", "upgrade"));
        assert!(!headers.has_token("connection", "te"));
    }
}
