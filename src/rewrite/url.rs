//! URL roots and prefix relocation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("invalid url {url:?}: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("url {0:?} has no host")]
    MissingHost(String),

    #[error("url {0:?} is neither absolute nor an absolute path")]
    NotAbsolute(String),
}

/// A relocation root: `scheme://authority` plus a path prefix.
///
/// The path never ends with `/`; the site root is the empty string so
/// that `path + rest` always yields a well-formed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlInfo {
    pub base: Option<String>,
    pub path: String,
    pub host: Option<String>,
    pub port: u16,
}

impl UrlInfo {
    /// Parses an absolute URL (`http://svn.example.com/repo`) or an
    /// authority-less path (`/svn`).
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        if raw.starts_with('/') {
            return Ok(Self {
                base: None,
                path: trim_path(raw.split(['?', '#']).next().unwrap_or(raw)),
                host: None,
                port: 80,
            });
        }
        let url = url::Url::parse(raw).map_err(|source| match source {
            url::ParseError::RelativeUrlWithoutBase => UrlError::NotAbsolute(raw.to_string()),
            source => UrlError::Parse {
                url: raw.to_string(),
                source,
            },
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| UrlError::MissingHost(raw.to_string()))?
            .to_string();
        let base = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };
        Ok(Self {
            base: Some(base),
            path: trim_path(url.path()),
            port: url.port_or_known_default().unwrap_or(80),
            host: Some(host),
        })
    }

    /// Value for a `Host` header addressing this root.
    pub fn host_header(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        let default = self
            .base
            .as_deref()
            .map(|b| if b.starts_with("https:") { 443 } else { 80 })
            .unwrap_or(80);
        Some(if self.port == default {
            host.to_string()
        } else {
            format!("{host}:{}", self.port)
        })
    }

    /// Whether `url` lies under this root.
    pub fn contains(&self, url: &str) -> bool {
        if let Some((base, rest)) = split_absolute(url) {
            return self.base_matches(base) && strip_prefix(rest, &self.path).is_some();
        }
        if url.starts_with('/') {
            return strip_prefix(url, &self.path).is_some();
        }
        self.host_matches(url)
    }

    fn base_matches(&self, base: &str) -> bool {
        match &self.base {
            Some(own) => own.eq_ignore_ascii_case(base),
            None => true,
        }
    }

    fn host_matches(&self, url: &str) -> bool {
        self.host
            .as_deref()
            .is_some_and(|h| h.eq_ignore_ascii_case(url))
    }
}

fn trim_path(path: &str) -> String {
    path.trim_end_matches('/').to_string()
}

/// Splits `scheme://authority/rest` into `("scheme://authority", "/rest")`.
pub fn split_absolute(url: &str) -> Option<(&str, &str)> {
    let idx = url.find("://")?;
    let scheme = &url[..idx];
    let scheme_ok = !scheme.is_empty()
        && scheme
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'));
    if !scheme_ok {
        return None;
    }
    let after = idx + 3;
    let end = url[after..]
        .find(['/', '?', '#'])
        .map(|i| after + i)
        .unwrap_or(url.len());
    Some((&url[..end], &url[end..]))
}

/// Strips `prefix` from `path` on a segment boundary.
fn strip_prefix<'u>(path: &'u str, prefix: &str) -> Option<&'u str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') || rest.starts_with('#') {
        Some(rest)
    } else {
        None
    }
}

fn join(prefix: &str, rest: &str) -> String {
    let joined = format!("{prefix}{rest}");
    if joined.is_empty() || !joined.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Moves `url` from under `from` to under `to`.
///
/// Absolute URLs take `to`'s base, or `fallback_base` when `to` has none.
/// With neither, they shrink to an absolute path. Paths stay paths.
/// A bare host equal to `from`'s host maps to `to`'s host. Anything else
/// yields `None`.
pub fn relocate(url: &str, from: &UrlInfo, to: &UrlInfo, fallback_base: Option<&str>) -> Option<String> {
    if let Some((base, rest)) = split_absolute(url) {
        if !from.base_matches(base) {
            return None;
        }
        let tail = strip_prefix(rest, &from.path)?;
        let path = join(&to.path, tail);
        return match to.base.as_deref().or(fallback_base) {
            Some(out_base) => Some(format!("{out_base}{path}")),
            None => Some(path),
        };
    }
    if url.starts_with('/') {
        let tail = strip_prefix(url, &from.path)?;
        return Some(join(&to.path, tail));
    }
    if from.host_matches(url) {
        return to.host.clone();
    }
    None
}
