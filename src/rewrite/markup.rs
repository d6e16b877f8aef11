//! URL rewriting inside XML and HTML bodies.
//!
//! No DOM is built. Each pattern captures `(prefix)(url)(suffix)` and only
//! the middle group is handed to the relocation function.

use std::borrow::Cow;
use std::sync::OnceLock;

use bytes::Bytes;
use regex::bytes::{Captures, Regex};

/// Places in a document that carry URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Markup {
    /// `<D:href>` element text (WebDAV multistatus and request bodies).
    DavHref,
    /// `<S:src-path>` element text (Subversion update reports).
    SvnSrcPath,
    /// `bc-url` attribute of `<S:add-directory>`.
    SvnBcUrl,
    /// `action`, `href` and `src` attributes in HTML.
    HtmlLinks,
}

impl Markup {
    fn regex(self) -> &'static Regex {
        static DAV_HREF: OnceLock<Regex> = OnceLock::new();
        static SVN_SRC_PATH: OnceLock<Regex> = OnceLock::new();
        static SVN_BC_URL: OnceLock<Regex> = OnceLock::new();
        static HTML_LINKS: OnceLock<Regex> = OnceLock::new();

        let (cell, pattern) = match self {
            Markup::DavHref => (&DAV_HREF, r"(?i)(<D:href>)([^<]*)(</D:href>)"),
            Markup::SvnSrcPath => (&SVN_SRC_PATH, r"(?i)(<S:src-path>)([^<]*)(</S:src-path>)"),
            Markup::SvnBcUrl => (
                &SVN_BC_URL,
                r#"(?i)(<S:add-directory\b[^>]*?\bbc-url\s*=\s*")([^"]*)(")"#,
            ),
            Markup::HtmlLinks => (
                &HTML_LINKS,
                r#"(?i)(\s(?:action|href|src)\s*=\s*")([^"]*)(")"#,
            ),
        };
        cell.get_or_init(|| Regex::new(pattern).expect("static markup pattern"))
    }
}

/// Rewrites every URL found by `markups` in `data` through `relocate`.
///
/// URLs for which `relocate` returns `None` are left as they were. Values
/// that are not UTF-8 are skipped.
pub(crate) fn rewrite<F>(data: &[u8], markups: &[Markup], relocate: F) -> Bytes
where
    F: Fn(&str) -> Option<String>,
{
    let mut current: Cow<'_, [u8]> = Cow::Borrowed(data);
    for markup in markups {
        let replaced = match markup.regex().replace_all(&current, |caps: &Captures<'_>| {
            let value = &caps[2];
            let rewritten = std::str::from_utf8(value).ok().and_then(&relocate);
            let mut out = caps[1].to_vec();
            out.extend_from_slice(rewritten.as_deref().map(str::as_bytes).unwrap_or(value));
            out.extend_from_slice(&caps[3]);
            out
        }) {
            Cow::Owned(owned) => Some(owned),
            Cow::Borrowed(_) => None,
        };
        if let Some(owned) = replaced {
            current = Cow::Owned(owned);
        }
    }
    match current {
        Cow::Borrowed(b) => Bytes::copy_from_slice(b),
        Cow::Owned(v) => Bytes::from(v),
    }
}
