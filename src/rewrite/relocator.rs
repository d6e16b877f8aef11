//! Path relocation between an external root and an upstream root.
//!
//! A relocator is configured with two roots, e.g. `/svn` (what clients
//! see) and `http://svn.example.com/` (where the content really lives).
//! Requests are moved from the local root to the remote one; redirects and
//! URLs embedded in selected bodies are moved back.
//!
//! # Flavours
//! ```text
//! plain  request-URI, Host, Destination, Location, Content-Location
//! dav    plain + <D:href> in WebDAV request and text/xml response bodies
//! svn    dav + <S:src-path> (requests) and bc-url (responses)
//! html   plain + action/href/src attributes of text/html responses
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::http::{Body, Headers, HttpRequest, HttpResponse, RequestHead};
use crate::rewrite::markup::{self, Markup};
use crate::rewrite::url::{relocate, split_absolute, UrlError, UrlInfo};
use crate::rewrite::Rewriter;
use crate::routing::Destination;

/// Methods whose bodies carry WebDAV URLs. Rewriting bodies of anything
/// else (a GET of a file that happens to contain `<D:href>`) would corrupt
/// content.
const DAV_METHODS: &[&str] = &[
    "OPTIONS",
    "PROPFIND",
    "REPORT",
    "MKACTIVITY",
    "PROPPATCH",
    "CHECKOUT",
    "MKCOL",
    "MOVE",
    "COPY",
    "LOCK",
    "UNLOCK",
    "MERGE",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelocatorKind {
    #[default]
    Plain,
    Dav,
    Svn,
    Html,
}

impl RelocatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelocatorKind::Plain => "plain",
            RelocatorKind::Dav => "dav",
            RelocatorKind::Svn => "svn",
            RelocatorKind::Html => "html",
        }
    }

    fn request_markup(&self) -> &'static [Markup] {
        match self {
            RelocatorKind::Dav => &[Markup::DavHref],
            RelocatorKind::Svn => &[Markup::DavHref, Markup::SvnSrcPath],
            RelocatorKind::Plain | RelocatorKind::Html => &[],
        }
    }

    fn response_markup(&self) -> &'static [Markup] {
        match self {
            RelocatorKind::Dav => &[Markup::DavHref],
            RelocatorKind::Svn => &[Markup::DavHref, Markup::SvnBcUrl],
            RelocatorKind::Html => &[Markup::HtmlLinks],
            RelocatorKind::Plain => &[],
        }
    }

    fn is_dav(&self) -> bool {
        matches!(self, RelocatorKind::Dav | RelocatorKind::Svn)
    }
}

#[derive(Debug)]
struct Roots {
    local: UrlInfo,
    remote: UrlInfo,
}

/// Maps a local URL root onto a remote one.
#[derive(Debug, Clone)]
pub struct Relocator {
    roots: Arc<Roots>,
    remote_host: String,
    kind: RelocatorKind,
}

impl Relocator {
    /// `remote` must be absolute so the relocator knows where to connect.
    pub fn new(local: &str, remote: &str, kind: RelocatorKind) -> Result<Self, UrlError> {
        let local = UrlInfo::parse(local)?;
        let remote_info = UrlInfo::parse(remote)?;
        let remote_host = remote_info
            .host
            .clone()
            .ok_or_else(|| UrlError::MissingHost(remote.to_string()))?;
        Ok(Self {
            roots: Arc::new(Roots {
                local,
                remote: remote_info,
            }),
            remote_host,
            kind,
        })
    }

    pub fn local(&self) -> &UrlInfo {
        &self.roots.local
    }

    pub fn remote(&self) -> &UrlInfo {
        &self.roots.remote
    }

    pub fn kind(&self) -> RelocatorKind {
        self.kind
    }

    /// Moves an external URL under the remote root. Unmatched URLs are
    /// returned as they are.
    pub fn rewrite_local(&self, url: &str) -> String {
        relocate(url, &self.roots.local, &self.roots.remote, None).unwrap_or_else(|| url.to_string())
    }

    /// Moves an upstream URL under the local root. `external_base` supplies
    /// `scheme://host` when the local root has none.
    pub fn rewrite_remote(&self, url: &str, external_base: Option<&str>) -> String {
        relocate(url, &self.roots.remote, &self.roots.local, external_base)
            .unwrap_or_else(|| url.to_string())
    }

    pub fn matches_local(&self, url: &str) -> bool {
        self.roots.local.contains(url)
    }

    pub fn matches_remote(&self, url: &str) -> bool {
        self.roots.remote.contains(url)
    }

    /// Routing destination for requests under the local root.
    pub fn mapping(self: &Arc<Self>) -> Destination {
        Destination::new(self.remote_host.clone(), self.roots.remote.port)
            .with_rewriter(self.clone())
    }

    fn wants_request_body(&self, head: &RequestHead, body: &Body<'_>) -> bool {
        self.kind.is_dav()
            && is_dav_method(&head.method)
            && !body.framing().is_empty()
            && !head.headers.contains("content-encoding")
    }

    fn wants_response_body(&self, headers: &Headers, request: &RequestHead) -> bool {
        if headers.contains("content-encoding") {
            return false;
        }
        let media = media_type(headers);
        match self.kind {
            RelocatorKind::Dav | RelocatorKind::Svn => {
                is_dav_method(&request.method)
                    && matches!(media.as_deref(), Some("text/xml" | "application/xml"))
            }
            RelocatorKind::Html => media.as_deref() == Some("text/html"),
            RelocatorKind::Plain => false,
        }
    }
}

impl Rewriter for Relocator {
    fn rewrite_request<'a>(&self, request: HttpRequest<'a>) -> HttpRequest<'a> {
        let HttpRequest { mut head, mut body } = request;

        head.uri = self.rewrite_local(origin_form(&head.uri));
        if let Some(host) = self.roots.remote.host_header() {
            head.headers.set("Host", host);
        }
        head.headers.update("destination", |d| self.rewrite_local(d));

        if self.wants_request_body(&head, &body) {
            let roots = Arc::clone(&self.roots);
            let markups = self.kind.request_markup();
            body = body.map_full(move |data| {
                markup::rewrite(&data, markups, |url| {
                    relocate(url, &roots.local, &roots.remote, None)
                })
            });
        }
        HttpRequest::new(head, body)
    }

    fn rewrite_response<'a>(
        &self,
        response: HttpResponse<'a>,
        request: &RequestHead,
    ) -> HttpResponse<'a> {
        let HttpResponse { mut head, mut body } = response;
        let external = request.host().map(|host| format!("http://{host}"));

        for name in ["location", "content-location"] {
            head.headers
                .update(name, |v| self.rewrite_remote(v, external.as_deref()));
        }

        if self.wants_response_body(&head.headers, request) {
            let roots = Arc::clone(&self.roots);
            let markups = self.kind.response_markup();
            body = body.map_full(move |data| {
                markup::rewrite(&data, markups, |url| {
                    relocate(url, &roots.remote, &roots.local, external.as_deref())
                })
            });
        }
        HttpResponse::new(head, body)
    }

    fn name(&self) -> &str {
        self.kind.as_str()
    }
}

fn is_dav_method(method: &str) -> bool {
    DAV_METHODS.iter().any(|m| m.eq_ignore_ascii_case(method))
}

fn media_type(headers: &Headers) -> Option<String> {
    let value = headers.get("content-type")?;
    let media = value.split(';').next().unwrap_or(value).trim();
    Some(media.to_ascii_lowercase())
}

/// Drops the `scheme://authority` of an absolute-form request target.
fn origin_form(uri: &str) -> &str {
    match split_absolute(uri) {
        Some((_, "")) => "/",
        Some((_, rest)) => rest,
        None => uri,
    }
}
