//! Relocating routes compiled from configuration, end to end.

use std::sync::Arc;

use proxylet::config::parse_config;
use proxylet::{RouteTable, Router, SharedRouter};

mod common;

use common::{MockUpstream, RawClient, TestProxy};

fn routes(toml: &str) -> Arc<dyn Router> {
    let config = parse_config(toml).unwrap();
    Arc::new(SharedRouter::new(RouteTable::from_config(&config.routes).unwrap()))
}

#[tokio::test]
async fn location_is_moved_back_under_local_root() {
    let upstream = MockUpstream::start(|req| {
        let host = req.head.host().unwrap_or_default().to_string();
        format!(
            "HTTP/1.1 201 Created\r\nLocation: http://{host}/trunk/newfile.txt\r\nContent-Length: 0\r\n\r\n"
        )
    })
    .await;
    let proxy = TestProxy::start(routes(&format!(
        r#"
        [[routes]]
        name = "svn"
        kind = "relocate"
        local = "/svn"
        remote = "http://127.0.0.1:{}/"
        "#,
        upstream.port()
    )))
    .await;

    let res = common::client()
        .put(proxy.url("/svn/trunk/newfile.txt"))
        .body("contents")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    assert_eq!(
        res.headers()["location"],
        format!("http://{}/svn/trunk/newfile.txt", proxy.addr).as_str()
    );

    let seen = upstream.requests();
    assert_eq!(seen[0].head.uri, "/trunk/newfile.txt");
    assert_eq!(
        seen[0].head.host(),
        Some(format!("127.0.0.1:{}", upstream.port()).as_str())
    );
    assert_eq!(&seen[0].body[..], b"contents");
}

#[tokio::test]
async fn requests_outside_local_root_are_not_found() {
    let upstream = MockUpstream::fixed("never").await;
    let proxy = TestProxy::start(routes(&format!(
        r#"
        [[routes]]
        name = "svn"
        kind = "relocate"
        local = "/svn"
        remote = "http://127.0.0.1:{}/repos"
        "#,
        upstream.port()
    )))
    .await;

    let client = common::client();
    for path in ["/svnx/trunk", "/other", "/"] {
        let res = client.get(proxy.url(path)).send().await.unwrap();
        assert_eq!(res.status(), 404, "{path}");
    }
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn dav_bodies_are_rewritten_both_ways() {
    let upstream = MockUpstream::start(|req| {
        let body = String::from_utf8_lossy(&req.body).replace("propfind", "multistatus");
        format!(
            "HTTP/1.1 207 Multi-Status\r\nContent-Type: text/xml; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
    })
    .await;
    let proxy = TestProxy::start(routes(&format!(
        r#"
        [[routes]]
        name = "dav"
        kind = "relocate"
        local = "/dav"
        remote = "http://127.0.0.1:{}/repos"
        rewriter = "dav"
        "#,
        upstream.port()
    )))
    .await;
    let mut client = RawClient::connect(proxy.addr).await;

    let body = "<D:propfind><D:href>/dav/trunk/a.txt</D:href></D:propfind>";
    client
        .send(
            format!(
                "PROPFIND /dav/trunk HTTP/1.1\r\nHost: proxy.test\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            )
            .as_bytes(),
        )
        .await;
    let res = client.response("PROPFIND").await;

    let seen = upstream.requests();
    assert_eq!(seen[0].head.uri, "/repos/trunk");
    assert_eq!(
        String::from_utf8_lossy(&seen[0].body),
        "<D:propfind><D:href>/repos/trunk/a.txt</D:href></D:propfind>"
    );

    assert_eq!(res.head.status, 207);
    assert_eq!(
        String::from_utf8_lossy(&res.body),
        "<D:multistatus><D:href>/dav/trunk/a.txt</D:href></D:multistatus>"
    );
    assert_eq!(
        res.head.headers.get("content-length"),
        Some(res.body.len().to_string().as_str())
    );
}

#[tokio::test]
async fn plain_relocator_leaves_bodies_alone() {
    let page = r#"<a href="/repos/x">x</a>"#;
    let upstream = MockUpstream::start(move |_| {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
            page.len(),
            page
        )
    })
    .await;
    let proxy = TestProxy::start(routes(&format!(
        r#"
        [[routes]]
        name = "web"
        kind = "relocate"
        local = "/web"
        remote = "http://127.0.0.1:{}/repos"
        "#,
        upstream.port()
    )))
    .await;

    let text = common::client()
        .get(proxy.url("/web/index.html"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, page);
}

#[tokio::test]
async fn html_relocator_rewrites_links() {
    let page = r#"<a href="/repos/x">x</a><img src="http://elsewhere/y.png">"#;
    let upstream = MockUpstream::start(move |_| {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
            page.len(),
            page
        )
    })
    .await;
    let proxy = TestProxy::start(routes(&format!(
        r#"
        [[routes]]
        name = "web"
        kind = "relocate"
        local = "/web"
        remote = "http://127.0.0.1:{}/repos"
        rewriter = "html"
        "#,
        upstream.port()
    )))
    .await;

    let text = common::client()
        .get(proxy.url("/web/index.html"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(
        text,
        r#"<a href="/web/x">x</a><img src="http://elsewhere/y.png">"#
    );
}
