//! Tests for the server shell: static spec serving, the file-tree API, the
//! health route, and the server header.

use specd::{config::ServerConfig, server, AppContext};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_spec(root: &Path, rel: &str, heading: &str) {
    let dir = root.join(rel);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("index.html"),
        format!("<html><body><h1 id=\"top\">{heading}</h1><p>{heading} body</p></body></html>"),
    )
    .unwrap();
}

fn write_core_views(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("default.html"), "<body>{{title}}{{sections}}{{clarify_data}}</body>")
        .unwrap();
}

async fn start_server() -> (Arc<AppContext>, String, TempDir, TempDir, TempDir) {
    let content = TempDir::new().unwrap();
    let views = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();

    write_spec(content.path(), "components/button", "Button");
    write_core_views(views.path());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = ServerConfig::new(
        Some(port),
        None,
        content.path().to_path_buf(),
        Some(data.path().to_path_buf()),
        Some("error".to_string()),
        None,
        Some(views.path().to_path_buf()),
        true,
    );
    let ctx = Arc::new(AppContext::new(config).await.unwrap());
    ctx.tree.scan().await.unwrap();

    let router = server::build_router(ctx.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (ctx, format!("http://127.0.0.1:{port}"), content, views, data)
}

#[tokio::test]
async fn health_reports_status_and_spec_count() {
    let (_ctx, base, _content, _views, _data) = start_server().await;
    let res = reqwest::get(format!("{base}/api/health")).await.unwrap();
    assert_eq!(res.status(), 200);

    let body: serde_json::Value = serde_json::from_str(&res.text().await.unwrap()).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["specs"], 1);
    assert!(body["uptime"].is_number());
}

#[tokio::test]
async fn every_response_carries_the_server_header() {
    let (_ctx, base, _content, _views, _data) = start_server().await;
    let res = reqwest::get(format!("{base}/api/health")).await.unwrap();
    let header = res.headers().get("x-powered-by").unwrap().to_str().unwrap();
    assert!(header.starts_with("specd "));
}

#[tokio::test]
async fn static_spec_pages_are_served_directly() {
    let (_ctx, base, _content, _views, _data) = start_server().await;
    let res = reqwest::get(format!("{base}/components/button/")).await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.text().await.unwrap().contains("Button body"));
}

#[tokio::test]
async fn update_file_tree_picks_up_new_specs() {
    let (ctx, base, content, _views, _data) = start_server().await;

    write_spec(content.path(), "components/input", "Input");
    assert!(ctx.tree.lookup("/components/input/").await.is_none());

    let res = reqwest::get(format!("{base}/api/updateFileTree")).await.unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = serde_json::from_str(&res.text().await.unwrap()).unwrap();
    assert_eq!(body["message"], "File tree successfully updated.");
    assert_eq!(body["specs"], 2);

    assert!(ctx.tree.lookup("/components/input/").await.is_some());
}

#[tokio::test]
async fn concurrent_clarify_requests_on_different_specs_are_independent() {
    let (_ctx, base, content, _views, _data) = start_server().await;
    write_spec(content.path(), "components/input", "Input");
    reqwest::get(format!("{base}/api/updateFileTree")).await.unwrap();

    // Each request triggers its own implicit refresh; the loopback fetch
    // must be served while the outer requests are still in flight.
    let a = reqwest::get(format!("{base}/components/button/?clarify&fromApi=1"));
    let b = reqwest::get(format!("{base}/components/input/?clarify&fromApi=1"));
    let (a, b) = tokio::join!(a, b);

    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.status(), 200);
    assert_eq!(b.status(), 200);
    assert!(a.text().await.unwrap().contains("Button body"));
    assert!(b.text().await.unwrap().contains("Input body"));
}
