// server/mod.rs — HTTP server shell around the clarify pipeline.
//
// Route set:
//   GET /api/updateFileTree   rescan the content tree
//   GET /api/health           status/version/uptime/spec count
//   *                         static spec content (ServeDir, index.html
//                             appended for directory requests)
// The clarify middleware wraps everything: a `?clarify` query on any path is
// handled by the pipeline instead of reaching these routes.

use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::{clarify, AppContext};

pub async fn start(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.hostname, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx.clone());

    info!(
        "specd listening on http://{} in {:?} mode",
        addr, ctx.config.mode
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/updateFileTree", get(update_file_tree))
        .route("/api/health", get(health))
        .fallback_service(ServeDir::new(&ctx.config.content_dir))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            clarify::intercept,
        ))
        .layer(middleware::from_fn(powered_by))
        .with_state(ctx)
}

async fn powered_by(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    res.headers_mut().insert(
        "x-powered-by",
        HeaderValue::from_static(concat!("specd ", env!("CARGO_PKG_VERSION"))),
    );
    res
}

async fn update_file_tree(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match ctx.tree.scan().await {
        Ok(specs) => Ok(Json(json!({
            "message": "File tree successfully updated.",
            "specs": specs,
        }))),
        Err(e) => {
            error!(err = %e, "file tree rescan failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "File tree rescan failed" })),
            ))
        }
    }
}

async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": ctx.started_at.elapsed().as_secs(),
        "specs": ctx.tree.len().await,
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("shutdown: ctrl-c"),
        _ = terminate => info!("shutdown: SIGTERM"),
    }
}
