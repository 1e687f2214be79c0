pub mod handlers;

use std::future::Future;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::{ApiError, ApiState};

/// All admin routes over `state`.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/version", get(handlers::handle_version))
        .route("/reset", post(handlers::handle_reset))
        .route(
            "/proxies",
            get(handlers::handle_proxy_list).post(handlers::handle_proxy_create),
        )
        .route("/populate", post(handlers::handle_populate))
        .route(
            "/proxies/{proxy}",
            get(handlers::handle_proxy_show)
                .post(handlers::handle_proxy_update)
                .delete(handlers::handle_proxy_delete),
        )
        .route(
            "/proxies/{proxy}/toxics",
            get(handlers::handle_toxic_list).post(handlers::handle_toxic_create),
        )
        .route(
            "/proxies/{proxy}/toxics/{toxic}",
            get(handlers::handle_toxic_show)
                .post(handlers::handle_toxic_update)
                .delete(handlers::handle_toxic_delete),
        )
        .with_state(state)
        .layer(cors)
}

/// Serve the admin API on `addr` until `shutdown` resolves.
pub async fn serve<F>(state: ApiState, addr: &str, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind API on {addr}"))?;
    serve_listener(state, listener, shutdown).await
}

/// Serve the admin API on an already bound listener.
pub async fn serve_listener<F>(
    state: ApiState,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!(addr = %listener.local_addr()?, "API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
