use anyhow::Result;
use axum::{Json, Router, extract::State, routing::get};

use crate::statistics::Statistics;

fn default_listen() -> std::net::SocketAddr {
    "127.0.0.1:3000".parse().unwrap()
}

#[derive(Clone)]
struct AppState {
    statistics: Statistics,
}

async fn stats(State(state): State<AppState>) -> Json<crate::statistics::Snapshot> {
    Json(state.statistics.snapshot())
}

/// Serves a single `GET /stats` endpoint reporting the process-wide
/// forwarding counters. Deliberately smaller than the teacher's controller
/// surface — there is no session concept to list or delete here.
pub async fn start_server(statistics: Statistics) -> Result<()> {
    let app = Router::new()
        .route("/stats", get(stats))
        .with_state(AppState { statistics });

    let listen = default_listen();
    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("stats api listening on {listen}");

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            log::error!("stats api stopped: {err}");
        }
    });

    Ok(())
}
