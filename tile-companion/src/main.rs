mod analysis;
mod catalog;
mod config;
mod events;
mod hand;
mod notify;
mod protocol;
mod replay;
mod session;
mod state;
mod store;
mod tenhou;
mod workers;

use std::{fmt::Display, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Local, TimeZone};
use crossbeam_channel::Sender;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::{
    analysis::SnapshotAdvisor,
    config::CompanionConfig,
    hand::{AdHocAnalysis, AdHocOutcome, NotationHandAnalyzer},
    notify::{CompanionNotifier, TracingNotifier},
    session::{MajsoulSession, SessionSettings},
    state::LoggingRoundModel,
    tenhou::TenhouSession,
    workers::{raw_message_queue, spawn_majsoul_bridge, spawn_processing_thread, RawPayload},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (config, config_path) = CompanionConfig::load_or_create()?;
    info!(path = %config_path.display(), "loaded config");
    let addr = config.http_addr()?;

    let notifier: Arc<dyn CompanionNotifier> = Arc::new(TracingNotifier);
    let (tenhou_tx, tenhou_rx) = raw_message_queue();
    let (majsoul_tx, majsoul_rx) = raw_message_queue();

    spawn_processing_thread(
        TenhouSession::new(Box::new(LoggingRoundModel::new("tenhou"))),
        tenhou_rx,
    )?;
    spawn_processing_thread(
        MajsoulSession::new(
            Box::new(LoggingRoundModel::new("majsoul")),
            Arc::new(SnapshotAdvisor),
            notifier,
            SessionSettings::from_config(&config),
        ),
        majsoul_rx,
    )?;

    match config.majsoul_source() {
        Some(url) => {
            spawn_majsoul_bridge(
                url.to_owned(),
                Duration::from_secs(config.reconnect_backoff_secs),
                majsoul_tx,
            );
        }
        None => info!("majsoul source disabled; record and live payloads will not arrive"),
    }

    let ad_hoc = Arc::new(AdHocAnalysis::new(Arc::new(NotationHandAnalyzer)));
    run_http_server(addr, tenhou_tx, ad_hoc).await
}

async fn run_http_server(
    addr: SocketAddr,
    tenhou_tx: Sender<RawPayload>,
    ad_hoc: Arc<AdHocAnalysis>,
) -> Result<()> {
    let app = Router::new()
        .route("/", post(debug_echo))
        .route(
            "/tenhou",
            post({
                let tx = tenhou_tx.clone();
                move |body: Bytes| {
                    let tx = tx.clone();
                    async move { enqueue_payload(&tx, body) }
                }
            }),
        )
        .route(
            "/analysis",
            post({
                let ad_hoc = Arc::clone(&ad_hoc);
                move |body: Bytes| {
                    let ad_hoc = Arc::clone(&ad_hoc);
                    async move { analyze_hand(ad_hoc, body).await }
                }
            }),
        )
        .route("/health", get(|| async { "ok" }));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed binding http listener on {addr}"))?;

    info!("tile feed ingest available at http://{addr}/tenhou");
    info!("ad hoc hand analysis available at http://{addr}/analysis");
    axum::serve(listener, app)
        .await
        .context("axum serve failed")?;
    Ok(())
}

async fn debug_echo(body: Bytes) -> String {
    debug!(len = body.len(), body = %String::from_utf8_lossy(&body), "debug payload");
    format_debug_timestamp(&Local::now())
}

fn format_debug_timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn enqueue_payload(tx: &Sender<RawPayload>, body: Bytes) -> StatusCode {
    if tx.send(body.to_vec()).is_ok() {
        StatusCode::OK
    } else {
        error!("tenhou processing dropped; rejecting payload");
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn analyze_hand(ad_hoc: Arc<AdHocAnalysis>, body: Bytes) -> (StatusCode, String) {
    match tokio::task::spawn_blocking(move || ad_hoc.submit(&body)).await {
        Ok(outcome) => analysis_response(outcome),
        Err(err) => {
            error!(?err, "ad hoc analysis task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "analysis failed".to_owned(),
            )
        }
    }
}

fn analysis_response(outcome: AdHocOutcome) -> (StatusCode, String) {
    match outcome {
        AdHocOutcome::Done(report) => (StatusCode::OK, report.normalized),
        AdHocOutcome::Busy => (
            StatusCode::FORBIDDEN,
            "another analysis is in progress".to_owned(),
        ),
        AdHocOutcome::Rejected(reason) => (StatusCode::BAD_REQUEST, reason),
    }
}
