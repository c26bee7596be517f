//! Local attention relay for development.
//!
//! Serves the attention channel at `/ws` and a medication list at
//! `/api/medications`, both backed by a fixture directory.

use axum::{
    extract::{
        ws::{Message as Frame, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use anyhow::Context;
use client::relay::Switchboard;
use domain::{
    relay::{Directory, StaticDirectory},
    Claims, Medication, Message,
};
use futures_util::{SinkExt, StreamExt};
use std::{
    env,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
struct AppState {
    switchboard: Arc<Mutex<Switchboard<StaticDirectory>>>,
    medications: Arc<Vec<Medication>>,
}

impl AppState {
    fn switchboard(&self) -> MutexGuard<'_, Switchboard<StaticDirectory>> {
        self.switchboard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let path =
        env::var("MEDTRACK_DIRECTORY").unwrap_or_else(|_| "fixtures/directory.json".to_string());
    let port = env::var("RELAY_PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(3000);

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading directory fixture {}", path))?;
    let directory: StaticDirectory =
        serde_json::from_str(&raw).with_context(|| format!("parsing directory fixture {}", path))?;
    info!(
        "Loaded {} patients and {} drugs from {}",
        directory.patients.len(),
        directory.drugs.len(),
        path
    );

    let state = AppState {
        medications: Arc::new(medications(&directory)),
        switchboard: Arc::new(Mutex::new(Switchboard::new(directory))),
    };

    let app = Router::new()
        .route("/ws", get(connect))
        .route("/api/medications", get(list_medications))
        .route("/health", get(|| async { "ok" }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Relay listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

// Every known drug, sorted by brand name
fn medications(directory: &StaticDirectory) -> Vec<Medication> {
    let mut medications: Vec<Medication> = directory
        .drugs
        .keys()
        .filter_map(|drug_id| {
            directory
                .drug_name(drug_id)
                .map(|name| Medication::new(drug_id.clone(), name))
        })
        .collect();
    medications.sort_by(|a, b| a.brand_name.cmp(&b.brand_name));
    medications
}

fn bearer_claims(headers: &HeaderMap) -> Result<Claims, (StatusCode, String)> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or((StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()))?;

    Claims::decode(token.trim()).map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))
}

// List medications
async fn list_medications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    bearer_claims(&headers)?;
    Ok(Json(state.medications.as_ref().clone()))
}

// Open the attention channel
async fn connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, (StatusCode, String)> {
    let claims = bearer_claims(&headers)?;
    Ok(ws.on_upgrade(move |socket| serve(state, claims, socket)))
}

async fn serve(state: AppState, claims: Claims, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (to_client, mut outbound) = mpsc::unbounded_channel::<Message>();
    let connection = state.switchboard().register(&claims, to_client);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {}: {}", message.event_name(), e);
                    continue;
                }
            };
            if sink.send(Frame::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Frame::Text(text)) => text,
            Ok(Frame::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        match serde_json::from_str::<Message>(&text) {
            Ok(message) => {
                if let Err(e) = state.switchboard().route(&claims, message) {
                    warn!("Rejected frame from {}: {}", claims.id, e);
                }
            }
            Err(e) => debug!("Unrecognised frame from {}: {}", claims.id, e),
        }
    }

    state.switchboard().unregister(&claims.id, connection);
    writer.abort();
}
