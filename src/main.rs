//! Meetmesh signaling server.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use meetmesh::config::Config;
use meetmesh::handlers;
use meetmesh::protocol::{ClientMessage, ServerMessage};
use meetmesh::state::AppState;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = Arc::new(AppState::new(config.clone()));

    // Defensive room sweep; delete-on-empty makes this a no-op normally.
    let sweep_state = state.clone();
    let sweep_interval = tokio::time::Duration::from_millis(config.room.sweep_interval_ms);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            handlers::room::sweep_empty_rooms(&sweep_state);
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, "meetmesh signaling server started");
    tracing::info!("WebSocket: ws://{}/ws", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>Meetmesh Signaling Server</h1><p>WebSocket endpoint: /ws</p>")
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "meetmesh",
        "timestamp": std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let peer_id = handlers::connection::handle_connect(&state, tx.clone());

    // Outbound pump: the unbounded queue decouples room broadcasts from
    // this connection's socket backpressure.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(&state, &peer_id, &tx, msg),
                Err(err) => {
                    tracing::debug!(peer_id = %peer_id, error = %err, "undecodable message dropped");
                }
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    handlers::connection::handle_disconnect(&state, &peer_id);
    send_task.abort();
}

fn handle_client_message(
    state: &Arc<AppState>,
    peer_id: &str,
    sender: &mpsc::UnboundedSender<ServerMessage>,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::Heartbeat => {
            handlers::connection::handle_heartbeat(sender);
        }
        ClientMessage::JoinMeeting { meeting_id, user } => {
            handlers::room::handle_join(state, peer_id, &meeting_id, user);
        }
        ClientMessage::LeaveMeeting => {
            handlers::room::handle_leave(state, peer_id);
        }
        ClientMessage::WebrtcOffer { to, sdp, from_user } => {
            handlers::signaling::relay_offer(state, peer_id, &to, sdp, from_user);
        }
        ClientMessage::WebrtcAnswer { to, sdp } => {
            handlers::signaling::relay_answer(state, peer_id, &to, sdp);
        }
        ClientMessage::IceCandidate { to, candidate } => {
            handlers::signaling::relay_ice_candidate(state, peer_id, &to, candidate);
        }
        ClientMessage::ChatMessage {
            meeting_id,
            user,
            text,
        } => {
            handlers::chat::handle_chat_message(state, peer_id, &meeting_id, user, text);
        }
    }
}
