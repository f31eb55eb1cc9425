//! Environment-variable based configuration.

use std::env;

/// Server settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    #[allow(dead_code)]
    pub cors_origins: Vec<String>,
    pub room: RoomConfig,
    pub chat: ChatConfig,
    pub rtc: RtcConfig,
    pub log_level: String,
}

/// Room settings.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub sweep_interval_ms: u64,
}

/// Chat log settings.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub history_limit: usize,
}

/// Peer-link settings used by the client-side engine.
#[derive(Debug, Clone)]
pub struct RtcConfig {
    pub stun_servers: Vec<String>,
}

impl Config {
    /// Load settings from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            room: RoomConfig {
                sweep_interval_ms: env::var("ROOM_SWEEP_INTERVAL_MS")
                    .unwrap_or_else(|_| "60000".to_string())
                    .parse()
                    .unwrap_or(60000),
            },
            chat: ChatConfig {
                history_limit: env::var("CHAT_HISTORY_LIMIT")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .unwrap_or(500),
            },
            rtc: RtcConfig {
                stun_servers: env::var("STUN_SERVERS")
                    .unwrap_or_else(|_| "stun:stun.l.google.com:19302".to_string())
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}
