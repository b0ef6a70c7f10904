//! Application configuration

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root of the per-experience content layout (state, templates, players)
    pub content_root: PathBuf,

    /// WebSocket server port
    pub server_port: u16,

    /// Pre-shared secret for bearer-token verification
    pub auth_secret: String,

    /// CORS allowed origins (comma-separated, or "*" for any)
    pub cors_allowed_origins: Vec<String>,

    /// Slow-path interpreter configuration
    pub interpreter: InterpreterConfig,

    /// Area-of-interest configuration
    pub aoi: AoiConfig,
}

/// Slow-path interpreter configuration
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Interpreter endpoint; unset means unknown actions return
    /// `not_implemented`
    pub url: Option<String>,
    /// External deadline for one interpreter call (seconds)
    pub timeout_seconds: u64,
}

/// Area-of-interest configuration
#[derive(Debug, Clone)]
pub struct AoiConfig {
    /// Maximum distance from a zone's GPS anchor for the zone to match (meters)
    pub zone_radius_m: f64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            content_root: env::var("CONTENT_ROOT")
                .unwrap_or_else(|_| "./content".to_string())
                .into(),

            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("SERVER_PORT must be a valid port number")?,

            auth_secret: env::var("AUTH_SECRET")
                .context("AUTH_SECRET environment variable is required")?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            interpreter: InterpreterConfig {
                url: env::var("INTERPRETER_URL").ok().filter(|s| !s.is_empty()),
                timeout_seconds: env::var("INTERPRETER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },

            aoi: AoiConfig {
                zone_radius_m: env::var("ZONE_RADIUS_M")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .unwrap_or(500.0),
            },
        })
    }
}
