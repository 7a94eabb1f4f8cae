use anyhow::{Context, Result};
use demo_launcher::{DemoRegistry, LaunchOptions, LaunchSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::session::SessionSettings;

// =============================================================================
// File config (figment: defaults / demo-bridge.toml / env vars)
// =============================================================================
//
//   demo-bridge.toml:   [session]
//                       kill_grace_ms = 250
//
//   env var:            DEMO_BRIDGE_SESSION__KILL_GRACE_MS=250
//
//   (double underscore = nesting, single underscore stays in the field name)

/// Config file consulted when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "demo-bridge.toml";

pub const DEFAULT_PORT: u16 = 7681;

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
    /// Demo catalog, one `[demos.<name>]` table each
    #[serde(default)]
    pub demos: BTreeMap<String, LaunchSpec>,
}

/// Listener settings (`[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Per-session timing and buffering (`[session]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    /// Grace period between SIGTERM and SIGKILL
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    /// How long a stop or replace waits for the old child to be reaped
    #[serde(default = "default_exit_timeout_ms")]
    pub exit_timeout_ms: u64,
    /// How long buffered output is still forwarded after the child exits
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    #[serde(default = "default_capacity")]
    pub output_capacity: usize,
    /// Frames queued for a slow browser before the session pushes back
    #[serde(default = "default_capacity")]
    pub outbound_capacity: usize,
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            kill_grace_ms: default_kill_grace_ms(),
            exit_timeout_ms: default_exit_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            output_capacity: default_capacity(),
            outbound_capacity: default_capacity(),
            read_chunk: default_read_chunk(),
        }
    }
}

fn default_kill_grace_ms() -> u64 {
    500
}

fn default_exit_timeout_ms() -> u64 {
    2000
}

fn default_drain_timeout_ms() -> u64 {
    100
}

fn default_capacity() -> usize {
    256
}

fn default_read_chunk() -> usize {
    4096
}

/// Build the layered config: struct defaults, then the TOML file (missing
/// is fine), then `DEMO_BRIDGE_*` environment variables.
pub fn load_config(path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DEMO_BRIDGE_").split("__"))
}

// =============================================================================
// Runtime config
// =============================================================================

/// Everything the server needs, after CLI overrides.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub session: SessionSettings,
    pub launch: LaunchOptions,
    pub registry: DemoRegistry,
}

impl BridgeConfig {
    pub fn from_file_config(fc: FileConfig) -> Self {
        let session = &fc.session;
        Self {
            host: fc.server.host.clone(),
            port: fc.server.port,
            session: SessionSettings {
                exit_timeout: Duration::from_millis(session.exit_timeout_ms),
                drain_timeout: Duration::from_millis(session.drain_timeout_ms),
                outbound_capacity: session.outbound_capacity.max(1),
            },
            launch: LaunchOptions {
                kill_grace: Duration::from_millis(session.kill_grace_ms),
                output_capacity: session.output_capacity.max(1),
                read_chunk: session.read_chunk.max(1),
            },
            registry: DemoRegistry::new(fc.demos),
        }
    }

    /// Apply command-line flags, which win over every other layer.
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    pub fn log_summary(&self) {
        info!("Listening on {}:{}", self.host, self.port);
        info!(
            "Demos ({}): {}",
            self.registry.len(),
            self.registry.names().join(", ")
        );
        info!(
            "Kill grace {:?}, exit timeout {:?}",
            self.launch.kill_grace, self.session.exit_timeout
        );
    }
}
