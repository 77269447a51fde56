use crate::application::connection_manager::ReconnectPolicy;
use crate::application::poller::DEFAULT_POLL_INTERVAL;
use crate::application::time_series_store::DEFAULT_CAPACITY;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub channel: ChannelSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl BackendSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChannelSettings {
    /// Defaults to the Socket.IO endpoint of `backend.base_url`
    pub url: Option<String>,
    pub connect_timeout_ms: u64,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 0 retries forever
    pub max_attempts: u32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_ms: 10_000,
            initial_delay_ms: 1_000,
            max_delay_ms: 5_000,
            max_attempts: 10,
        }
    }
}

impl ChannelSettings {
    pub fn resolve_url(&self, backend: &BackendSettings) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => socket_io_url(&backend.base_url),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    #[default]
    Terminal,
    Log,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorSettings {
    pub vials: Vec<u32>,
    pub capacity: usize,
    pub poll_interval_ms: u64,
    /// 0 redraws on every change
    pub redraw_interval_ms: u64,
    pub dedupe_timestamps: bool,
    pub surface: SurfaceKind,
    pub title: String,
    /// Where logs go while the terminal chart owns the screen
    pub log_file: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            vials: (1..=7).collect(),
            capacity: DEFAULT_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            redraw_interval_ms: 250,
            dedupe_timestamps: true,
            surface: SurfaceKind::Terminal,
            title: "Optical density".to_string(),
            log_file: "vial-monitor.log".to_string(),
        }
    }
}

impl MonitorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn redraw_interval(&self) -> Duration {
        Duration::from_millis(self.redraw_interval_ms)
    }

    /// Log file to use instead of stderr, which shares the terminal with
    /// the chart. `None` for the log surface.
    pub fn log_path(&self) -> Option<&str> {
        match self.surface {
            SurfaceKind::Terminal => Some(self.log_file.as_str()),
            SurfaceKind::Log => None,
        }
    }
}

/// `config/monitor.{toml,yaml,json}` if present, then `VIAL_MONITOR__*`
/// environment overrides, e.g. `VIAL_MONITOR__BACKEND__BASE_URL`.
pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/monitor").required(false))
        .add_source(
            config::Environment::with_prefix("VIAL_MONITOR")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("monitor.vials")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Engine.IO v4 WebSocket endpoint for an HTTP base URL.
pub fn socket_io_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/socket.io/?EIO=4&transport=websocket", ws)
}
