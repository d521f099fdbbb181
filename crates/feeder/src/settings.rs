use std::{net::SocketAddr, path::Path, time::Duration};

use anyhow::{bail, Context as _};
use deltabot_geom::Unit;
use deltabot_planner::PlannerConfig;
use deltabot_protocol::{Handshake, DEFAULT_GAIN};
use serde::{Deserialize, Serialize};

use crate::{connection::ConnectOptions, session::OnUnreachable, stream::StreamConfig};

/// Everything that can be tweaked about a run, loadable from a JSON file.
///
/// Missing fields take their default values, so `{}` is a valid settings file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub unit: Unit,
    /// Pen speed, in `unit`s per second.
    pub speed: f64,
    pub command_interval_ms: u64,
    pub resolution_scale: f64,
    /// Multiplier applied to the angles (in degrees) before they're sent.
    pub gain: f64,
    /// How long to wait after the first point, giving the arm time to get
    /// there before the rest of the drawing follows.
    pub priming_settle_ms: u64,
    /// Ask for confirmation before streaming the drawing.
    pub prompt: bool,
    pub on_unreachable: OnUnreachable,

    pub bridge_addr: SocketAddr,
    pub ready_poll_ms: u64,
    pub ready_timeout_ms: u64,
    /// How many times to try reconnecting to the bridge after a failed send.
    pub reconnect_attempts: u32,
    pub reconnect_interval_ms: u64,

    /// Start the bridge in the background if it isn't running yet.
    pub autostart_bridge: bool,
    pub serial_port: String,
    pub baud: u32,

    pub geometry: deltabot_geom::Config,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            unit: Unit::Millimeter,
            speed: 200.0,
            command_interval_ms: 5,
            resolution_scale: 1.0,
            gain: DEFAULT_GAIN,
            priming_settle_ms: 500,
            prompt: true,
            on_unreachable: OnUnreachable::Abort,
            bridge_addr: SocketAddr::from(([127, 0, 0, 1], 65432)),
            ready_poll_ms: 200,
            ready_timeout_ms: 5000,
            reconnect_attempts: 3,
            reconnect_interval_ms: 1000,
            autostart_bridge: true,
            serial_port: default_serial_port().to_owned(),
            baud: 115200,
            geometry: deltabot_geom::Config::default(),
        }
    }
}

fn default_serial_port() -> &'static str {
    if cfg!(windows) {
        "COM3"
    } else {
        "/dev/ttyUSB0"
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Settings> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open settings file {}", path.display()))?;
        let settings: Settings = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Rejects values that would make planning meaningless.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            bail!("speed must be positive, got {}", self.speed);
        }
        if self.command_interval_ms == 0 {
            bail!("command_interval_ms must be at least 1");
        }
        if !(self.resolution_scale.is_finite() && self.resolution_scale > 0.0) {
            bail!(
                "resolution_scale must be positive, got {}",
                self.resolution_scale
            );
        }
        Ok(())
    }

    pub fn planner(&self) -> PlannerConfig {
        PlannerConfig {
            speed: self.speed,
            command_interval: Duration::from_millis(self.command_interval_ms),
            resolution_scale: self.resolution_scale,
            ..PlannerConfig::default()
        }
    }

    pub fn stream(&self) -> StreamConfig {
        StreamConfig {
            command_interval: Duration::from_millis(self.command_interval_ms),
            priming_settle: Duration::from_millis(self.priming_settle_ms),
            ..StreamConfig::default()
        }
    }

    pub fn handshake(&self) -> Handshake {
        Handshake {
            poll_interval: Duration::from_millis(self.ready_poll_ms),
            timeout: Duration::from_millis(self.ready_timeout_ms),
        }
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            addr: self.bridge_addr,
            retry_interval: Duration::from_millis(self.reconnect_interval_ms),
            reconnect_attempts: self.reconnect_attempts,
            handshake: self.handshake(),
        }
    }

    /// Arguments for starting the bridge so that it agrees with these settings.
    pub fn bridge_args(&self) -> Vec<String> {
        vec![
            "--port".to_owned(),
            self.serial_port.clone(),
            "--baud".to_owned(),
            self.baud.to_string(),
            "--listen".to_owned(),
            self.bridge_addr.to_string(),
        ]
    }
}
