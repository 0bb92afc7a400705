//! Configuration for the classifier server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nna_core::{
    AcceleratorConfig, AcceleratorDriver, DEFAULT_PORT, DeviceConfig, FrameLayout, MmioConfig,
    MmioDriver, NUM_CLASSES, NnaError, PACKET_BYTES, PACKET_COUNT, ResultEncoder, SCALE,
    SessionConfig, StubDriver,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener settings.
    pub network: NetworkConfig,
    /// Frame geometry and fixed-point parameters.
    pub frame: FrameConfig,
    /// Engine selection and timing.
    pub accelerator: AcceleratorSettings,
    /// Software engine tuning.
    pub stub: StubSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the listener on.
    pub bind_address: String,
    /// TCP port to listen on.
    pub port: u16,
    /// Maximum concurrent sessions. Extra connections are closed.
    pub max_connections: u32,
}

/// Frame configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Size of one fragment in bytes.
    pub packet_bytes: usize,
    /// Fragments per frame.
    pub packet_count: usize,
    /// Fixed-point scale for samples and outputs.
    pub scale: f32,
    /// Length of the engine's output vector.
    pub num_classes: usize,
}

/// Which engine backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Deterministic software engine.
    Stub,
    /// Memory-mapped hardware engine.
    Mmio,
}

/// Accelerator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceleratorSettings {
    pub backend: Backend,
    /// Engine to look up in the device table.
    pub device_id: u32,
    /// Upper bound on one computation in milliseconds.
    pub timeout_ms: u64,
    /// Interval between done-flag polls in microseconds.
    pub poll_interval_us: u64,
    /// Device table.
    pub devices: Vec<DeviceEntry>,
    /// Register map and DMA window for the `mmio` backend.
    pub mmio: MmioSettings,
}

/// One entry of the device table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub device_id: u32,
    pub base_address: u64,
}

/// Register map and DMA window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MmioSettings {
    pub register_device: PathBuf,
    pub register_span: usize,
    pub dma_device: PathBuf,
    pub dma_map_offset: u64,
    pub dma_phys_address: u64,
    pub dma_len: usize,
    pub ctrl_offset: usize,
    pub input_offset: usize,
    pub output_offset: usize,
}

/// Software engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StubSettings {
    /// `is_done` polls that report busy before completion.
    pub latency_polls: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            max_connections: 1,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            packet_bytes: PACKET_BYTES,
            packet_count: PACKET_COUNT,
            scale: SCALE,
            num_classes: NUM_CLASSES,
        }
    }
}

impl Default for AcceleratorSettings {
    fn default() -> Self {
        let mmio = MmioConfig::default();
        Self {
            backend: Backend::Stub,
            device_id: 0,
            timeout_ms: 5000,
            poll_interval_us: 50,
            devices: mmio
                .devices
                .iter()
                .map(|d| DeviceEntry {
                    device_id: d.device_id,
                    base_address: d.base_address,
                })
                .collect(),
            mmio: MmioSettings::default(),
        }
    }
}

impl Default for MmioSettings {
    fn default() -> Self {
        let mmio = MmioConfig::default();
        Self {
            register_device: mmio.register_device,
            register_span: mmio.register_span,
            dma_device: mmio.dma_device,
            dma_map_offset: mmio.dma_map_offset,
            dma_phys_address: mmio.dma_phys_address,
            dma_len: mmio.dma_len,
            ctrl_offset: mmio.ctrl_offset,
            input_offset: mmio.input_offset,
            output_offset: mmio.output_offset,
        }
    }
}

impl Default for StubSettings {
    fn default() -> Self {
        Self { latency_polls: 2 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stub => write!(f, "stub"),
            Self::Mmio => write!(f, "mmio"),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = Self::default_toml().map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// The default configuration rendered as TOML.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }

    /// Address string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.network.bind_address, self.network.port)
    }

    /// Convert frame settings into a `SessionConfig`, rejecting a layout
    /// or class count no session could be built from.
    pub fn to_session_config(&self) -> nna_core::Result<SessionConfig> {
        let scale = if self.frame.scale.is_finite() && self.frame.scale > 0.0 {
            self.frame.scale
        } else {
            SCALE
        };
        ResultEncoder::new(scale, self.frame.num_classes)?;
        Ok(SessionConfig {
            layout: FrameLayout::new(self.frame.packet_bytes, self.frame.packet_count)?,
            scale,
            num_classes: self.frame.num_classes,
        })
    }

    /// Convert accelerator settings into an `AcceleratorConfig`.
    pub fn to_accelerator_config(&self) -> AcceleratorConfig {
        AcceleratorConfig {
            device_id: self.accelerator.device_id,
            output_len: self.frame.num_classes,
            timeout: Duration::from_millis(self.accelerator.timeout_ms.max(1)),
            poll_interval: Duration::from_micros(self.accelerator.poll_interval_us.max(1)),
        }
    }

    /// Device table as the core's `DeviceConfig` list.
    pub fn device_table(&self) -> Vec<DeviceConfig> {
        self.accelerator
            .devices
            .iter()
            .map(|d| DeviceConfig {
                device_id: d.device_id,
                base_address: d.base_address,
            })
            .collect()
    }

    /// Register map and DMA window as an `MmioConfig`.
    pub fn to_mmio_config(&self) -> MmioConfig {
        let m = &self.accelerator.mmio;
        MmioConfig {
            devices: self.device_table(),
            register_device: m.register_device.clone(),
            register_span: m.register_span,
            dma_device: m.dma_device.clone(),
            dma_map_offset: m.dma_map_offset,
            dma_phys_address: m.dma_phys_address,
            dma_len: m.dma_len,
            ctrl_offset: m.ctrl_offset,
            input_offset: m.input_offset,
            output_offset: m.output_offset,
        }
    }

    /// Instantiate the configured backend. Nothing is touched until the
    /// proxy initialises it.
    pub fn build_driver(&self) -> nna_core::Result<Box<dyn AcceleratorDriver>> {
        match self.accelerator.backend {
            Backend::Stub => Ok(Box::new(
                StubDriver::new(self.frame.num_classes)
                    .with_devices(self.device_table())
                    .with_latency_polls(self.stub.latency_polls),
            )),
            Backend::Mmio => {
                let config = self.to_mmio_config();
                config.validate()?;
                Ok(Box::new(MmioDriver::new(config)))
            }
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document without falling back to defaults.
    pub fn from_toml(text: &str) -> nna_core::Result<Self> {
        toml::from_str(text).map_err(|e| NnaError::Config(e.to_string()))
    }
}

// ── Tests ────────────────────────────────────────────────────────
