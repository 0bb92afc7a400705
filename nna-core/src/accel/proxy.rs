//! Configure-once accelerator handle.
//!
//! Submission is asynchronous: the proxy programs the engine, then
//! polls its done flag on a Tokio interval, so the runtime keeps
//! serving other connections while a frame computes. The wait is
//! bounded by [`AcceleratorConfig::timeout`]; an engine that never
//! completes costs one frame, not the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::accel::driver::{AcceleratorDriver, DeviceConfig};
use crate::encoder::OutputVector;
use crate::error::{NnaError, Result};
use crate::frame::NUM_CLASSES;

/// Accelerator shared by every session. The mutex serialises frames so
/// the engine never runs two computations at once.
pub type SharedAccelerator = Arc<Mutex<AcceleratorProxy>>;

// ── AcceleratorConfig ────────────────────────────────────────────

/// Configuration for [`AcceleratorProxy`].
#[derive(Debug, Clone)]
pub struct AcceleratorConfig {
    /// Engine to look up in the driver's device table.
    pub device_id: u32,
    /// Expected length of the output vector.
    pub output_len: usize,
    /// Upper bound on one computation.
    pub timeout: Duration,
    /// Interval between done-flag polls.
    pub poll_interval: Duration,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            output_len: NUM_CLASSES,
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_micros(50),
        }
    }
}

// ── AcceleratorProxy ─────────────────────────────────────────────

/// A configured engine instance.
pub struct AcceleratorProxy {
    driver: Box<dyn AcceleratorDriver>,
    device: DeviceConfig,
    config: AcceleratorConfig,
    /// Set after a timeout; the engine is re-initialised before reuse.
    stale: bool,
    completed: u64,
}

impl AcceleratorProxy {
    /// Look the device up and initialise it.
    pub fn configure(
        mut driver: Box<dyn AcceleratorDriver>,
        config: AcceleratorConfig,
    ) -> Result<Self> {
        let device = driver
            .lookup_config(config.device_id)
            .ok_or(NnaError::AcceleratorLookup {
                device_id: config.device_id,
            })?;

        driver.initialize(&device).map_err(into_init_error)?;
        info!(
            backend = driver.name(),
            device = device.device_id,
            base = format_args!("{:#x}", device.base_address),
            "accelerator configured"
        );

        Ok(Self {
            driver,
            device,
            config,
            stale: false,
            completed: 0,
        })
    }

    /// Wrap into the shared, serialised form used by the server.
    pub fn into_shared(self) -> SharedAccelerator {
        Arc::new(Mutex::new(self))
    }

    /// Run one computation.
    pub async fn submit(&mut self, tensor: &[i16]) -> Result<OutputVector> {
        if self.stale {
            debug!(device = self.device.device_id, "re-initialising engine");
            self.driver.initialize(&self.device).map_err(into_init_error)?;
            self.stale = false;
        }

        let input = self.driver.load_input(tensor)?;
        let output = self.driver.output_address();
        self.driver.set_input_address(input);
        self.driver.set_output_address(output);
        self.driver.start();

        let timeout = self.config.timeout;
        if tokio::time::timeout(timeout, self.wait_done()).await.is_err() {
            warn!(device = self.device.device_id, ?timeout, "accelerator did not complete");
            self.stale = true;
            return Err(NnaError::AcceleratorTimeout(timeout));
        }

        let result = self.driver.read_output(self.config.output_len)?;
        if result.len() != self.config.output_len {
            return Err(NnaError::OutputLength {
                expected: self.config.output_len,
                actual: result.len(),
            });
        }
        self.completed += 1;
        Ok(result)
    }

    /// Resolves once the driver raises its done flag.
    async fn wait_done(&mut self) {
        // `interval` rejects a zero period.
        let period = self.config.poll_interval.max(Duration::from_micros(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.driver.is_done() {
                return;
            }
        }
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn backend(&self) -> &'static str {
        self.driver.name()
    }

    pub fn config(&self) -> &AcceleratorConfig {
        &self.config
    }

    /// Computations finished since configuration.
    pub fn completed(&self) -> u64 {
        self.completed
    }
}

impl std::fmt::Debug for AcceleratorProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceleratorProxy")
            .field("backend", &self.driver.name())
            .field("device", &self.device)
            .field("config", &self.config)
            .field("stale", &self.stale)
            .finish()
    }
}

fn into_init_error(e: NnaError) -> NnaError {
    match e {
        NnaError::AcceleratorInit(_) => e,
        other => NnaError::AcceleratorInit(other.to_string()),
    }
}

// ── Tests ────────────────────────────────────────────────────────
