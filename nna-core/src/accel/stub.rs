//! Deterministic software engine.
//!
//! Behaves like the hardware at the driver boundary (addresses, start,
//! a completion flag that needs polling) but computes its output with a
//! plain Rust function. Lets the whole protocol run without hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::accel::driver::{AcceleratorDriver, DeviceConfig};
use crate::encoder::OutputVector;
use crate::error::{NnaError, Result};
use crate::frame::NUM_CLASSES;

/// Bus address the stub reports for its input region.
const INPUT_BUS_ADDRESS: u64 = 0x1000_0000;
/// Bus address the stub reports for its output region.
const OUTPUT_BUS_ADDRESS: u64 = 0x1001_0000;

/// Base address of the first engine in the default device table.
pub const DEFAULT_BASE_ADDRESS: u64 = 0x43C0_0000;

type ModelFn = dyn Fn(&[i16], usize) -> OutputVector + Send + Sync;

/// What the stub computes from its input tensor.
#[derive(Clone)]
pub enum StubModel {
    /// Output `k` is the saturating sum of the `k`-th of `num_classes`
    /// equal contiguous bands of the input.
    BandSum,
    /// Every frame votes for one fixed class.
    Constant(usize),
    /// Caller-supplied function of `(input, num_classes)`.
    Custom(Arc<ModelFn>),
}

impl StubModel {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[i16], usize) -> OutputVector + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    fn evaluate(&self, input: &[i16], num_classes: usize) -> OutputVector {
        match self {
            Self::BandSum => {
                let band = input.len() / num_classes.max(1);
                (0..num_classes)
                    .map(|k| {
                        input
                            .iter()
                            .skip(k * band)
                            .take(band)
                            .fold(0i16, |acc, &v| acc.saturating_add(v))
                    })
                    .collect()
            }
            Self::Constant(class) => (0..num_classes)
                .map(|k| if k == *class { i16::MAX } else { 0 })
                .collect(),
            Self::Custom(f) => f(input, num_classes),
        }
    }
}

impl std::fmt::Debug for StubModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BandSum => write!(f, "BandSum"),
            Self::Constant(class) => write!(f, "Constant({class})"),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

// ── StubProbe ────────────────────────────────────────────────────

/// Counters observable after the driver has been boxed away.
#[derive(Debug, Clone, Default)]
pub struct StubProbe {
    initializations: Arc<AtomicU64>,
    starts: Arc<AtomicU64>,
}

impl StubProbe {
    pub fn initializations(&self) -> u64 {
        self.initializations.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::SeqCst)
    }
}

// ── StubDriver ───────────────────────────────────────────────────

/// Software stand-in for the compute engine.
#[derive(Debug)]
pub struct StubDriver {
    devices: Vec<DeviceConfig>,
    model: StubModel,
    num_classes: usize,
    /// Polls of `is_done` before completion; `None` never completes.
    latency_polls: Option<u32>,
    initialized: bool,
    input: Vec<i16>,
    output: OutputVector,
    input_address: u64,
    output_address: u64,
    running: bool,
    done: bool,
    polls: u32,
    probe: StubProbe,
}

impl StubDriver {
    /// A stub with one engine (device 0), the [`StubModel::BandSum`]
    /// model and immediate completion.
    pub fn new(num_classes: usize) -> Self {
        Self {
            devices: vec![DeviceConfig {
                device_id: 0,
                base_address: DEFAULT_BASE_ADDRESS,
            }],
            model: StubModel::BandSum,
            num_classes,
            latency_polls: Some(0),
            initialized: false,
            input: Vec::new(),
            output: Vec::new(),
            input_address: 0,
            output_address: 0,
            running: false,
            done: false,
            polls: 0,
            probe: StubProbe::default(),
        }
    }

    pub fn with_model(mut self, model: StubModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_devices(mut self, devices: Vec<DeviceConfig>) -> Self {
        self.devices = devices;
        self
    }

    /// Require `polls` unsuccessful completion polls per computation.
    pub fn with_latency_polls(mut self, polls: u32) -> Self {
        self.latency_polls = Some(polls);
        self
    }

    /// An engine that starts but never raises its done flag.
    pub fn never_completes(mut self) -> Self {
        self.latency_polls = None;
        self
    }

    pub fn probe(&self) -> StubProbe {
        self.probe.clone()
    }

    fn finish(&mut self) {
        self.output = self.model.evaluate(&self.input, self.num_classes);
        self.running = false;
        self.done = true;
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new(NUM_CLASSES)
    }
}

impl AcceleratorDriver for StubDriver {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn lookup_config(&self, device_id: u32) -> Option<DeviceConfig> {
        self.devices
            .iter()
            .find(|d| d.device_id == device_id)
            .cloned()
    }

    fn initialize(&mut self, _config: &DeviceConfig) -> Result<()> {
        self.running = false;
        self.done = false;
        self.polls = 0;
        self.initialized = true;
        self.probe.initializations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_input(&mut self, tensor: &[i16]) -> Result<u64> {
        if !self.initialized {
            return Err(NnaError::AcceleratorInit("stub engine not initialised".into()));
        }
        self.input.clear();
        self.input.extend_from_slice(tensor);
        Ok(INPUT_BUS_ADDRESS)
    }

    fn output_address(&self) -> u64 {
        OUTPUT_BUS_ADDRESS
    }

    fn set_input_address(&mut self, address: u64) {
        self.input_address = address;
    }

    fn set_output_address(&mut self, address: u64) {
        self.output_address = address;
    }

    fn start(&mut self) {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        self.running = true;
        self.done = false;
        self.polls = 0;
    }

    fn is_done(&mut self) -> bool {
        if self.running {
            match self.latency_polls {
                Some(latency) if self.polls >= latency => self.finish(),
                _ => self.polls = self.polls.saturating_add(1),
            }
        }
        self.done
    }

    fn read_output(&mut self, len: usize) -> Result<OutputVector> {
        if !self.done {
            return Err(NnaError::ProtocolViolation("output read before completion"));
        }
        if self.input_address != INPUT_BUS_ADDRESS || self.output_address != OUTPUT_BUS_ADDRESS {
            return Err(NnaError::ProtocolViolation("buffer addresses were not programmed"));
        }
        Ok(self.output.iter().copied().take(len).collect())
    }
}

// ── Tests ────────────────────────────────────────────────────────
