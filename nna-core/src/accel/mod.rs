//! # Accelerator boundary
//!
//! ```text
//!  Tensor ──► AcceleratorProxy::submit ──► AcceleratorDriver
//!                 │                          load_input
//!                 │                          set_input_address / set_output_address
//!                 │                          start
//!                 │  poll is_done (interval, ◄─ is_done
//!                 │  bounded by a timeout)
//!                 ▼                          read_output
//!            OutputVector
//! ```
//!
//! | Module   | Purpose                                                   |
//! |----------|-----------------------------------------------------------|
//! | `driver` | The narrow driver trait and device configuration          |
//! | `stub`   | Deterministic software engine for tests and bench setups  |
//! | `mmio`   | HLS engine behind memory-mapped AXI-Lite registers (unix) |
//! | `proxy`  | Configure-once handle with async, time-bounded submission |

pub mod driver;
pub mod mmio;
pub mod proxy;
pub mod stub;

// ── Re-exports ───────────────────────────────────────────────────

pub use driver::{AcceleratorDriver, DeviceConfig};
pub use mmio::{MmioConfig, MmioDriver};
pub use proxy::{AcceleratorConfig, AcceleratorProxy, SharedAccelerator};
pub use stub::{StubDriver, StubModel, StubProbe};
