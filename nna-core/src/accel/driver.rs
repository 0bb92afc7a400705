//! The driver-level contract every accelerator backend fulfils.

use crate::encoder::OutputVector;
use crate::error::Result;

/// Static description of one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Identifier the engine is looked up by.
    pub device_id: u32,
    /// Physical base address of the engine's control registers.
    pub base_address: u64,
}

/// Register-level operations on one compute engine.
///
/// Implementations are driven exclusively by
/// [`AcceleratorProxy`](super::AcceleratorProxy), which serialises all
/// access; none of these calls block.
pub trait AcceleratorDriver: Send {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Find the configuration entry for `device_id`.
    fn lookup_config(&self, device_id: u32) -> Option<DeviceConfig>;

    /// Bring the engine up. May be called again to recover it.
    fn initialize(&mut self, config: &DeviceConfig) -> Result<()>;

    /// Place `tensor` in accelerator-visible memory and return its bus
    /// address.
    fn load_input(&mut self, tensor: &[i16]) -> Result<u64>;

    /// Bus address of the output region.
    fn output_address(&self) -> u64;

    fn set_input_address(&mut self, address: u64);

    fn set_output_address(&mut self, address: u64);

    /// Kick off one computation.
    fn start(&mut self);

    /// Completion flag.
    fn is_done(&mut self) -> bool;

    /// Copy `len` output values out of accelerator-visible memory.
    fn read_output(&mut self, len: usize) -> Result<OutputVector>;
}
