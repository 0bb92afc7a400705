//! HLS compute engine behind memory-mapped AXI-Lite registers.
//!
//! The engine's control block and a physically contiguous DMA window
//! are mapped into the process with `memmap2`:
//!
//! ```text
//!  register window (base_address)        DMA window (dma_phys_address)
//!  ┌──────────────┬──────────────┐       ┌────────────────┬───────────────┐
//!  │ 0x00 ctrl    │ ap_start b0  │       │ input tensor   │ output vector │
//!  │              │ ap_done  b1  │       │ (first half)   │ (second half) │
//!  │ 0x10 input   │ bus address  │       └────────────────┴───────────────┘
//!  │ 0x18 output  │ bus address  │
//!  └──────────────┴──────────────┘
//! ```
//!
//! Memory visibility is scoped to the two windows: both are opened with
//! `O_SYNC`, which maps device memory uncached, and a fence orders the
//! tensor writes before `ap_start` and the output reads after `ap_done`.
//! Nothing else in the process loses its caching.
//!
//! # Platform
//!
//! Unix only. On other platforms the driver is still defined but
//! initialisation fails at runtime.

use std::path::PathBuf;

use crate::accel::driver::{AcceleratorDriver, DeviceConfig};
use crate::accel::stub::DEFAULT_BASE_ADDRESS;
use crate::encoder::OutputVector;
use crate::error::{NnaError, Result};

/// `ap_start` bit of the control register.
pub const AP_START: u32 = 1 << 0;
/// `ap_done` bit of the control register.
pub const AP_DONE: u32 = 1 << 1;

// ── MmioConfig ───────────────────────────────────────────────────

/// Where the engine's registers and buffers live.
#[derive(Debug, Clone)]
pub struct MmioConfig {
    /// Device table searched by `lookup_config`.
    pub devices: Vec<DeviceConfig>,
    /// Character device the register window is mapped from.
    pub register_device: PathBuf,
    /// Length of the register window in bytes.
    pub register_span: usize,
    /// Character device the DMA window is mapped from.
    pub dma_device: PathBuf,
    /// Offset passed to `mmap` for the DMA window.
    pub dma_map_offset: u64,
    /// Address of the DMA window as seen by the engine.
    pub dma_phys_address: u64,
    /// Length of the DMA window in bytes.
    pub dma_len: usize,
    /// Control register offset.
    pub ctrl_offset: usize,
    /// Input address register offset.
    pub input_offset: usize,
    /// Output address register offset.
    pub output_offset: usize,
}

impl Default for MmioConfig {
    fn default() -> Self {
        Self {
            devices: vec![DeviceConfig {
                device_id: 0,
                base_address: DEFAULT_BASE_ADDRESS,
            }],
            register_device: PathBuf::from("/dev/mem"),
            register_span: 0x1_0000,
            dma_device: PathBuf::from("/dev/mem"),
            dma_map_offset: 0x1F00_0000,
            dma_phys_address: 0x1F00_0000,
            dma_len: 0x1_0000,
            ctrl_offset: 0x00,
            input_offset: 0x10,
            output_offset: 0x18,
        }
    }
}

impl MmioConfig {
    /// Check offsets and address widths before touching any device.
    pub fn validate(&self) -> Result<()> {
        for offset in [self.ctrl_offset, self.input_offset, self.output_offset] {
            if offset % 4 != 0 || offset + 4 > self.register_span {
                return Err(NnaError::AcceleratorInit(format!(
                    "register offset {offset:#x} outside a {:#x}-byte window",
                    self.register_span
                )));
            }
        }
        if self.dma_len < 4 {
            return Err(NnaError::AcceleratorInit("DMA window too small".into()));
        }
        // The engine's address registers are 32 bits wide.
        let end = self.dma_phys_address.saturating_add(self.dma_len as u64);
        if end > u64::from(u32::MAX) + 1 {
            return Err(NnaError::AcceleratorInit(
                "DMA window must sit below 4 GiB".into(),
            ));
        }
        Ok(())
    }

    /// Offset of the output region inside the DMA window.
    fn output_region(&self) -> usize {
        self.dma_len / 2
    }
}

// ── MmioDriver ───────────────────────────────────────────────────

/// Register-level driver for one memory-mapped engine.
pub struct MmioDriver {
    config: MmioConfig,
    #[cfg(unix)]
    regs: Option<memmap2::MmapMut>,
    #[cfg(unix)]
    dma: Option<memmap2::MmapMut>,
}

impl MmioDriver {
    pub fn new(config: MmioConfig) -> Self {
        Self {
            config,
            #[cfg(unix)]
            regs: None,
            #[cfg(unix)]
            dma: None,
        }
    }

    pub fn config(&self) -> &MmioConfig {
        &self.config
    }
}

impl std::fmt::Debug for MmioDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmioDriver")
            .field("config", &self.config)
            .finish()
    }
}

// ── Unix implementation ──────────────────────────────────────────

#[cfg(unix)]
mod platform {
    use std::fs::OpenOptions;
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::Path;
    use std::sync::atomic::{Ordering, fence};

    use memmap2::{MmapMut, MmapOptions};
    use tracing::debug;

    use super::*;

    fn map_window(path: &Path, offset: u64, len: usize) -> Result<MmapMut> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)
            .map_err(|e| NnaError::AcceleratorInit(format!("open {}: {e}", path.display())))?;

        // SAFETY: the mapping covers device memory owned by this driver
        // for its whole lifetime; nothing else in the process maps it.
        unsafe { MmapOptions::new().offset(offset).len(len).map_mut(&file) }.map_err(|e| {
            NnaError::AcceleratorInit(format!(
                "map {:#x}+{len:#x} of {}: {e}",
                offset,
                path.display()
            ))
        })
    }

    impl MmioDriver {
        fn write_reg(&mut self, offset: usize, value: u32) {
            if let Some(regs) = self.regs.as_mut() {
                // SAFETY: `validate` keeps `offset` 4-byte aligned and
                // inside the page-aligned window.
                unsafe { regs.as_mut_ptr().add(offset).cast::<u32>().write_volatile(value) }
            }
        }

        fn read_reg(&self, offset: usize) -> u32 {
            match self.regs.as_ref() {
                // SAFETY: see `write_reg`.
                Some(regs) => unsafe { regs.as_ptr().add(offset).cast::<u32>().read_volatile() },
                None => 0,
            }
        }
    }

    impl AcceleratorDriver for MmioDriver {
        fn name(&self) -> &'static str {
            "mmio"
        }

        fn lookup_config(&self, device_id: u32) -> Option<DeviceConfig> {
            self.config
                .devices
                .iter()
                .find(|d| d.device_id == device_id)
                .cloned()
        }

        fn initialize(&mut self, device: &DeviceConfig) -> Result<()> {
            self.config.validate()?;

            // Drop any previous mapping before remapping.
            self.regs = None;
            self.dma = None;

            let regs = map_window(
                &self.config.register_device,
                device.base_address,
                self.config.register_span,
            )?;
            let dma = map_window(
                &self.config.dma_device,
                self.config.dma_map_offset,
                self.config.dma_len,
            )?;
            debug!(
                device = device.device_id,
                base = format_args!("{:#x}", device.base_address),
                dma = format_args!("{:#x}", self.config.dma_phys_address),
                "engine windows mapped"
            );

            self.regs = Some(regs);
            self.dma = Some(dma);
            Ok(())
        }

        fn load_input(&mut self, tensor: &[i16]) -> Result<u64> {
            let capacity = self.config.output_region();
            let dma = self
                .dma
                .as_mut()
                .ok_or_else(|| NnaError::AcceleratorInit("engine not initialised".into()))?;

            let bytes = tensor.len() * 2;
            if bytes > capacity {
                return Err(NnaError::AllocationFailure { bytes });
            }
            for (dst, value) in dma[..bytes].chunks_exact_mut(2).zip(tensor) {
                dst.copy_from_slice(&value.to_le_bytes());
            }
            fence(Ordering::SeqCst);

            Ok(self.config.dma_phys_address)
        }

        fn output_address(&self) -> u64 {
            self.config.dma_phys_address + self.config.output_region() as u64
        }

        fn set_input_address(&mut self, address: u64) {
            self.write_reg(self.config.input_offset, address as u32);
        }

        fn set_output_address(&mut self, address: u64) {
            self.write_reg(self.config.output_offset, address as u32);
        }

        fn start(&mut self) {
            fence(Ordering::SeqCst);
            self.write_reg(self.config.ctrl_offset, AP_START);
        }

        fn is_done(&mut self) -> bool {
            self.read_reg(self.config.ctrl_offset) & AP_DONE != 0
        }

        fn read_output(&mut self, len: usize) -> Result<OutputVector> {
            fence(Ordering::SeqCst);
            let start = self.config.output_region();
            let dma = self
                .dma
                .as_ref()
                .ok_or_else(|| NnaError::AcceleratorInit("engine not initialised".into()))?;

            let bytes = len * 2;
            if start + bytes > dma.len() {
                return Err(NnaError::OutputLength {
                    expected: len,
                    actual: (dma.len() - start) / 2,
                });
            }
            Ok(dma[start..start + bytes]
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect())
        }
    }
}

// ── Non-unix stub ────────────────────────────────────────────────

#[cfg(not(unix))]
impl AcceleratorDriver for MmioDriver {
    fn name(&self) -> &'static str {
        "mmio"
    }

    fn lookup_config(&self, device_id: u32) -> Option<DeviceConfig> {
        self.config
            .devices
            .iter()
            .find(|d| d.device_id == device_id)
            .cloned()
    }

    /// Memory-mapped engines are only reachable from unix hosts.
    fn initialize(&mut self, _device: &DeviceConfig) -> Result<()> {
        Err(NnaError::AcceleratorInit(
            "memory-mapped accelerators require a unix host".into(),
        ))
    }

    fn load_input(&mut self, _tensor: &[i16]) -> Result<u64> {
        Err(NnaError::Other("Not supported on this platform".into()))
    }

    fn output_address(&self) -> u64 {
        0
    }

    fn set_input_address(&mut self, _address: u64) {}

    fn set_output_address(&mut self, _address: u64) {}

    fn start(&mut self) {}

    fn is_done(&mut self) -> bool {
        false
    }

    fn read_output(&mut self, _len: usize) -> Result<OutputVector> {
        Err(NnaError::Other("Not supported on this platform".into()))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(all(test, unix))]
mod tests {
    use std::fs::OpenOptions;
    use std::path::Path;

    use memmap2::MmapOptions;

    use super::*;

    const PAGE: usize = 4096;

    /// Back both windows with plain files so the register protocol can
    /// be exercised without hardware.
    fn file_backed(dir: &Path) -> MmioConfig {
        let regs = dir.join("regs");
        let dma = dir.join("dma");
        std::fs::write(&regs, vec![0u8; PAGE]).unwrap();
        std::fs::write(&dma, vec![0u8; PAGE]).unwrap();
        MmioConfig {
            devices: vec![DeviceConfig {
                device_id: 0,
                base_address: 0,
            }],
            register_device: regs,
            register_span: PAGE,
            dma_device: dma,
            dma_map_offset: 0,
            dma_phys_address: 0x1000_0000,
            dma_len: PAGE,
            ..MmioConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        MmioConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_misaligned_register_offset() {
        let config = MmioConfig {
            input_offset: 0x11,
            ..MmioConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(NnaError::AcceleratorInit(_))
        ));
    }

    #[test]
    fn rejects_dma_above_32_bits() {
        let config = MmioConfig {
            dma_phys_address: 0xFFFF_F000,
            dma_len: 0x2000,
            ..MmioConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_device_fails_initialisation() {
        let mut driver = MmioDriver::new(MmioConfig {
            register_device: PathBuf::from("/nonexistent/nna-regs"),
            ..MmioConfig::default()
        });
        let device = driver.lookup_config(0).unwrap();
        assert!(matches!(
            driver.initialize(&device),
            Err(NnaError::AcceleratorInit(_))
        ));
    }

    #[test]
    fn register_protocol_over_file_windows() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_backed(dir.path());
        let mut driver = MmioDriver::new(config.clone());
        let device = driver.lookup_config(0).unwrap();
        driver.initialize(&device).unwrap();

        let input = driver.load_input(&[1, -2, 300]).unwrap();
        assert_eq!(input, 0x1000_0000);
        let output = driver.output_address();
        assert_eq!(output, 0x1000_0000 + (PAGE / 2) as u64);

        driver.set_input_address(input);
        driver.set_output_address(output);
        driver.start();
        assert!(!driver.is_done());

        // Play the engine: inspect registers, write output, raise done.
        let regs_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.register_device)
            .unwrap();
        let dma_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.dma_device)
            .unwrap();
        let mut regs = unsafe { MmapOptions::new().len(PAGE).map_mut(&regs_file).unwrap() };
        let mut dma = unsafe { MmapOptions::new().len(PAGE).map_mut(&dma_file).unwrap() };

        let reg = |m: &[u8], off: usize| u32::from_le_bytes(m[off..off + 4].try_into().unwrap());
        assert_eq!(reg(&regs[..], 0x00), AP_START);
        assert_eq!(reg(&regs[..], 0x10), 0x1000_0000);
        assert_eq!(reg(&regs[..], 0x18), 0x1000_0000 + (PAGE / 2) as u32);
        assert_eq!(&dma[..6], &[1, 0, 0xFE, 0xFF, 0x2C, 0x01]);

        dma[PAGE / 2..PAGE / 2 + 4].copy_from_slice(&[7, 0, 0xF9, 0xFF]);
        regs[0..4].copy_from_slice(&AP_DONE.to_le_bytes());

        assert!(driver.is_done());
        assert_eq!(driver.read_output(2).unwrap(), vec![7, -7]);
    }

    #[test]
    fn oversized_tensor_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = MmioDriver::new(file_backed(dir.path()));
        let device = driver.lookup_config(0).unwrap();
        driver.initialize(&device).unwrap();

        let tensor = vec![0i16; PAGE];
        assert!(matches!(
            driver.load_input(&tensor),
            Err(NnaError::AllocationFailure { .. })
        ));
    }
}
