//! # nna-core
//!
//! Core library for the NNA classifier link.
//!
//! This crate contains:
//! - **Frame**: `FrameLayout` and the wire constants of one image frame
//! - **Reassembly**: `Reassembler` collecting fixed-size fragments into a frame
//! - **Decoder**: `SampleDecoder` turning little-endian `f32` samples into `i16` fixed point
//! - **Encoder**: `ResultEncoder` reducing an output vector to its argmax class
//! - **Accelerator**: `AcceleratorDriver` backends (MMIO and stub) behind `AcceleratorProxy`
//! - **Codec / Network**: `FragmentCodec` and `FragmentTransport` over TCP
//! - **Session**: `Session` driving one connection through the protocol
//! - **Client**: `ClassifierClient` for the sending side
//! - **Error**: `NnaError`, typed, `thiserror`-based error hierarchy

pub mod accel;
pub mod client;
pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod network;
pub mod reassembly;
pub mod session;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use accel::{
    AcceleratorConfig, AcceleratorDriver, AcceleratorProxy, DeviceConfig, MmioConfig,
    MmioDriver, SharedAccelerator, StubDriver, StubModel, StubProbe,
};
pub use client::{ClassifierClient, roi_to_samples};
pub use codec::{FragmentCodec, Reply};
pub use decoder::{SampleDecoder, Tensor, encode_samples};
pub use encoder::{ClassIndex, OutputVector, ResultEncoder, argmax};
pub use error::{NnaError, Result};
pub use frame::{
    ACK_BYTE, DEFAULT_PORT, FrameLayout, INPUT_SIDE, NUM_CLASSES, PACKET_BYTES, PACKET_COUNT,
    SAMPLE_BYTES, SAMPLE_COUNT, SCALE, TOTAL_BYTES,
};
pub use network::{ConnectionInfo, FragmentTransport, StreamTransport, TcpTransport};
pub use reassembly::{Ingest, Reassembler};
pub use session::{Outcome, Session, SessionConfig, SessionId};
pub use state::SessionPhase;
