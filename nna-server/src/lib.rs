//! # nna-server
//!
//! Accepts TCP connections, reassembles each connection's fragments
//! into image frames, classifies every complete frame on the shared
//! accelerator and answers with the class byte.
//!
//! ## Backends
//!
//! - **stub**: deterministic software engine, no hardware needed.
//! - **mmio**: memory-mapped engine behind `/dev/mem`.

pub mod config;
pub mod service;
