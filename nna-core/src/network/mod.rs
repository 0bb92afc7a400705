//! Transport boundary between sessions and the byte-stream layer.

pub mod transport;

pub use transport::{ConnectionInfo, FragmentTransport, StreamTransport, TcpTransport};
