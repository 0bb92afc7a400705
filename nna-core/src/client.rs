//! Client side of the classifier link.
//!
//! Streams one frame as `packet_count` packets, waits for the ack byte
//! after every packet but the last, then reads the class byte.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::decoder::encode_samples;
use crate::error::{NnaError, Result};
use crate::frame::{ACK_BYTE, FrameLayout};
use crate::network::ConnectionInfo;

/// Normalise 8-bit grayscale pixels to `[0, 1]` samples.
pub fn roi_to_samples(pixels: &[u8]) -> Vec<f32> {
    pixels.iter().map(|&p| f32::from(p) / 255.0).collect()
}

/// One persistent connection to a classifier server.
pub struct ClassifierClient<S = TcpStream> {
    stream: S,
    layout: FrameLayout,
}

impl ClassifierClient<TcpStream> {
    pub async fn connect(info: &ConnectionInfo) -> Result<Self> {
        Self::connect_with_layout(info, FrameLayout::default()).await
    }

    pub async fn connect_with_layout(info: &ConnectionInfo, layout: FrameLayout) -> Result<Self> {
        let stream = TcpStream::connect(info.to_string()).await?;
        stream.set_nodelay(true)?;
        debug!(server = %info, "connected");
        Ok(Self::new(stream, layout))
    }
}

impl<S> ClassifierClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, layout: FrameLayout) -> Self {
        Self { stream, layout }
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Classify one frame of samples; returns the class byte.
    pub async fn classify(&mut self, samples: &[f32]) -> Result<u8> {
        if samples.len() != self.layout.sample_count() {
            return Err(NnaError::InvalidFrameLength {
                expected: self.layout.sample_count(),
                actual: samples.len(),
            });
        }
        self.send_frame(&encode_samples(samples)).await
    }

    /// Classify one region of interest of 8-bit pixels.
    pub async fn classify_roi(&mut self, pixels: &[u8]) -> Result<u8> {
        self.classify(&roi_to_samples(pixels)).await
    }

    /// Send an already encoded frame; returns the class byte.
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<u8> {
        if frame.len() != self.layout.total_bytes() {
            return Err(NnaError::InvalidFrameLength {
                expected: self.layout.total_bytes(),
                actual: frame.len(),
            });
        }

        let count = self.layout.packet_count();
        for (i, packet) in frame.chunks(self.layout.packet_bytes()).enumerate() {
            self.stream.write_all(packet).await?;
            self.stream.flush().await?;
            trace!(packet = i + 1, of = count, "packet sent");

            if i + 1 < count {
                let ack = self.read_byte().await?;
                if ack != ACK_BYTE {
                    return Err(NnaError::ProtocolViolation("unexpected acknowledgement byte"));
                }
            }
        }

        let class = self.read_byte().await?;
        debug!(class = class as i8, "classification received");
        Ok(class)
    }

    async fn read_byte(&mut self) -> Result<u8> {
        match self.stream.read_u8().await {
            Ok(byte) => Ok(byte),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(NnaError::ConnectionClosed)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn small_layout() -> FrameLayout {
        FrameLayout::new(8, 2).unwrap()
    }

    #[test]
    fn roi_normalisation() {
        let samples = roi_to_samples(&[0, 51, 255]);
        assert_eq!(samples, vec![0.0, 0.2, 1.0]);
    }

    #[tokio::test]
    async fn sends_packets_and_reads_class() {
        let frame = encode_samples(&[1.0, 2.0, 3.0, 4.0]);
        let mock = Builder::new()
            .write(&frame[..8])
            .read(b"s")
            .write(&frame[8..])
            .read(&[6])
            .build();
        let mut client = ClassifierClient::new(mock, small_layout());
        assert_eq!(client.classify(&[1.0, 2.0, 3.0, 4.0]).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn wrong_ack_is_a_protocol_violation() {
        let frame = encode_samples(&[0.0; 4]);
        let mock = Builder::new().write(&frame[..8]).read(&[0x01]).build();
        let mut client = ClassifierClient::new(mock, small_layout());
        assert!(matches!(
            client.send_frame(&frame).await,
            Err(NnaError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn closed_before_result() {
        let frame = encode_samples(&[0.0; 4]);
        let mock = Builder::new()
            .write(&frame[..8])
            .read(b"s")
            .write(&frame[8..])
            .build();
        let mut client = ClassifierClient::new(mock, small_layout());
        assert!(matches!(
            client.send_frame(&frame).await,
            Err(NnaError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn rejects_wrong_sample_count() {
        let mock = Builder::new().build();
        let mut client = ClassifierClient::new(mock, small_layout());
        assert!(matches!(
            client.classify(&[0.0; 3]).await,
            Err(NnaError::InvalidFrameLength {
                expected: 4,
                actual: 3
            })
        ));
    }
}
