//! Wire codec for the classifier link.
//!
//! Inbound there is no framing beyond fragment size: every chunk a read
//! delivers is handed on as one fragment, exactly as it arrived.
//! Outbound every reply is a single byte.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::NnaError;
use crate::frame::ACK_BYTE;

/// One reply byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// A non-final fragment was accepted.
    Ack,
    /// The frame was classified; the signed class byte.
    Class(u8),
}

impl Reply {
    pub fn to_byte(self) -> u8 {
        match self {
            Reply::Ack => ACK_BYTE,
            Reply::Class(byte) => byte,
        }
    }
}

/// Codec pairing fragment delivery with single-byte replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct FragmentCodec;

impl Decoder for FragmentCodec {
    type Item = Bytes;
    type Error = NnaError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(src.split().freeze()))
    }
}

impl Encoder<Reply> for FragmentCodec {
    type Error = NnaError;

    fn encode(&mut self, item: Reply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(1);
        dst.put_u8(item.to_byte());
        Ok(())
    }
}
