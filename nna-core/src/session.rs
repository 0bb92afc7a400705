//! Session protocol handler.
//!
//! One [`Session`] per connection owns the reassembly state for that
//! connection, so concurrent connections never interleave into the same
//! frame. Per inbound fragment:
//!
//! ```text
//!  fragment ──► Reassembler
//!                 ├─ Incomplete, accepted ──► reply Ack ─────────────┐
//!                 ├─ Incomplete, discarded ──► (no reply) ───────────┤
//!                 └─ Complete ──► Dispatching                        │
//!                                  decode → accelerator → argmax     │
//!                                  reply Class ──► Receiving ────────┤
//!                                                                    ▼
//!                                              acknowledge_consumed(len)
//! ```
//!
//! Nothing is ever reported to the peer as an error. A frame whose
//! pipeline fails is dropped and the peer simply gets no result byte.

use tracing::{debug, info, warn};

use crate::accel::SharedAccelerator;
use crate::codec::Reply;
use crate::decoder::SampleDecoder;
use crate::encoder::{ClassIndex, ResultEncoder};
use crate::error::{NnaError, Result};
use crate::frame::{FrameLayout, NUM_CLASSES, SCALE};
use crate::network::FragmentTransport;
use crate::reassembly::{Ingest, Reassembler};
use crate::state::SessionPhase;

/// Identity of one connection's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── SessionConfig ────────────────────────────────────────────────

/// Per-session pipeline parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub layout: FrameLayout,
    /// Fixed-point scale shared by input and output.
    pub scale: f32,
    pub num_classes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            layout: FrameLayout::default(),
            scale: SCALE,
            num_classes: NUM_CLASSES,
        }
    }
}

/// What one inbound fragment led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Accepted; an ack byte was sent.
    Acknowledged,
    /// Wrong size; dropped without a reply.
    Discarded,
    /// Completed a frame that was classified and answered.
    Classified(ClassIndex),
    /// Completed a frame whose pipeline failed; no reply.
    Abandoned,
}

// ── Session ──────────────────────────────────────────────────────

/// Protocol handler for one connection.
pub struct Session {
    id: SessionId,
    phase: SessionPhase,
    reassembler: Reassembler,
    decoder: SampleDecoder,
    encoder: ResultEncoder,
    accelerator: SharedAccelerator,
    frames: u64,
}

impl Session {
    pub fn new(
        id: SessionId,
        config: &SessionConfig,
        accelerator: SharedAccelerator,
    ) -> Result<Self> {
        Ok(Self {
            id,
            phase: SessionPhase::default(),
            reassembler: Reassembler::new(config.layout)?,
            decoder: SampleDecoder::new(config.scale),
            encoder: ResultEncoder::new(config.scale, config.num_classes)?,
            accelerator,
            frames: 0,
        })
    }

    /// Drive the session until the peer closes.
    pub async fn run<T>(&mut self, transport: &mut T) -> Result<()>
    where
        T: FragmentTransport + ?Sized,
    {
        loop {
            match transport.recv_fragment().await {
                Ok(Some(fragment)) => {
                    self.on_data(&fragment, transport).await?;
                }
                Ok(None) => {
                    self.on_closed();
                    return Ok(());
                }
                Err(e) => {
                    self.on_closed();
                    return Err(e);
                }
            }
        }
    }

    /// Handle one inbound fragment.
    pub async fn on_data<T>(&mut self, payload: &[u8], transport: &mut T) -> Result<Outcome>
    where
        T: FragmentTransport + ?Sized,
    {
        if self.phase.is_closed() {
            return Err(NnaError::ProtocolViolation("data on a closed session"));
        }

        let outcome = match self.reassembler.ingest(payload) {
            Ingest::Incomplete { accepted: true } => {
                self.reply(transport, Reply::Ack).await;
                Outcome::Acknowledged
            }
            Ingest::Incomplete { accepted: false } => Outcome::Discarded,
            Ingest::Complete => {
                self.phase.begin_dispatch()?;
                let result = self.dispatch().await;
                self.phase.finish_dispatch()?;

                match result.and_then(|class| Ok((class, class.to_wire()?))) {
                    Ok((class, byte)) => {
                        self.reply(transport, Reply::Class(byte)).await;
                        self.frames += 1;
                        info!(session = %self.id, %class, "frame classified");
                        Outcome::Classified(class)
                    }
                    Err(e) => {
                        warn!(session = %self.id, error = %e, "frame abandoned");
                        Outcome::Abandoned
                    }
                }
            }
        };

        transport.acknowledge_consumed(payload.len());
        Ok(outcome)
    }

    /// The peer went away: drop any partial frame.
    pub fn on_closed(&mut self) {
        if self.reassembler.progress() > 0 {
            debug!(
                session = %self.id,
                fragments = self.reassembler.progress(),
                "discarding partial frame"
            );
        }
        self.reassembler.reset();
        self.phase.close();
    }

    /// Decode → accelerator → argmax for the frame just completed.
    async fn dispatch(&mut self) -> Result<ClassIndex> {
        let tensor = self.decoder.decode(self.reassembler.frame())?;
        let output = {
            let mut accelerator = self.accelerator.lock().await;
            accelerator.submit(&tensor).await?
        };
        self.encoder.encode(&output)
    }

    /// Write failures are logged; the reply counts as delivered.
    async fn reply<T>(&self, transport: &mut T, reply: Reply)
    where
        T: FragmentTransport + ?Sized,
    {
        if let Err(e) = transport.send(reply).await {
            warn!(session = %self.id, ?reply, error = %e, "reply write failed");
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Fragments accepted towards the current frame.
    pub fn progress(&self) -> usize {
        self.reassembler.progress()
    }

    /// Frames classified and answered on this session.
    pub fn frames_classified(&self) -> u64 {
        self.frames
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("progress", &self.reassembler.progress())
            .field("frames", &self.frames)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
