//! Wire protocol for the bidirectional interview session.
//!
//! Frames are JSON text messages discriminated by a `type` field, plus raw
//! binary messages carrying audio continuation chunks.  This crate only
//! (de)serialises and validates framing; it never touches domain logic.

pub mod audio;
pub mod error;
pub mod frames;

pub use audio::{AssembledAudio, AudioAssembler, AudioError, AudioFormat, encode_audio};
pub use error::{ErrorBody, ErrorCode};
pub use frames::{Inbound, Outbound, VoiceMetricsFrame, round1};
