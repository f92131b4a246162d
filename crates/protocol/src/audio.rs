use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Audio container formats accepted on the wire.  16 kHz mono floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Webm,
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Webm => "webm",
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    /// Validate a client-supplied format name.
    pub fn parse(raw: &str) -> Result<Self, AudioError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "webm" => Ok(AudioFormat::Webm),
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            _ => Err(AudioError::UnsupportedFormat(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    #[error("unsupported audio format {0:?} (expected webm, wav, or mp3)")]
    UnsupportedFormat(String),

    #[error("chunk {index} is not after chunk {last}")]
    OutOfOrder { index: u32, last: u32 },

    #[error("audio format changed mid-answer")]
    FormatChanged,

    #[error("invalid base64 audio payload: {0}")]
    Base64(String),

    #[error("binary audio frame without an open chunk stream")]
    NoOpenStream,

    #[error("no audio buffered for this answer")]
    Empty,
}

/// A fully reassembled spoken answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledAudio {
    pub question_id: Uuid,
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

/// Reassembles one answer's audio from streamed chunks.
///
/// `chunk_index` must be strictly increasing within an answer; duplicates
/// and reordering are rejected.  A chunk for a different question abandons
/// the open stream and starts a new one (the client has moved on).
#[derive(Debug, Default)]
pub struct AudioAssembler {
    question_id: Option<Uuid>,
    format: Option<AudioFormat>,
    last_index: Option<u32>,
    buf: Vec<u8>,
}

impl AudioAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.question_id.is_some()
    }

    pub fn push_chunk(
        &mut self,
        question_id: Uuid,
        chunk_index: u32,
        format: AudioFormat,
        audio_b64: &str,
    ) -> Result<(), AudioError> {
        if self.question_id != Some(question_id) {
            self.clear();
            self.question_id = Some(question_id);
        }
        match self.format {
            None => self.format = Some(format),
            Some(open) if open != format => return Err(AudioError::FormatChanged),
            Some(_) => {}
        }
        if let Some(last) = self.last_index {
            if chunk_index <= last {
                return Err(AudioError::OutOfOrder { index: chunk_index, last });
            }
        }

        let bytes = BASE64
            .decode(audio_b64.trim())
            .map_err(|err| AudioError::Base64(err.to_string()))?;
        self.last_index = Some(chunk_index);
        self.buf.extend_from_slice(&bytes);
        Ok(())
    }

    /// Append a raw binary continuation frame to the open stream.
    pub fn push_binary(&mut self, bytes: &[u8]) -> Result<(), AudioError> {
        if self.question_id.is_none() {
            return Err(AudioError::NoOpenStream);
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Close the stream and hand back the reassembled audio.
    pub fn finish(&mut self) -> Result<AssembledAudio, AudioError> {
        let question_id = self.question_id.ok_or(AudioError::NoOpenStream)?;
        let format = self.format.ok_or(AudioError::NoOpenStream)?;
        if self.buf.is_empty() {
            self.clear();
            return Err(AudioError::Empty);
        }
        let bytes = std::mem::take(&mut self.buf);
        self.clear();
        Ok(AssembledAudio { question_id, format, bytes })
    }

    pub fn clear(&mut self) {
        self.question_id = None;
        self.format = None;
        self.last_index = None;
        self.buf.clear();
    }
}

pub fn encode_audio(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }

    #[test]
    fn chunks_reassemble_in_order() {
        let question = Uuid::new_v4();
        let mut assembler = AudioAssembler::new();
        assembler.push_chunk(question, 0, AudioFormat::Wav, &b64(b"abc")).unwrap();
        assembler.push_chunk(question, 1, AudioFormat::Wav, &b64(b"def")).unwrap();
        let audio = assembler.finish().unwrap();
        assert_eq!(audio.bytes, b"abcdef");
        assert_eq!(audio.format, AudioFormat::Wav);
        assert!(!assembler.is_open());
    }

    #[test]
    fn duplicate_chunk_is_rejected() {
        let question = Uuid::new_v4();
        let mut assembler = AudioAssembler::new();
        assembler.push_chunk(question, 0, AudioFormat::Webm, &b64(b"a")).unwrap();
        let err = assembler.push_chunk(question, 0, AudioFormat::Webm, &b64(b"a")).unwrap_err();
        assert_eq!(err, AudioError::OutOfOrder { index: 0, last: 0 });
    }

    #[test]
    fn out_of_order_chunk_is_rejected() {
        let question = Uuid::new_v4();
        let mut assembler = AudioAssembler::new();
        assembler.push_chunk(question, 3, AudioFormat::Webm, &b64(b"a")).unwrap();
        let err = assembler.push_chunk(question, 2, AudioFormat::Webm, &b64(b"b")).unwrap_err();
        assert_eq!(err, AudioError::OutOfOrder { index: 2, last: 3 });
    }

    #[test]
    fn index_gaps_are_tolerated() {
        let question = Uuid::new_v4();
        let mut assembler = AudioAssembler::new();
        assembler.push_chunk(question, 0, AudioFormat::Mp3, &b64(b"a")).unwrap();
        assembler.push_chunk(question, 5, AudioFormat::Mp3, &b64(b"b")).unwrap();
        assert_eq!(assembler.finish().unwrap().bytes, b"ab");
    }

    #[test]
    fn new_question_abandons_the_open_stream() {
        let mut assembler = AudioAssembler::new();
        assembler.push_chunk(Uuid::new_v4(), 0, AudioFormat::Wav, &b64(b"old")).unwrap();
        let next = Uuid::new_v4();
        assembler.push_chunk(next, 0, AudioFormat::Wav, &b64(b"new")).unwrap();
        let audio = assembler.finish().unwrap();
        assert_eq!(audio.question_id, next);
        assert_eq!(audio.bytes, b"new");
    }

    #[test]
    fn format_change_mid_answer_is_rejected() {
        let question = Uuid::new_v4();
        let mut assembler = AudioAssembler::new();
        assembler.push_chunk(question, 0, AudioFormat::Wav, &b64(b"a")).unwrap();
        let err = assembler.push_chunk(question, 1, AudioFormat::Mp3, &b64(b"b")).unwrap_err();
        assert_eq!(err, AudioError::FormatChanged);
    }

    #[test]
    fn binary_frames_extend_the_open_stream() {
        let question = Uuid::new_v4();
        let mut assembler = AudioAssembler::new();
        assert_eq!(assembler.push_binary(b"x"), Err(AudioError::NoOpenStream));
        assembler.push_chunk(question, 0, AudioFormat::Wav, &b64(b"a")).unwrap();
        assembler.push_binary(b"bc").unwrap();
        assert_eq!(assembler.finish().unwrap().bytes, b"abc");
    }

    #[test]
    fn format_names_parse_case_insensitively() {
        assert_eq!(AudioFormat::parse("WAV").unwrap(), AudioFormat::Wav);
        assert_eq!(AudioFormat::parse(" webm ").unwrap(), AudioFormat::Webm);
        assert_eq!(AudioFormat::parse("mp3").unwrap(), AudioFormat::Mp3);
        assert_eq!(
            AudioFormat::parse("ogg").unwrap_err(),
            AudioError::UnsupportedFormat("ogg".to_string())
        );
    }

    #[test]
    fn garbage_base64_is_rejected() {
        let mut assembler = AudioAssembler::new();
        let err = assembler
            .push_chunk(Uuid::new_v4(), 0, AudioFormat::Wav, "!!not-base64!!")
            .unwrap_err();
        assert!(matches!(err, AudioError::Base64(_)));
    }
}
