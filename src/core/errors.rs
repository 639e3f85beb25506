use std::path::PathBuf;

use thiserror::Error;

/// Client-visible protocol violations.
///
/// The `Display` output of each variant is the exact wire string carried by
/// outbound `error` events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid_json")]
    InvalidJson,
    #[error("unknown_control_message")]
    UnknownControl,
    #[error("already_started")]
    AlreadyStarted,
    #[error("not_started")]
    NotStarted,
    #[error("unsupported_sample_rate:{0}")]
    UnsupportedSampleRate(u32),
}

/// Errors surfaced while decoding inbound audio payloads.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("pcm payload must contain an even number of bytes (got {0})")]
    OddPcmByteLength(usize),
    #[error("unsupported wav spec: channels={channels}, bits={bits}")]
    UnsupportedWavSpec { channels: u16, bits: u16 },
    #[error("unsupported wav sample rate {got} Hz (expected {expected} Hz)")]
    UnsupportedWavRate { got: u32, expected: u32 },
    #[error("wav decode failed: {0}")]
    Wav(#[from] hound::Error),
}

impl From<hound::WavSpec> for AudioError {
    fn from(spec: hound::WavSpec) -> Self {
        AudioError::UnsupportedWavSpec {
            channels: spec.channels,
            bits: spec.bits_per_sample,
        }
    }
}

/// Errors produced while initialising or running the speech engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model file '{0}' does not exist")]
    MissingModel(PathBuf),
    #[error("model path '{0}' is not valid unicode")]
    ModelPath(PathBuf),
    #[error("whisper initialisation failed: {0}")]
    Init(whisper_rs::WhisperError),
    #[error("whisper inference failed: {0}")]
    Inference(whisper_rs::WhisperError),
    #[error("decode worker failed: {0}")]
    Worker(String),
}
