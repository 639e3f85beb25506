use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::audio::{decode_pcm, normalize, AudioBuffer, SilenceTracker};
use crate::core::engine::{DecodeOptions, EngineRegistry};
use crate::core::errors::ProtocolError;
use crate::core::messages::{parse_control, ControlMessage, ServerEvent, StartPayload};

/// Minimum trailing audio required before a partial decode is worth running.
const MIN_PARTIAL_SECONDS: f32 = 0.5;

/// Tunables for one streaming session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub default_language: String,
    pub partial_interval: Duration,
    pub partial_window: Duration,
    pub silence_duration: Duration,
    pub silence_rms: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            default_language: "en".to_string(),
            partial_interval: Duration::from_secs(1),
            partial_window: Duration::from_secs(8),
            silence_duration: Duration::from_secs(3),
            silence_rms: 200.0,
        }
    }
}

impl SessionConfig {
    fn samples_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f32() * self.sample_rate as f32) as usize
    }
}

/// Lifecycle of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, waiting for a valid `start`.
    AwaitingStart,
    /// `start` accepted; audio frames are ingested.
    Streaming,
    /// Terminal. No buffer mutation, decode, or outbound event after this.
    Closed,
}

/// Rate limiter for partial decodes.
///
/// The gate rolls its timestamp forward every time it opens, whether or not
/// the attempt ends up decoding anything, so an abandoned attempt still
/// consumes a full interval.
#[derive(Debug)]
struct PartialThrottle {
    interval: Duration,
    last_attempt: Option<Instant>,
}

impl PartialThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_attempt: None,
        }
    }

    /// Whether a new attempt may begin at `now`, rolling the gate when it may.
    fn try_begin(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_attempt {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_attempt = Some(now);
        true
    }
}

/// All state for one client connection, from accept to close.
///
/// The surrounding receive loop feeds inbound frames into [`handle_text`] and
/// [`handle_audio`] one at a time and forwards the returned events to the
/// peer; once [`is_closed`] reports true it tears the connection down.
///
/// [`handle_text`]: Session::handle_text
/// [`handle_audio`]: Session::handle_audio
/// [`is_closed`]: Session::is_closed
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    started: bool,
    language: String,
    buffer: AudioBuffer,
    silence: SilenceTracker,
    throttle: PartialThrottle,
    engines: Arc<EngineRegistry>,
}

impl Session {
    pub fn new(config: SessionConfig, engines: Arc<EngineRegistry>) -> Self {
        let silence_limit = config.samples_for(config.silence_duration);
        Self {
            state: SessionState::AwaitingStart,
            started: false,
            language: config.default_language.clone(),
            buffer: AudioBuffer::new(),
            silence: SilenceTracker::new(config.silence_rms, silence_limit),
            throttle: PartialThrottle::new(config.partial_interval),
            engines,
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Tear the session down without a final decode. Used when the peer goes
    /// away; a vanished client gets no transcript.
    pub fn abort(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Process one inbound text frame.
    pub async fn handle_text(&mut self, text: &str) -> Vec<ServerEvent> {
        if self.is_closed() {
            return Vec::new();
        }
        match parse_control(text) {
            Ok(ControlMessage::Start(payload)) => self.handle_start(payload),
            Ok(ControlMessage::Stop) => self.finalize().await,
            Ok(ControlMessage::Cancel) => {
                debug!("session cancelled by client");
                self.state = SessionState::Closed;
                Vec::new()
            }
            Err(err) => vec![ServerEvent::from(err)],
        }
    }

    /// Process one inbound binary frame of raw little-endian PCM16 audio.
    pub async fn handle_audio(&mut self, bytes: &[u8]) -> Vec<ServerEvent> {
        if self.is_closed() {
            return Vec::new();
        }
        if !self.started {
            return vec![ServerEvent::from(ProtocolError::NotStarted)];
        }
        let chunk = match decode_pcm(bytes) {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(error = %err, "undecodable audio frame");
                self.state = SessionState::Closed;
                return vec![ServerEvent::error(format!("server_exception: {err}"))];
            }
        };
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buffer.append(&chunk);
        if self.silence.observe(&chunk) {
            // Sustained silence ends the utterance exactly like a client stop.
            debug!(
                silent_samples = self.silence.silent_samples(),
                "finalizing after sustained silence"
            );
            return self.finalize().await;
        }
        self.maybe_partial().await
    }

    fn handle_start(&mut self, payload: StartPayload) -> Vec<ServerEvent> {
        if self.started {
            return vec![ServerEvent::from(ProtocolError::AlreadyStarted)];
        }
        if payload.sample_rate != self.config.sample_rate {
            self.state = SessionState::Closed;
            return vec![ServerEvent::from(ProtocolError::UnsupportedSampleRate(
                payload.sample_rate,
            ))];
        }
        if let Some(lang) = payload.lang {
            self.language = lang;
        }
        self.started = true;
        self.state = SessionState::Streaming;
        vec![ServerEvent::Started {
            sample_rate: self.config.sample_rate,
            lang: self.language.clone(),
        }]
    }

    /// Attempt a throttled partial decode over the trailing window.
    async fn maybe_partial(&mut self) -> Vec<ServerEvent> {
        if !self.throttle.try_begin(Instant::now()) {
            return Vec::new();
        }
        let window = self
            .buffer
            .tail(self.config.samples_for(self.config.partial_window));
        let min_samples = (MIN_PARTIAL_SECONDS * self.config.sample_rate as f32) as usize;
        if window.len() < min_samples {
            return Vec::new();
        }
        let audio = normalize(window);
        let options = DecodeOptions {
            language: Some(self.language.clone()),
            filter_silence: false,
            with_timestamps: false,
        };
        match self.engines.transcribe(audio, options).await {
            Ok(transcription) => {
                let text = transcription.joined_text();
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![ServerEvent::Partial { text }]
                }
            }
            Err(err) => {
                warn!(error = %err, "partial decode failed");
                vec![ServerEvent::error(format!("partial_decode_failed: {err}"))]
            }
        }
    }

    /// Decode the whole buffer, emit the final transcript, and close.
    ///
    /// The transition to `Closed` happens no matter how the decode went, so
    /// at most one final is ever produced.
    async fn finalize(&mut self) -> Vec<ServerEvent> {
        let events = self.final_events().await;
        self.state = SessionState::Closed;
        events
    }

    async fn final_events(&mut self) -> Vec<ServerEvent> {
        if self.buffer.is_empty() {
            return vec![ServerEvent::Final {
                text: String::new(),
            }];
        }
        let audio = normalize(self.buffer.as_slice());
        let options = DecodeOptions {
            language: Some(self.language.clone()),
            filter_silence: true,
            with_timestamps: false,
        };
        match self.engines.transcribe(audio, options).await {
            Ok(transcription) => vec![ServerEvent::Final {
                text: transcription.joined_text(),
            }],
            Err(err) => {
                warn!(error = %err, "final decode failed");
                vec![ServerEvent::error(format!("final_decode_failed: {err}"))]
            }
        }
    }
}
