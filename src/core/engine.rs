use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::core::errors::EngineError;

/// Knobs for a single decode call.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Language hint; `None` lets the engine pick.
    pub language: Option<String>,
    /// Suppress non-speech output. On for final decodes, off for partials so
    /// provisional text appears quickly.
    pub filter_silence: bool,
    /// Whether per-segment timestamps are wanted.
    pub with_timestamps: bool,
}

/// One recognised span of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
}

/// Result of one engine call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transcription {
    pub segments: Vec<Segment>,
    /// Language the engine decoded with, when known.
    pub detected_language: Option<String>,
}

impl Transcription {
    /// Concatenate all segment texts in order and trim surrounding whitespace.
    pub fn joined_text(&self) -> String {
        let mut text = String::new();
        for segment in &self.segments {
            text.push_str(&segment.text);
        }
        text.trim().to_string()
    }
}

/// Adapter over the external speech recogniser.
///
/// Implementations receive normalised `[-1.0, 1.0]` mono audio at the
/// configured sample rate and must be safe to share across sessions.
pub trait SpeechEngine: Send + Sync {
    fn transcribe(
        &self,
        audio: &[f32],
        options: &DecodeOptions,
    ) -> Result<Transcription, EngineError>;
}

/// Whisper.cpp-backed engine.
///
/// The context sits behind a mutex so decodes run one at a time; a single
/// model handle is shared by every session in the process.
pub struct WhisperEngine {
    context: Mutex<WhisperContext>,
    threads: NonZeroUsize,
}

impl WhisperEngine {
    /// Load a whisper.cpp model from `model_path`.
    pub fn load<P: AsRef<Path>>(model_path: P, threads: NonZeroUsize) -> Result<Self, EngineError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(EngineError::MissingModel(model_path.to_path_buf()));
        }
        let path = model_path
            .to_str()
            .ok_or_else(|| EngineError::ModelPath(model_path.to_path_buf()))?;
        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(EngineError::Init)?;
        Ok(Self {
            context: Mutex::new(context),
            threads,
        })
    }
}

impl SpeechEngine for WhisperEngine {
    fn transcribe(
        &self,
        audio: &[f32],
        options: &DecodeOptions,
    ) -> Result<Transcription, EngineError> {
        if audio.is_empty() {
            return Ok(Transcription::default());
        }

        let context = self.context.lock();
        let mut state = context.create_state().map_err(EngineError::Inference)?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.threads.get() as i32);
        params.set_translate(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_no_timestamps(!options.with_timestamps);
        params.set_single_segment(false);
        params.set_suppress_blank(true);
        params.set_suppress_nst(options.filter_silence);
        params.set_no_context(true);
        params.set_language(options.language.as_deref());

        state.full(params, audio).map_err(EngineError::Inference)?;

        let mut segments = Vec::new();
        for segment in state.as_iter() {
            let text = segment
                .to_str_lossy()
                .map_err(EngineError::Inference)?
                .into_owned();
            segments.push(Segment { text });
        }

        Ok(Transcription {
            segments,
            detected_language: options.language.clone(),
        })
    }
}

/// Process-wide, lazily initialised engine registry.
///
/// The model is loaded at most once, on first use by any session; until then
/// the registry only carries the configuration needed to build the engine.
/// Handles given out are shared and read-only.
pub struct EngineRegistry {
    model_path: PathBuf,
    threads: NonZeroUsize,
    cell: OnceCell<Arc<dyn SpeechEngine>>,
}

impl EngineRegistry {
    pub fn new(model_path: impl Into<PathBuf>, threads: NonZeroUsize) -> Self {
        Self {
            model_path: model_path.into(),
            threads,
            cell: OnceCell::new(),
        }
    }

    /// Registry that already holds an engine. Used by tests and by callers
    /// that preload the model at startup.
    pub fn with_engine(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            model_path: PathBuf::new(),
            threads: NonZeroUsize::MIN,
            cell: OnceCell::new_with(Some(engine)),
        }
    }

    /// Shared handle to the engine, loading the model on first use.
    pub async fn handle(&self) -> Result<Arc<dyn SpeechEngine>, EngineError> {
        let engine = self
            .cell
            .get_or_try_init(|| async {
                let model_path = self.model_path.clone();
                let threads = self.threads;
                info!(model = %model_path.display(), "loading whisper model");
                tokio::task::spawn_blocking(move || {
                    WhisperEngine::load(&model_path, threads)
                        .map(|engine| Arc::new(engine) as Arc<dyn SpeechEngine>)
                })
                .await
                .map_err(|err| EngineError::Worker(format!("load task panicked: {err}")))?
            })
            .await?;
        Ok(Arc::clone(engine))
    }

    /// Run one decode on the blocking pool, loading the engine if needed.
    pub async fn transcribe(
        &self,
        audio: Vec<f32>,
        options: DecodeOptions,
    ) -> Result<Transcription, EngineError> {
        let engine = self.handle().await?;
        tokio::task::spawn_blocking(move || engine.transcribe(&audio, &options))
            .await
            .map_err(|err| EngineError::Worker(format!("decode task panicked: {err}")))?
    }
}
