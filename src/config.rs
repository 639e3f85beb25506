use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Top-level configuration derived from the environment and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: String,
    pub model_path: String,
    pub language: String,
    pub sample_rate: u32,
    pub partial_interval: Duration,
    pub partial_window: Duration,
    pub silence_duration: Duration,
    pub silence_rms: f32,
    pub threads: NonZeroUsize,
}

impl AppConfig {
    pub fn from_env_and_args() -> Self {
        let mut config = Self::from_env();
        config.apply_args(env::args().skip(1));
        config
    }

    fn from_env() -> Self {
        let listen = env::var("LISTEN").unwrap_or_else(|_| "0.0.0.0:8020".to_string());
        let model_path =
            env::var("WHISPER_MODEL").unwrap_or_else(|_| "models/ggml-base.en.bin".to_string());
        let language = env::var("ASR_LANGUAGE")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "en".to_string());
        let sample_rate = env::var("ASR_SAMPLE_RATE")
            .ok()
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(16_000);
        let partial_interval = env::var("ASR_PARTIAL_INTERVAL_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(1_000));
        let partial_window = env::var("ASR_PARTIAL_WINDOW_SECONDS")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::from_secs(8));
        let silence_duration = env::var("SILENCE_SECONDS")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::from_secs(3));
        let silence_rms = env::var("SILENCE_RMS")
            .ok()
            .and_then(|value| value.parse::<f32>().ok())
            .filter(|value| value.is_finite() && *value >= 0.0)
            .unwrap_or(200.0);
        let threads = env::var("ASR_THREADS")
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .and_then(NonZeroUsize::new)
            .or_else(|| std::thread::available_parallelism().ok())
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            listen,
            model_path,
            language,
            sample_rate,
            partial_interval,
            partial_window,
            silence_duration,
            silence_rms,
            threads,
        }
    }

    fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut iter = args.into_iter().map(Into::into).peekable();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--listen" => {
                    if let Some(value) = iter.peek() {
                        self.listen = value.clone();
                        iter.next();
                    }
                }
                "--model" | "--model-path" => {
                    if let Some(value) = iter.peek() {
                        self.model_path = value.clone();
                        iter.next();
                    }
                }
                "--language" | "--lang" => {
                    if let Some(value) = iter.peek() {
                        let trimmed = value.trim();
                        if !trimmed.is_empty() {
                            self.language = trimmed.to_string();
                        }
                        iter.next();
                    }
                }
                "--threads" => {
                    if let Some(value) = iter.peek() {
                        if let Ok(parsed) = value.parse::<usize>() {
                            if let Some(non_zero) = NonZeroUsize::new(parsed) {
                                self.threads = non_zero;
                            }
                        }
                        iter.next();
                    }
                }
                _ => {}
            }
        }
    }
}
