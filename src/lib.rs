pub mod config;

pub mod core {
    pub mod audio;
    pub mod engine;
    pub mod errors;
    pub mod messages;
    pub mod session;
}

pub mod server;

pub use core::engine;
pub use core::errors;
pub use core::messages;
pub use core::session;

#[cfg(test)]
mod tests {
    use crate::core::messages::{parse_control, ControlMessage, ServerEvent, StartPayload};
    use crate::core::session::SessionConfig;

    #[test]
    fn start_control_roundtrip() {
        let start = ControlMessage::Start(StartPayload {
            sample_rate: 16_000,
            lang: Some("en".into()),
        });
        let json = serde_json::to_string(&start).expect("serialize start");
        assert!(json.contains("\"type\":\"start\""));
        assert!(json.contains("\"sampleRate\":16000"));
        let decoded = parse_control(&json).expect("parse start back");
        assert_eq!(decoded, start);
    }

    #[test]
    fn partial_event_serializes_with_tag() {
        let message = ServerEvent::Partial {
            text: "testing".into(),
        };
        let json = serde_json::to_string(&message).expect("serialize partial");
        assert!(json.contains("\"type\":\"partial\""));
        assert!(json.contains("\"text\":\"testing\""));
    }

    #[test]
    fn session_defaults_match_the_wire_contract() {
        let config = SessionConfig::default();
        assert_eq!(config.sample_rate, 16_000);
        assert_eq!(config.default_language, "en");
        assert_eq!(config.partial_interval.as_millis(), 1_000);
        assert_eq!(config.partial_window.as_secs(), 8);
        assert_eq!(config.silence_duration.as_secs(), 3);
        assert_eq!(config.silence_rms, 200.0);
    }
}
