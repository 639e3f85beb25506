use serde::{Deserialize, Serialize};

use crate::core::errors::ProtocolError;

/// Inbound control messages carried by websocket text frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Start(StartPayload),
    Stop,
    Cancel,
}

/// Payload of the `start` verb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    #[serde(rename = "sampleRate")]
    pub sample_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

/// Outbound events carried by websocket text frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Greeting sent once, immediately after the connection is accepted.
    Ready,
    /// Acknowledgement of an accepted `start`.
    Started {
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
        lang: String,
    },
    /// Provisional transcript of the trailing audio window.
    Partial { text: String },
    /// Authoritative transcript of the whole utterance; sent exactly once.
    Final { text: String },
    Error { message: String },
}

impl ServerEvent {
    pub fn error<M: Into<String>>(message: M) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

impl From<ProtocolError> for ServerEvent {
    fn from(err: ProtocolError) -> Self {
        ServerEvent::error(err.to_string())
    }
}

/// Parse an inbound text frame into a control message.
///
/// Parsing happens in two stages so the two failure modes stay distinct: a
/// frame that is not JSON at all reports `invalid_json`, while well-formed
/// JSON that does not carry a recognised verb reports
/// `unknown_control_message`.
pub fn parse_control(text: &str) -> Result<ControlMessage, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)?;
    serde_json::from_value(value).map_err(|_| ProtocolError::UnknownControl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_with_language() {
        let parsed = parse_control(r#"{"type":"start","sampleRate":16000,"lang":"de"}"#)
            .expect("start should parse");
        assert_eq!(
            parsed,
            ControlMessage::Start(StartPayload {
                sample_rate: 16_000,
                lang: Some("de".to_string()),
            })
        );
    }

    #[test]
    fn parses_start_without_language() {
        let parsed =
            parse_control(r#"{"type":"start","sampleRate":16000}"#).expect("start should parse");
        assert_eq!(
            parsed,
            ControlMessage::Start(StartPayload {
                sample_rate: 16_000,
                lang: None,
            })
        );
    }

    #[test]
    fn parses_stop_and_cancel() {
        assert_eq!(
            parse_control(r#"{"type":"stop"}"#).expect("stop should parse"),
            ControlMessage::Stop
        );
        assert_eq!(
            parse_control(r#"{"type":"cancel"}"#).expect("cancel should parse"),
            ControlMessage::Cancel
        );
    }

    #[test]
    fn non_json_frame_is_invalid_json() {
        assert_eq!(
            parse_control("definitely not json"),
            Err(ProtocolError::InvalidJson)
        );
    }

    #[test]
    fn unknown_verb_is_unknown_control_message() {
        assert_eq!(
            parse_control(r#"{"type":"pause"}"#),
            Err(ProtocolError::UnknownControl)
        );
    }

    #[test]
    fn json_without_type_is_unknown_control_message() {
        assert_eq!(parse_control("{}"), Err(ProtocolError::UnknownControl));
        assert_eq!(parse_control("[1,2,3]"), Err(ProtocolError::UnknownControl));
    }

    #[test]
    fn start_missing_sample_rate_is_unknown_control_message() {
        assert_eq!(
            parse_control(r#"{"type":"start"}"#),
            Err(ProtocolError::UnknownControl)
        );
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&ServerEvent::Ready).expect("serialize ready");
        assert_eq!(json, r#"{"type":"ready"}"#);

        let json = serde_json::to_string(&ServerEvent::Partial {
            text: "hello".to_string(),
        })
        .expect("serialize partial");
        assert_eq!(json, r#"{"type":"partial","text":"hello"}"#);

        let json = serde_json::to_string(&ServerEvent::Final {
            text: String::new(),
        })
        .expect("serialize final");
        assert_eq!(json, r#"{"type":"final","text":""}"#);
    }

    #[test]
    fn started_event_uses_camel_case_sample_rate() {
        let json = serde_json::to_string(&ServerEvent::Started {
            sample_rate: 16_000,
            lang: "en".to_string(),
        })
        .expect("serialize started");
        assert_eq!(json, r#"{"type":"started","sampleRate":16000,"lang":"en"}"#);
    }

    #[test]
    fn protocol_errors_map_to_wire_strings() {
        let event = ServerEvent::from(ProtocolError::UnsupportedSampleRate(8_000));
        assert_eq!(
            serde_json::to_string(&event).expect("serialize error"),
            r#"{"type":"error","message":"unsupported_sample_rate:8000"}"#
        );

        let event = ServerEvent::from(ProtocolError::NotStarted);
        assert_eq!(
            event,
            ServerEvent::Error {
                message: "not_started".to_string()
            }
        );
    }
}
