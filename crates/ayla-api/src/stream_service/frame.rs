// Push socket framing.
//
// Every text message is `<length>|<payload>`. Two literal frames are control
// sentinels; everything else carries a JSON change event.

use super::types::StreamEvent;

/// Server keep-alive; carries no information.
pub const KEEP_ALIVE: &str = "1|X";
/// Server heartbeat; the client echoes it back verbatim.
pub const HEARTBEAT: &str = "1|Z";

/// One decoded socket message.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    KeepAlive,
    Heartbeat,
    Event(Box<StreamEvent>),
    /// A frame that could not be decoded. Carries the reason.
    Invalid(String),
}

/// Decode a text frame from the push socket.
pub fn parse_frame(text: &str) -> StreamFrame {
    match text {
        KEEP_ALIVE => return StreamFrame::KeepAlive,
        HEARTBEAT => return StreamFrame::Heartbeat,
        _ => {}
    }

    let Some((_, payload)) = text.split_once('|') else {
        return StreamFrame::Invalid(format!("missing length prefix: {text:?}"));
    };

    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => StreamFrame::Event(Box::new(event)),
        Err(e) => StreamFrame::Invalid(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_recognized() {
        assert_eq!(parse_frame("1|X"), StreamFrame::KeepAlive);
        assert_eq!(parse_frame("1|Z"), StreamFrame::Heartbeat);
    }

    #[test]
    fn event_payload_is_decoded() {
        let text = r#"120|{"seq":"1","metadata":{"dsn":"AC1","property_name":"Blue_LED","event_type":"datapoint","base_type":"boolean"},"datapoint":{"value":1}}"#;
        let StreamFrame::Event(event) = parse_frame(text) else {
            panic!("expected event frame");
        };
        assert_eq!(event.dsns(), vec!["AC1"]);
        assert_eq!(
            event.datapoint.as_ref().map(|d| d.value.clone()),
            Some(serde_json::json!(1))
        );
    }

    #[test]
    fn payload_containing_pipes_is_kept_whole() {
        let text = r#"40|{"metadata":{"dsn":"AC1","display_name":"a|b"}}"#;
        assert!(matches!(parse_frame(text), StreamFrame::Event(_)));
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(parse_frame("hello"), StreamFrame::Invalid(_)));
        assert!(matches!(parse_frame("5|{nope"), StreamFrame::Invalid(_)));
    }
}
