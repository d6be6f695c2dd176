//! Decoding of MQTT events into [`Message`]s.

use crate::message::Message;

/// Decode an event from the MQTT event loop. Anything that is not an
/// incoming publish becomes `Message::Unknown(None)`.
pub fn parse_message(event: &rumqttc::Event) -> Message {
    match event {
        rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish)) => parse_payload(&publish.payload),
        _ => Message::Unknown(None),
    }
}

/// Decode a report topic payload.
pub fn parse_payload(payload: &[u8]) -> Message {
    let Ok(payload) = std::str::from_utf8(payload) else {
        return Message::Unknown(Some(String::from_utf8_lossy(payload).into_owned()));
    };

    match serde_json::from_str::<Message>(payload)
        .map_err(|err| format_serde_error::SerdeError::new(payload.to_string(), err))
    {
        Ok(message) => message,
        Err(err) => {
            tracing::trace!("untyped report: {}", err);
            match serde_json::from_str::<serde_json::Value>(payload) {
                Ok(value) => Message::Json(value),
                Err(_) => Message::Unknown(Some(payload.to_owned())),
            }
        }
    }
}
