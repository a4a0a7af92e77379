//! Upload trigger event

use serde::{Deserialize, Serialize};

/// Object-finalize notification for an uploaded file.
///
/// Storage notifications carry many more attributes; only the location is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEvent {
    pub bucket: String,
    pub name: String,
}

/// CloudEvents-style envelope that wraps the object metadata in `data`
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    data: UploadEvent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventPayload {
    Bare(UploadEvent),
    Envelope(EventEnvelope),
}

impl UploadEvent {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    /// Decode either a bare `{bucket, name}` object or an envelope with the
    /// object under `data`.
    pub fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        let event = match serde_json::from_slice::<EventPayload>(payload)? {
            EventPayload::Bare(event) => event,
            EventPayload::Envelope(envelope) => envelope.data,
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bare_object_metadata() {
        let payload = br#"{"bucket":"uploads","name":"daily/users.csv","size":"120","contentType":"text/csv"}"#;
        let event = UploadEvent::from_payload(payload).unwrap();
        assert_eq!(event, UploadEvent::new("uploads", "daily/users.csv"));
    }

    #[test]
    fn decodes_cloud_event_envelope() {
        let payload = br#"{"id":"42","type":"google.cloud.storage.object.v1.finalized","data":{"bucket":"uploads","name":"users.csv"}}"#;
        let event = UploadEvent::from_payload(payload).unwrap();
        assert_eq!(event.bucket, "uploads");
        assert_eq!(event.name, "users.csv");
    }

    #[test]
    fn rejects_payload_without_location() {
        assert!(UploadEvent::from_payload(br#"{"bucket":"uploads"}"#).is_err());
    }
}
