use serde::{Deserialize, Serialize};

use crate::constants::EventName;

/// Envelope for every frame on the live channel.
///
/// `data` stays a `RawValue` until the receiver knows which payload type the
/// event name calls for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: EventName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<serde_json::value::RawValue>>,
}

impl Frame {
    /// Creates a frame with the given event name and payload.
    pub fn new<T: Serialize>(event: EventName, data: Option<&T>) -> Result<Self, serde_json::Error> {
        let raw = match data {
            Some(d) => {
                let json = serde_json::to_string(d)?;
                Some(serde_json::value::RawValue::from_string(json)?)
            }
            None => None,
        };
        Ok(Self { event, data: raw })
    }

    /// Deserializes the payload into the given type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }
}
