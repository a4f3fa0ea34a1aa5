//! # Telecommand module
//!
//! This module provides telecommand functionality to the communications
//! interface. A telecommand is any instruction sent to an arm from outside,
//! whether from a planner, an operator or a script.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod arm_ctrl;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{self, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A telecommand, i.e. an instruction sent to an arm.
#[derive(Debug, Serialize, Deserialize)]
pub struct Tc {
    /// The type of the telecommand
    pub tc_type: TcType,

    /// The payload associated with this TC
    pub payload: TcPayload,
}

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static TYPE_HAS_NO_PAYLOAD: [TcType; 4] =
    [TcType::None, TcType::Heartbeat, TcType::Kill, TcType::Stop];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Telecommand types.
///
/// The type is used to identify the purpose of the telecommand, and should be
/// used by the executable's telecommand processor to determine where to send
/// the command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub enum TcType {
    None,
    Heartbeat,

    /// A high level action request, payload is an `ActionRequest`
    Action,

    /// A continuous control command, payload is a `GoToPose`
    GoToPose,

    /// Emergency kill, equivalent to a cuff button press
    Kill,

    /// External stop of the arm
    Stop,
}

/// Telecommand payload.
///
/// The payload allows the data contained in the TC to be serialised in may
/// ways. The payload only indicates which serialisation format the data is in.
/// It is up to the user to properly deserialise the data contained within it.
#[derive(Debug, Serialize, Deserialize)]
pub enum TcPayload {
    None,
    Json(String),
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("TC contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("TC has an invalid type ({0})")]
    InvalidType(String),

    #[error("TC of type {0:?} is expected to have a payload but it doesn't")]
    MissingPayload(TcType),

    #[error("TC payload could not be deserialised: {0}")]
    InvalidPayload(serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tc {
    /// Parse a new TC from a JSON packet
    pub fn from_json(json_str: &str) -> Result<Self, TcParseError> {
        // Parse the JSON string into a value
        let val: Value = serde_json::from_str(json_str).map_err(TcParseError::InvalidJson)?;

        // Get the type of the TC
        let type_str = match val["type"].as_str() {
            Some(s) => s,
            None => {
                return Err(TcParseError::InvalidType(String::from(
                    "Expected \"type\" to be a string",
                )))
            }
        };
        let tc_type = match TcType::from_str(type_str) {
            Some(t) => t,
            None => {
                return Err(TcParseError::InvalidType(format!(
                    "{} is not a recognised TC type",
                    type_str
                )))
            }
        };

        // Get the payload. If it's null and the type does not have a payload
        // then an error is returned
        if val["payload"].is_null() {
            if TYPE_HAS_NO_PAYLOAD.contains(&tc_type) {
                return Ok(Tc {
                    tc_type,
                    payload: TcPayload::None,
                });
            }
            return Err(TcParseError::MissingPayload(tc_type));
        }

        Ok(Tc {
            tc_type,
            payload: TcPayload::Json(val["payload"].to_string()),
        })
    }

    /// Deserialise the payload of this TC into the given type.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, TcParseError> {
        match &self.payload {
            TcPayload::Json(s) => serde_json::from_str(s).map_err(TcParseError::InvalidPayload),
            TcPayload::None => Err(TcParseError::MissingPayload(self.tc_type)),
        }
    }
}

impl TcType {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(TcType::None),
            "HEARTBEAT" => Some(TcType::Heartbeat),
            "ACTION" => Some(TcType::Action),
            "GO_TO_POSE" => Some(TcType::GoToPose),
            "KILL" => Some(TcType::Kill),
            "STOP" => Some(TcType::Stop),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::arm_ctrl::ActionRequest;
    use super::*;

    #[test]
    fn test_action_tc() {
        let tc = Tc::from_json(
            r#"{"type": "ACTION", "payload": {"action": "get", "objects": [5, 9]}}"#,
        )
        .unwrap();

        assert_eq!(tc.tc_type, TcType::Action);

        let req: ActionRequest = tc.parse_payload().unwrap();
        assert_eq!(req.action, "get");
        assert_eq!(req.objects, vec![5, 9]);
    }

    #[test]
    fn test_payloadless_tcs() {
        let tc = Tc::from_json(r#"{"type": "KILL"}"#).unwrap();
        assert_eq!(tc.tc_type, TcType::Kill);
        assert!(tc.parse_payload::<ActionRequest>().is_err());

        assert!(matches!(
            Tc::from_json(r#"{"type": "ACTION"}"#),
            Err(TcParseError::MissingPayload(TcType::Action))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"type": "DANCE"}"#),
            Err(TcParseError::InvalidType(_))
        ));
    }
}
