//! Wire format between the camera head and the mobile base.
//!
//! Discovery uses two fixed NUL-terminated ASCII tokens compared byte for
//! byte. Motion commands travel as NUL-terminated decimal text, one field per
//! axis separated by commas: `horizontal[,vertical,forward]`.

use crate::{
    constants::{ACKNOWLEDGEMENT_TOKEN, DEFAULT_WIRE_PRECISION, IDENTIFICATION_TOKEN, MAX_PAYLOAD_LEN},
    control::MotionCommand,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// True when `payload` is exactly the base's identification token
#[must_use]
pub fn is_identification(payload: &[u8]) -> bool {
    payload == IDENTIFICATION_TOKEN
}

/// True when `payload` is exactly the camera's acknowledgement token
#[must_use]
pub fn is_acknowledgement(payload: &[u8]) -> bool {
    payload == ACKNOWLEDGEMENT_TOKEN
}

/// Which axes a command payload carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFields {
    /// Horizontal rotation only
    Horizontal,
    /// Horizontal rotation, vertical rotation and forward displacement
    #[default]
    All,
}

/// Text encoder for motion commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandCodec {
    precision: usize,
    fields: WireFields,
    max_len: usize,
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self {
            precision: DEFAULT_WIRE_PRECISION,
            fields: WireFields::All,
            max_len: MAX_PAYLOAD_LEN,
        }
    }
}

impl CommandCodec {
    #[must_use]
    pub const fn new(precision: usize, fields: WireFields, max_len: usize) -> Self {
        Self {
            precision,
            fields,
            max_len,
        }
    }

    /// Encode a command as NUL-terminated text
    ///
    /// # Errors
    ///
    /// Returns an error for non-finite values or a payload longer than the
    /// medium allows
    pub fn encode(&self, command: &MotionCommand) -> Result<Vec<u8>> {
        let values = [
            command.horizontal_rotation,
            command.vertical_rotation,
            command.forward_displacement,
        ];
        let count = match self.fields {
            WireFields::Horizontal => 1,
            WireFields::All => 3,
        };

        let mut text = String::with_capacity(32);
        for (i, value) in values[..count].iter().enumerate() {
            if !value.is_finite() {
                return Err(Error::Protocol(format!("Cannot encode non-finite value {value}")));
            }
            if i > 0 {
                text.push(',');
            }
            // Writing into a String cannot fail
            let _ = write!(text, "{:.*}", self.precision, value);
        }

        let mut payload = text.into_bytes();
        payload.push(0);
        if payload.len() > self.max_len {
            return Err(Error::Protocol(format!(
                "Encoded command is {} bytes, medium allows {}",
                payload.len(),
                self.max_len
            )));
        }
        Ok(payload)
    }

    /// Decode a command payload; missing trailing axes read as zero
    ///
    /// # Errors
    ///
    /// Returns an error for non-UTF-8 text, a wrong number of fields or a
    /// field that is not a finite number
    pub fn decode(payload: &[u8]) -> Result<MotionCommand> {
        let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        let text = std::str::from_utf8(&payload[..end])
            .map_err(|e| Error::Protocol(format!("Command is not UTF-8: {e}")))?;

        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        if fields.is_empty() || fields.len() > 3 || fields[0].is_empty() {
            return Err(Error::Protocol(format!("Expected 1 to 3 fields, got '{text}'")));
        }

        let mut values = [0.0f64; 3];
        for (slot, field) in values.iter_mut().zip(&fields) {
            let value: f64 = field
                .parse()
                .map_err(|_| Error::Protocol(format!("Field '{field}' is not a number")))?;
            if !value.is_finite() {
                return Err(Error::Protocol(format!("Field '{field}' is not finite")));
            }
            *slot = value;
        }

        Ok(MotionCommand::new(values[0], values[1], values[2]))
    }
}
