use std::fmt;
use std::str::FromStr;

use tracing::error;

use crate::error::Hl7Error;

/// HL7 segment separator at the message layer (CR).
pub const SEGMENT_DELIMITER: char = '\r';

/// Fixed negative acknowledgement returned when the inbound message cannot
/// be parsed far enough to address a real acknowledgement. Callers always
/// get *some* response.
pub const DEFAULT_NACK: &str = "MSH|^~\\&|||||||NACK||P|2.2\rMSA|AR|\r";

/// HL7 acknowledgement code carried in MSA field 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    /// `AA` — application accept.
    Accept,
    /// `AE` — application error.
    ApplicationError,
    /// `AR` — application reject.
    ApplicationReject,
}

impl AckCode {
    /// The two-letter wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            AckCode::Accept => "AA",
            AckCode::ApplicationError => "AE",
            AckCode::ApplicationReject => "AR",
        }
    }
}

impl fmt::Display for AckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AckCode {
    type Err = Hl7Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AA" => Ok(AckCode::Accept),
            "AE" => Ok(AckCode::ApplicationError),
            "AR" => Ok(AckCode::ApplicationReject),
            other => Err(Hl7Error::InvalidAcknowledgementCode(other.to_string())),
        }
    }
}

/// Build the HL7 acknowledgement for a received message.
///
/// The response MSH is derived from the inbound MSH by swapping the
/// sending/receiving application-facility pairs, replacing the message type
/// with `ACK` (keeping any trigger suffix), and copying every later field
/// unchanged. An MSA segment carries the requested code and the original
/// message control id.
///
/// The derivation assumes the MSH layout this tool is pointed at in
/// practice: at least ten fields, control id in field 9. Messages that fall
/// short — no terminated MSH segment at all, or one too small to reorder —
/// yield [`DEFAULT_NACK`] instead of an error.
pub fn generate_acknowledgement(hl7_message: &str, code: AckCode) -> String {
    match build(hl7_message, code) {
        Some(ack) => ack,
        None => {
            error!("message has no parseable MSH segment; responding with the default NACK");
            DEFAULT_NACK.to_string()
        }
    }
}

fn build(hl7_message: &str, code: AckCode) -> Option<String> {
    let end_of_msh = hl7_message.find(SEGMENT_DELIMITER)?;
    let msh_segment = &hl7_message[..end_of_msh];

    // The separator is whatever the message declares as its own 4th byte.
    let field_separator = msh_segment.chars().nth(3)?;
    // std's split keeps trailing empty fields, so a separator run at the end
    // of the segment survives the round trip without a reconstruction pass.
    let fields: Vec<&str> = msh_segment.split(field_separator).collect();
    if fields.len() < 10 {
        return None;
    }

    let mut ack = String::with_capacity(msh_segment.len() + 25);

    // Response header: original receiver becomes the sender and vice versa.
    for &index in &[0usize, 1, 4, 5, 2, 3, 6, 7] {
        ack.push_str(fields[index]);
        ack.push(field_separator);
    }
    ack.push_str("ACK");
    ack.push_str(fields[8].get(3..).unwrap_or(""));
    for field in &fields[9..] {
        ack.push(field_separator);
        ack.push_str(field);
    }
    ack.push(SEGMENT_DELIMITER);

    ack.push_str("MSA");
    ack.push(field_separator);
    ack.push_str(code.as_str());
    ack.push(field_separator);
    ack.push_str(fields[9]);
    ack.push(field_separator);
    ack.push(SEGMENT_DELIMITER);

    Some(ack)
}
