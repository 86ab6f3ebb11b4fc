/// Errors that can occur at the HL7 message layer.
#[derive(Debug, thiserror::Error)]
pub enum Hl7Error {
    /// An acknowledgement code outside AA / AE / AR was requested.
    /// This is a caller programming error, not a runtime condition.
    #[error("acknowledgement code must be AA, AE or AR: {0}")]
    InvalidAcknowledgementCode(String),
}

pub type Result<T> = std::result::Result<T, Hl7Error>;
