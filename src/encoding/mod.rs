//! Codecs for addresses and the native UDP packet format.

pub mod key;
pub mod native;

pub use key::{parse_key, AddressError};
pub use native::{marshal_packet, unmarshal_packet};

/// Errors decoding an inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Incoming bytes empty")]
    EmptyInput,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

impl From<AddressError> for DecodeError {
    fn from(e: AddressError) -> Self {
        DecodeError::MalformedFrame(e.to_string())
    }
}
