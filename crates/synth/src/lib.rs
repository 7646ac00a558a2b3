mod client;
pub mod protocol;

pub use client::{SynthClient, SynthError};
pub use protocol::{ProtocolError, WireResponse, decode_response, encode_request};
