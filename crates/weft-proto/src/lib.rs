//! Weft Protocol - Wire protocol and message definitions.
//!
//! This crate defines:
//! - The typed message header (destination, source, authority, signature)
//! - Endpoint, peer and bootstrap-contact records
//! - The closed set of message bodies and their tags
//! - Envelope framing: `header || tag || body`

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod endpoint;
pub mod header;
pub mod messages;

pub use endpoint::{Contact, Endpoint, EndpointPair, NodeInfo};
pub use header::{Authority, DestinationAddress, MessageHeader, MessageId, SourceAddress};
pub use messages::{
    serialise, Connect, ConnectResponse, Envelope, FindGroup, FindGroupResponse, GetData,
    GetDataResponse, MessageBody, MessageTypeTag, Post, PutData, PutDataResponse,
};
