//! The closed set of overlay messages and the envelope framing.
//!
//! Wire form of every frame is `header || tag || body`. The header and
//! tag are enough to route, filter and forward a frame; the body is
//! only decoded by the node that terminates it.

use bytes::{Bytes, BytesMut};
use weft_core::{Address, DecodeError, Identity, PublicKey, WireDecode, WireEncode};

use crate::endpoint::EndpointPair;
use crate::header::{MessageHeader, SourceAddress};

/// Message type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageTypeTag {
    /// Join offer from a node that wants into our table
    Connect = 0,
    /// Reply to our join offer
    ConnectResponse = 1,
    /// Probe for the close group of a target address
    FindGroup = 2,
    /// Reply carrying the probed group's identity keys
    FindGroupResponse = 3,
    /// Application fetch
    GetData = 4,
    /// Application fetch reply
    GetDataResponse = 5,
    /// Application store
    PutData = 6,
    /// Application store reply
    PutDataResponse = 7,
    /// Application one-way message
    Post = 8,
}

impl MessageTypeTag {
    /// Returns the wire tag.
    pub fn tag(&self) -> u32 {
        *self as u32
    }

    /// Creates from a wire tag.
    pub fn from_tag(tag: u32) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(MessageTypeTag::Connect),
            1 => Ok(MessageTypeTag::ConnectResponse),
            2 => Ok(MessageTypeTag::FindGroup),
            3 => Ok(MessageTypeTag::FindGroupResponse),
            4 => Ok(MessageTypeTag::GetData),
            5 => Ok(MessageTypeTag::GetDataResponse),
            6 => Ok(MessageTypeTag::PutData),
            7 => Ok(MessageTypeTag::PutDataResponse),
            8 => Ok(MessageTypeTag::Post),
            _ => Err(DecodeError::InvalidEnumTag(tag)),
        }
    }
}

impl WireEncode for MessageTypeTag {
    fn encode(&self, buf: &mut BytesMut) {
        self.tag().encode(buf);
    }
}

impl WireDecode for MessageTypeTag {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Self::from_tag(u32::decode(buf)?)
    }
}

/// Join offer: the requester asks the receiver to add it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// Where the requester can be reached.
    pub requester_endpoints: EndpointPair,
    /// The requester's overlay address.
    pub requester_id: Address,
    /// The node being asked.
    pub receiver_id: Address,
    /// The requester's identity key, for authentication.
    pub requester_public_key: PublicKey,
}

impl WireEncode for Connect {
    fn encode(&self, buf: &mut BytesMut) {
        self.requester_endpoints.encode(buf);
        self.requester_id.encode(buf);
        self.receiver_id.encode(buf);
        self.requester_public_key.encode(buf);
    }
}

impl WireDecode for Connect {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            requester_endpoints: EndpointPair::decode(buf)?,
            requester_id: Address::decode(buf)?,
            receiver_id: Address::decode(buf)?,
            requester_public_key: PublicKey::decode(buf)?,
        })
    }
}

/// Accepting reply to a [`Connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Echo of the requester's endpoints.
    pub requester_endpoints: EndpointPair,
    /// Where the receiver can be reached.
    pub receiver_endpoints: EndpointPair,
    /// Echo of the requester's address.
    pub requester_id: Address,
    /// The responding node's address.
    pub receiver_id: Address,
    /// The responding node's identity key.
    pub receiver_public_key: PublicKey,
}

impl WireEncode for ConnectResponse {
    fn encode(&self, buf: &mut BytesMut) {
        self.requester_endpoints.encode(buf);
        self.receiver_endpoints.encode(buf);
        self.requester_id.encode(buf);
        self.receiver_id.encode(buf);
        self.receiver_public_key.encode(buf);
    }
}

impl WireDecode for ConnectResponse {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            requester_endpoints: EndpointPair::decode(buf)?,
            receiver_endpoints: EndpointPair::decode(buf)?,
            requester_id: Address::decode(buf)?,
            receiver_id: Address::decode(buf)?,
            receiver_public_key: PublicKey::decode(buf)?,
        })
    }
}

/// Probe for the close group of `target_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindGroup {
    /// The address whose close group is wanted.
    pub target_id: Address,
    /// Who is asking.
    pub requester_id: Address,
}

impl WireEncode for FindGroup {
    fn encode(&self, buf: &mut BytesMut) {
        self.target_id.encode(buf);
        self.requester_id.encode(buf);
    }
}

impl WireDecode for FindGroup {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            target_id: Address::decode(buf)?,
            requester_id: Address::decode(buf)?,
        })
    }
}

/// Reply to a [`FindGroup`]: the identity keys of the group members.
///
/// Member addresses are not carried; they are re-derived by hashing
/// the keys, which is what defines a node's address in the first place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindGroupResponse {
    /// Echo of the probed address.
    pub target_id: Address,
    /// Identity keys of the responder's close group, plus its own.
    pub group: Vec<PublicKey>,
}

impl WireEncode for FindGroupResponse {
    fn encode(&self, buf: &mut BytesMut) {
        self.target_id.encode(buf);
        self.group.encode(buf);
    }
}

impl WireDecode for FindGroupResponse {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            target_id: Address::decode(buf)?,
            group: Vec::<PublicKey>::decode(buf)?,
        })
    }
}

/// Application fetch, routed toward the name's close group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetData {
    /// Application-level type of the requested data.
    pub data_tag: u32,
    /// Name of the requested data.
    pub name: Identity,
    /// Who to send the data back to.
    pub from: SourceAddress,
}

impl WireEncode for GetData {
    fn encode(&self, buf: &mut BytesMut) {
        self.data_tag.encode(buf);
        self.name.encode(buf);
        self.from.encode(buf);
    }
}

impl WireDecode for GetData {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            data_tag: u32::decode(buf)?,
            name: Identity::decode(buf)?,
            from: SourceAddress::decode(buf)?,
        })
    }
}

/// Reply to a [`GetData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDataResponse {
    /// Name of the data.
    pub name: Identity,
    /// The data, or `None` when the holder has nothing under the name.
    pub data: Option<Vec<u8>>,
    /// Who answered.
    pub from: SourceAddress,
}

impl WireEncode for GetDataResponse {
    fn encode(&self, buf: &mut BytesMut) {
        self.name.encode(buf);
        self.data.encode(buf);
        self.from.encode(buf);
    }
}

impl WireDecode for GetDataResponse {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            name: Identity::decode(buf)?,
            data: Option::<Vec<u8>>::decode(buf)?,
            from: SourceAddress::decode(buf)?,
        })
    }
}

/// Application store, routed toward the payload's managers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutData {
    /// Application-level type of the payload.
    pub data_tag: u32,
    /// Opaque payload; the overlay never interprets it.
    pub payload: Vec<u8>,
}

impl WireEncode for PutData {
    fn encode(&self, buf: &mut BytesMut) {
        self.data_tag.encode(buf);
        self.payload.encode(buf);
    }
}

impl WireDecode for PutData {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            data_tag: u32::decode(buf)?,
            payload: Vec::<u8>::decode(buf)?,
        })
    }
}

/// Reply to a [`PutData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutDataResponse {
    /// Zero on success, an application error code otherwise.
    pub status: u32,
}

impl WireEncode for PutDataResponse {
    fn encode(&self, buf: &mut BytesMut) {
        self.status.encode(buf);
    }
}

impl WireDecode for PutDataResponse {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            status: u32::decode(buf)?,
        })
    }
}

/// Application one-way message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Application-level type of the payload.
    pub data_tag: u32,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

impl WireEncode for Post {
    fn encode(&self, buf: &mut BytesMut) {
        self.data_tag.encode(buf);
        self.payload.encode(buf);
    }
}

impl WireDecode for Post {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            data_tag: u32::decode(buf)?,
            payload: Vec::<u8>::decode(buf)?,
        })
    }
}

/// A decoded message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Join offer
    Connect(Connect),
    /// Join reply
    ConnectResponse(ConnectResponse),
    /// Group probe
    FindGroup(FindGroup),
    /// Group probe reply
    FindGroupResponse(FindGroupResponse),
    /// Application fetch
    GetData(GetData),
    /// Application fetch reply
    GetDataResponse(GetDataResponse),
    /// Application store
    PutData(PutData),
    /// Application store reply
    PutDataResponse(PutDataResponse),
    /// Application one-way message
    Post(Post),
}

impl MessageBody {
    /// Returns the tag for this body.
    pub fn tag(&self) -> MessageTypeTag {
        match self {
            MessageBody::Connect(_) => MessageTypeTag::Connect,
            MessageBody::ConnectResponse(_) => MessageTypeTag::ConnectResponse,
            MessageBody::FindGroup(_) => MessageTypeTag::FindGroup,
            MessageBody::FindGroupResponse(_) => MessageTypeTag::FindGroupResponse,
            MessageBody::GetData(_) => MessageTypeTag::GetData,
            MessageBody::GetDataResponse(_) => MessageTypeTag::GetDataResponse,
            MessageBody::PutData(_) => MessageTypeTag::PutData,
            MessageBody::PutDataResponse(_) => MessageTypeTag::PutDataResponse,
            MessageBody::Post(_) => MessageTypeTag::Post,
        }
    }

    /// Encodes the body without its tag.
    ///
    /// This is the byte range signatures are computed over.
    pub fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            MessageBody::Connect(b) => b.encode(buf),
            MessageBody::ConnectResponse(b) => b.encode(buf),
            MessageBody::FindGroup(b) => b.encode(buf),
            MessageBody::FindGroupResponse(b) => b.encode(buf),
            MessageBody::GetData(b) => b.encode(buf),
            MessageBody::GetDataResponse(b) => b.encode(buf),
            MessageBody::PutData(b) => b.encode(buf),
            MessageBody::PutDataResponse(b) => b.encode(buf),
            MessageBody::Post(b) => b.encode(buf),
        }
    }

    /// Returns the signable byte form of the body.
    pub fn signable_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_body(&mut buf);
        buf.freeze()
    }

    /// Decodes a body of the given tag.
    pub fn decode_tagged(tag: MessageTypeTag, buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(match tag {
            MessageTypeTag::Connect => MessageBody::Connect(Connect::decode(buf)?),
            MessageTypeTag::ConnectResponse => {
                MessageBody::ConnectResponse(ConnectResponse::decode(buf)?)
            }
            MessageTypeTag::FindGroup => MessageBody::FindGroup(FindGroup::decode(buf)?),
            MessageTypeTag::FindGroupResponse => {
                MessageBody::FindGroupResponse(FindGroupResponse::decode(buf)?)
            }
            MessageTypeTag::GetData => MessageBody::GetData(GetData::decode(buf)?),
            MessageTypeTag::GetDataResponse => {
                MessageBody::GetDataResponse(GetDataResponse::decode(buf)?)
            }
            MessageTypeTag::PutData => MessageBody::PutData(PutData::decode(buf)?),
            MessageTypeTag::PutDataResponse => {
                MessageBody::PutDataResponse(PutDataResponse::decode(buf)?)
            }
            MessageTypeTag::Post => MessageBody::Post(Post::decode(buf)?),
        })
    }
}

/// Serialises a complete frame: `header || tag || body`.
pub fn serialise(header: &MessageHeader, body: &MessageBody) -> Bytes {
    let mut buf = BytesMut::new();
    header.encode(&mut buf);
    body.tag().encode(&mut buf);
    body.encode_body(&mut buf);
    buf.freeze()
}

/// A received frame with the header and tag parsed and the body kept
/// as raw bytes.
///
/// Forwarding resends the original bytes untouched; the body is only
/// decoded when the local node terminates the message, and signatures
/// are verified over the exact received body bytes.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The parsed header.
    pub header: MessageHeader,
    /// The parsed message tag.
    pub tag: MessageTypeTag,
    body: Bytes,
}

impl Envelope {
    /// Parses the header and tag of a frame, retaining the body raw.
    pub fn parse(frame: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = Bytes::copy_from_slice(frame);
        let header = MessageHeader::decode(&mut buf)?;
        let tag = MessageTypeTag::decode(&mut buf)?;
        Ok(Self {
            header,
            tag,
            body: buf,
        })
    }

    /// Returns the raw body bytes (the signed range).
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Decodes the body according to the frame's tag.
    pub fn parse_body(&self) -> Result<MessageBody, DecodeError> {
        let mut buf = self.body.clone();
        MessageBody::decode_tagged(self.tag, &mut buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::header::{Authority, DestinationAddress};
    use weft_core::NodeIdentity;

    fn endpoints() -> EndpointPair {
        EndpointPair::new(
            Endpoint::new("192.168.0.2".parse().unwrap(), 5483),
            Endpoint::new("203.0.113.9".parse().unwrap(), 5483),
        )
    }

    fn header_for(body: &MessageBody) -> MessageHeader {
        let identity = NodeIdentity::generate();
        MessageHeader::signed(
            DestinationAddress::node(Address::random()),
            SourceAddress::direct(Address::random()),
            42,
            Authority::Node,
            identity.sign(&body.signable_bytes()),
        )
    }

    fn roundtrip(body: MessageBody) {
        let header = header_for(&body);
        let frame = serialise(&header, &body);

        let envelope = Envelope::parse(&frame).unwrap();
        assert_eq!(envelope.header, header);
        assert_eq!(envelope.tag, body.tag());
        assert_eq!(envelope.parse_body().unwrap(), body);
    }

    #[test]
    fn connect_roundtrip() {
        let identity = NodeIdentity::generate();
        roundtrip(MessageBody::Connect(Connect {
            requester_endpoints: endpoints(),
            requester_id: identity.address(),
            receiver_id: Address::random(),
            requester_public_key: identity.public_key(),
        }));
    }

    #[test]
    fn connect_response_roundtrip() {
        let identity = NodeIdentity::generate();
        roundtrip(MessageBody::ConnectResponse(ConnectResponse {
            requester_endpoints: endpoints(),
            receiver_endpoints: endpoints(),
            requester_id: Address::random(),
            receiver_id: identity.address(),
            receiver_public_key: identity.public_key(),
        }));
    }

    #[test]
    fn find_group_roundtrip() {
        roundtrip(MessageBody::FindGroup(FindGroup {
            target_id: Address::random(),
            requester_id: Address::random(),
        }));
    }

    #[test]
    fn find_group_response_roundtrip() {
        let group = (0..8)
            .map(|_| NodeIdentity::generate().public_key())
            .collect();
        roundtrip(MessageBody::FindGroupResponse(FindGroupResponse {
            target_id: Address::random(),
            group,
        }));
    }

    #[test]
    fn data_bodies_roundtrip() {
        roundtrip(MessageBody::GetData(GetData {
            data_tag: 3,
            name: Identity::random(),
            from: SourceAddress::direct(Address::random()),
        }));
        roundtrip(MessageBody::GetDataResponse(GetDataResponse {
            name: Identity::random(),
            data: Some(vec![1, 2, 3]),
            from: SourceAddress::direct(Address::random()),
        }));
        roundtrip(MessageBody::PutData(PutData {
            data_tag: 1,
            payload: vec![0xAB; 100],
        }));
        roundtrip(MessageBody::PutDataResponse(PutDataResponse { status: 0 }));
        roundtrip(MessageBody::Post(Post {
            data_tag: 9,
            payload: b"functor".to_vec(),
        }));
    }

    #[test]
    fn tag_values_are_the_closed_set() {
        assert_eq!(MessageTypeTag::Connect.tag(), 0);
        assert_eq!(MessageTypeTag::Post.tag(), 8);
        assert!(MessageTypeTag::from_tag(9).is_err());
    }

    #[test]
    fn malformed_frame_fails_closed() {
        assert!(Envelope::parse(&[0x01, 0x02]).is_err());

        // Valid header, garbage tag.
        let header = MessageHeader::new(
            DestinationAddress::node(Address::random()),
            SourceAddress::direct(Address::random()),
            1,
            Authority::Node,
        );
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        99u32.encode(&mut buf);
        assert!(Envelope::parse(&buf).is_err());
    }

    #[test]
    fn signature_covers_exact_body_bytes() {
        let identity = NodeIdentity::generate();
        let body = MessageBody::FindGroupResponse(FindGroupResponse {
            target_id: Address::random(),
            group: vec![identity.public_key()],
        });
        let signature = identity.sign(&body.signable_bytes());
        let header = MessageHeader::signed(
            DestinationAddress::node(Address::random()),
            SourceAddress::group(identity.address(), Address::random()),
            5,
            Authority::NaeManager,
            signature,
        );

        let frame = serialise(&header, &body);
        let envelope = Envelope::parse(&frame).unwrap();
        assert!(identity
            .public_key()
            .verify(envelope.body_bytes(), &envelope.header.signature.unwrap())
            .is_ok());
    }
}
