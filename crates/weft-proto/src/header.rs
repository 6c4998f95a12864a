//! Message header: where a message is going, where it came from, and
//! with what authority.

use bytes::{Bytes, BytesMut};
use weft_core::{Address, DecodeError, Signature, WireDecode, WireEncode};

/// Per-node message counter; wraps on overflow.
pub type MessageId = u32;

/// The role a sender claims, derived from the relative positions of
/// source, destination and the local close group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum Authority {
    /// A client attached to the overlay without a routing table.
    Client = 0,
    /// The close group of a client, acting for it.
    ClientManager = 1,
    /// The close group of a data item's name.
    NaeManager = 2,
    /// The close group of a node, acting on it.
    NodeManager = 3,
    /// A node addressed by its own managers.
    ManagedNode = 4,
    /// A plain routing node.
    Node = 5,
}

impl Authority {
    /// Returns the wire tag.
    pub fn tag(&self) -> u32 {
        *self as u32
    }

    /// Creates from a wire tag.
    pub fn from_tag(tag: u32) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(Authority::Client),
            1 => Ok(Authority::ClientManager),
            2 => Ok(Authority::NaeManager),
            3 => Ok(Authority::NodeManager),
            4 => Ok(Authority::ManagedNode),
            5 => Ok(Authority::Node),
            _ => Err(DecodeError::InvalidEnumTag(tag)),
        }
    }
}

impl WireEncode for Authority {
    fn encode(&self, buf: &mut BytesMut) {
        self.tag().encode(buf);
    }
}

impl WireDecode for Authority {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Self::from_tag(u32::decode(buf)?)
    }
}

/// Where a message is headed.
///
/// `reply_to` is set on responses to a relayed client: the address the
/// relaying node should hand the message to once it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DestinationAddress {
    /// The routed destination.
    pub address: Address,
    /// Relay target for a client attached behind the destination.
    pub reply_to: Option<Address>,
}

impl DestinationAddress {
    /// Destination of an ordinary routed message.
    pub fn node(address: Address) -> Self {
        Self {
            address,
            reply_to: None,
        }
    }

    /// Destination of a response that must be relayed onward.
    pub fn relayed(address: Address, reply_to: Address) -> Self {
        Self {
            address,
            reply_to: Some(reply_to),
        }
    }
}

impl WireEncode for DestinationAddress {
    fn encode(&self, buf: &mut BytesMut) {
        self.address.encode(buf);
        self.reply_to.encode(buf);
    }
}

impl WireDecode for DestinationAddress {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            address: Address::decode(buf)?,
            reply_to: Option::<Address>::decode(buf)?,
        })
    }
}

/// Where a message came from.
///
/// `group` is set when the message speaks for a close group rather
/// than a single node. `reply_to` is set when the named node is
/// relaying on behalf of a non-routing client attached to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceAddress {
    /// The node that put the message on the wire.
    pub node: Address,
    /// The group the message speaks for, if any.
    pub group: Option<Address>,
    /// The attached client the message was relayed for, if any.
    pub reply_to: Option<Address>,
}

impl SourceAddress {
    /// Source of a message sent by a node in its own right.
    pub fn direct(node: Address) -> Self {
        Self {
            node,
            group: None,
            reply_to: None,
        }
    }

    /// Source of a message sent on behalf of a close group.
    pub fn group(node: Address, group: Address) -> Self {
        Self {
            node,
            group: Some(group),
            reply_to: None,
        }
    }

    /// Source of a message relayed through `node` for a client.
    pub fn relayed(node: Address, client: Address) -> Self {
        Self {
            node,
            group: None,
            reply_to: Some(client),
        }
    }
}

impl WireEncode for SourceAddress {
    fn encode(&self, buf: &mut BytesMut) {
        self.node.encode(buf);
        self.group.encode(buf);
        self.reply_to.encode(buf);
    }
}

impl WireDecode for SourceAddress {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            node: Address::decode(buf)?,
            group: Option::<Address>::decode(buf)?,
            reply_to: Option::<Address>::decode(buf)?,
        })
    }
}

/// The typed envelope header carried by every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageHeader {
    /// Where the message is headed.
    pub destination: DestinationAddress,
    /// Where it came from.
    pub source: SourceAddress,
    /// The sender's message counter value.
    pub message_id: MessageId,
    /// The claimed authority.
    pub authority: Authority,
    /// Detached signature over the body, when the tag requires one.
    pub signature: Option<Signature>,
}

impl MessageHeader {
    /// Creates an unsigned header.
    pub fn new(
        destination: DestinationAddress,
        source: SourceAddress,
        message_id: MessageId,
        authority: Authority,
    ) -> Self {
        Self {
            destination,
            source,
            message_id,
            authority,
            signature: None,
        }
    }

    /// Creates a header carrying a body signature.
    pub fn signed(
        destination: DestinationAddress,
        source: SourceAddress,
        message_id: MessageId,
        authority: Authority,
        signature: Signature,
    ) -> Self {
        Self {
            destination,
            source,
            message_id,
            authority,
            signature: Some(signature),
        }
    }

    /// Returns the key the duplicate filter uses for this message.
    pub fn filter_value(&self) -> (Address, MessageId) {
        (self.source.node, self.message_id)
    }

    /// Returns the node the message came from.
    pub fn from_node(&self) -> Address {
        self.source.node
    }

    /// Returns the group the message speaks for, if any.
    pub fn from_group(&self) -> Option<Address> {
        self.source.group
    }

    /// Returns true when a relaying node must hand this message to an
    /// attached client.
    pub fn relayed(&self) -> bool {
        self.destination.reply_to.is_some()
    }

    /// Returns the attached client a relaying node must deliver to.
    pub fn reply_to(&self) -> Option<Address> {
        self.destination.reply_to
    }

    /// Builds the destination a response to this message should carry.
    ///
    /// Replies always route toward the sending node; when the message
    /// was relayed for a client, the client rides along as the
    /// hand-off hint for the relaying node.
    pub fn return_destination(&self) -> DestinationAddress {
        match self.source.reply_to {
            Some(reply_to) => DestinationAddress::relayed(self.source.node, reply_to),
            None => DestinationAddress::node(self.source.node),
        }
    }
}

impl WireEncode for MessageHeader {
    fn encode(&self, buf: &mut BytesMut) {
        self.destination.encode(buf);
        self.source.encode(buf);
        self.message_id.encode(buf);
        self.authority.encode(buf);
        self.signature.encode(buf);
    }
}

impl WireDecode for MessageHeader {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            destination: DestinationAddress::decode(buf)?,
            source: SourceAddress::decode(buf)?,
            message_id: MessageId::decode(buf)?,
            authority: Authority::decode(buf)?,
            signature: Option::<Signature>::decode(buf)?,
        })
    }
}
