//! Endpoints and peer records.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Bytes, BytesMut};
use weft_core::{Address, DecodeError, PublicKey, WireDecode, WireEncode};

/// A transport endpoint: an IP address and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Endpoint(pub SocketAddr);

const IPV4_TAG: u8 = 4;
const IPV6_TAG: u8 = 6;

impl Endpoint {
    /// Creates an endpoint from an address and port.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port))
    }

    /// The unspecified endpoint, used before any address is known.
    pub fn unspecified() -> Self {
        Self(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))
    }

    /// Returns true if no address has been filled in yet.
    pub fn is_unspecified(&self) -> bool {
        self.0.ip().is_unspecified() && self.0.port() == 0
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl WireEncode for Endpoint {
    fn encode(&self, buf: &mut BytesMut) {
        match self.0.ip() {
            IpAddr::V4(ip) => {
                IPV4_TAG.encode(buf);
                ip.octets().encode(buf);
            }
            IpAddr::V6(ip) => {
                IPV6_TAG.encode(buf);
                ip.octets().encode(buf);
            }
        }
        self.0.port().encode(buf);
    }
}

impl WireDecode for Endpoint {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let ip = match u8::decode(buf)? {
            IPV4_TAG => IpAddr::V4(Ipv4Addr::from(<[u8; 4]>::decode(buf)?)),
            IPV6_TAG => IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::decode(buf)?)),
            other => return Err(DecodeError::InvalidEnumTag(other as u32)),
        };
        let port = u16::decode(buf)?;
        Ok(Self(SocketAddr::new(ip, port)))
    }
}

/// The two endpoints a node is reachable on: behind and in front of NAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EndpointPair {
    /// Endpoint on the local network.
    pub local: Endpoint,
    /// Endpoint as seen from outside.
    pub external: Endpoint,
}

impl EndpointPair {
    /// Creates a pair from explicit endpoints.
    pub fn new(local: Endpoint, external: Endpoint) -> Self {
        Self { local, external }
    }

    /// A pair with both endpoints unspecified.
    pub fn unspecified() -> Self {
        Self {
            local: Endpoint::unspecified(),
            external: Endpoint::unspecified(),
        }
    }
}

impl Default for EndpointPair {
    fn default() -> Self {
        Self::unspecified()
    }
}

impl WireEncode for EndpointPair {
    fn encode(&self, buf: &mut BytesMut) {
        self.local.encode(buf);
        self.external.encode(buf);
    }
}

impl WireDecode for EndpointPair {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            local: Endpoint::decode(buf)?,
            external: Endpoint::decode(buf)?,
        })
    }
}

/// An authenticated peer held in the routing table.
///
/// Created on successful handshake, destroyed when the peer is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Overlay address of the peer.
    pub id: Address,
    /// The peer's public identity key.
    pub public_key: PublicKey,
    /// Where the peer is reachable.
    pub endpoints: EndpointPair,
    /// Whether the peer participates in routing (clients do not).
    pub routing: bool,
}

impl NodeInfo {
    /// Creates a routing peer record.
    pub fn new(id: Address, public_key: PublicKey, endpoints: EndpointPair) -> Self {
        Self {
            id,
            public_key,
            endpoints,
            routing: true,
        }
    }
}

/// Persisted form of a bootstrap peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Contact {
    /// Overlay address of the seed.
    pub id: Address,
    /// Where the seed was last reachable.
    pub endpoints: EndpointPair,
}

impl Contact {
    /// Creates a contact record.
    pub fn new(id: Address, endpoints: EndpointPair) -> Self {
        Self { id, endpoints }
    }
}

impl WireEncode for Contact {
    fn encode(&self, buf: &mut BytesMut) {
        self.id.encode(buf);
        self.endpoints.encode(buf);
    }
}

impl WireDecode for Contact {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            id: Address::decode(buf)?,
            endpoints: EndpointPair::decode(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_v4_roundtrip() {
        let ep = Endpoint::new("1.2.3.4".parse().unwrap(), 5000);
        let decoded = Endpoint::from_bytes(&ep.to_vec()).unwrap();
        assert_eq!(decoded, ep);
        // tag + 4 octets + port
        assert_eq!(ep.to_vec().len(), 1 + 4 + 2);
    }

    #[test]
    fn endpoint_v6_roundtrip() {
        let ep = Endpoint::new("::1".parse().unwrap(), 443);
        let decoded = Endpoint::from_bytes(&ep.to_vec()).unwrap();
        assert_eq!(decoded, ep);
        assert_eq!(ep.to_vec().len(), 1 + 16 + 2);
    }

    #[test]
    fn endpoint_rejects_unknown_family() {
        assert!(matches!(
            Endpoint::from_bytes(&[9, 0, 0]),
            Err(DecodeError::InvalidEnumTag(9))
        ));
    }

    #[test]
    fn unspecified_endpoint() {
        assert!(Endpoint::unspecified().is_unspecified());
        assert!(!Endpoint::new("1.2.3.4".parse().unwrap(), 1).is_unspecified());
    }

    #[test]
    fn contact_roundtrip() {
        let contact = Contact::new(
            Address::random(),
            EndpointPair::new(
                Endpoint::new("192.168.1.10".parse().unwrap(), 5483),
                Endpoint::new("203.0.113.7".parse().unwrap(), 5483),
            ),
        );
        let decoded = Contact::from_bytes(&contact.to_vec()).unwrap();
        assert_eq!(decoded, contact);
    }
}
