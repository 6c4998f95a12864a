//! The sentinel: accumulates signed claims for group-authority
//! messages and emits a verdict once a quorum agrees.
//!
//! A group message is only believed when at least `quorum` distinct
//! members of the speaking group have sent byte-identical content,
//! each under a valid signature, within a bounded window. Messages
//! from a single node bypass the sentinel entirely.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::warn;
use weft_core::{wide_hash, Address, PublicKey, Signature};

use crate::{DEFAULT_GROUP_SIZE, DEFAULT_QUORUM, SENTINEL_WINDOW};

/// Outcome of a resolved accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A quorum agreed on one content digest.
    Accept,
    /// A whole group's worth of claims arrived with no agreement.
    Reject,
}

/// Sentinel tunables.
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    /// Matching signatures required to accept (Q).
    pub quorum: usize,
    /// Claimants that exhaust a key without agreement (G).
    pub group_size: usize,
    /// How long claims for one key are accumulated.
    pub window: Duration,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            quorum: DEFAULT_QUORUM,
            group_size: DEFAULT_GROUP_SIZE,
            window: SENTINEL_WINDOW,
        }
    }
}

/// Accumulation key: the speaking group (or node) and the message id.
pub type SentinelKey = (Address, u32);

struct Claim {
    claimant: Address,
    digest: [u8; 64],
}

struct Accumulation {
    opened: Instant,
    resolved: bool,
    claims: Vec<Claim>,
}

/// Quorum accumulator for group-authority messages.
pub struct Sentinel {
    config: SentinelConfig,
    pending: HashMap<SentinelKey, Accumulation>,
}

impl Sentinel {
    /// Creates a sentinel with the given thresholds.
    pub fn new(config: SentinelConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
        }
    }

    /// Submits one member's copy of a group message.
    ///
    /// The signature must verify over `content` with `public_key`, and
    /// `claimant` must be the address derived from that key; claims
    /// failing either are discarded. Returns a verdict the first time
    /// the key resolves, `None` while the quorum is still assembling
    /// or after it has already resolved.
    pub fn add(
        &mut self,
        key: SentinelKey,
        claimant: Address,
        public_key: &PublicKey,
        content: &[u8],
        signature: &Signature,
    ) -> Option<Verdict> {
        let window = self.config.window;
        self.pending.retain(|_, acc| acc.opened.elapsed() < window);

        if Address::from_public_key(public_key) != claimant {
            warn!(%claimant, "sentinel claim under a key that is not the claimant's");
            return None;
        }
        if public_key.verify(content, signature).is_err() {
            warn!(%claimant, "sentinel claim with bad signature");
            return None;
        }

        let acc = self.pending.entry(key).or_insert_with(|| Accumulation {
            opened: Instant::now(),
            resolved: false,
            claims: Vec::new(),
        });
        if acc.resolved {
            return None;
        }
        if acc.claims.iter().any(|c| c.claimant == claimant) {
            return None;
        }
        acc.claims.push(Claim {
            claimant,
            digest: wide_hash(content),
        });

        let digest = wide_hash(content);
        let agreeing = acc.claims.iter().filter(|c| c.digest == digest).count();
        if agreeing >= self.config.quorum {
            acc.resolved = true;
            return Some(Verdict::Accept);
        }
        if acc.claims.len() >= self.config.group_size {
            acc.resolved = true;
            return Some(Verdict::Reject);
        }
        None
    }

    /// Returns the number of keys still accumulating.
    pub fn pending(&self) -> usize {
        self.pending.values().filter(|a| !a.resolved).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::NodeIdentity;

    fn sentinel(quorum: usize, group: usize) -> Sentinel {
        Sentinel::new(SentinelConfig {
            quorum,
            group_size: group,
            window: Duration::from_secs(60),
        })
    }

    fn claim(
        s: &mut Sentinel,
        key: SentinelKey,
        identity: &NodeIdentity,
        content: &[u8],
    ) -> Option<Verdict> {
        let signature = identity.sign(content);
        s.add(
            key,
            identity.address(),
            &identity.public_key(),
            content,
            &signature,
        )
    }

    #[test]
    fn accepts_at_quorum() {
        let mut s = sentinel(3, 8);
        let key = (Address::random(), 1);
        let members: Vec<NodeIdentity> = (0..3).map(|_| NodeIdentity::generate()).collect();

        assert_eq!(claim(&mut s, key, &members[0], b"payload"), None);
        assert_eq!(claim(&mut s, key, &members[1], b"payload"), None);
        assert_eq!(
            claim(&mut s, key, &members[2], b"payload"),
            Some(Verdict::Accept)
        );
    }

    #[test]
    fn resolves_only_once() {
        let mut s = sentinel(2, 8);
        let key = (Address::random(), 1);
        let a = NodeIdentity::generate();
        let b = NodeIdentity::generate();
        let c = NodeIdentity::generate();

        claim(&mut s, key, &a, b"x");
        assert_eq!(claim(&mut s, key, &b, b"x"), Some(Verdict::Accept));
        assert_eq!(claim(&mut s, key, &c, b"x"), None);
    }

    #[test]
    fn duplicate_claimant_counts_once() {
        let mut s = sentinel(2, 8);
        let key = (Address::random(), 1);
        let a = NodeIdentity::generate();

        assert_eq!(claim(&mut s, key, &a, b"x"), None);
        assert_eq!(claim(&mut s, key, &a, b"x"), None);
        assert_eq!(s.pending(), 1);
    }

    #[test]
    fn rejects_when_group_exhausted_without_agreement() {
        let mut s = sentinel(3, 4);
        let key = (Address::random(), 1);
        let members: Vec<NodeIdentity> = (0..4).map(|_| NodeIdentity::generate()).collect();

        assert_eq!(claim(&mut s, key, &members[0], b"a"), None);
        assert_eq!(claim(&mut s, key, &members[1], b"b"), None);
        assert_eq!(claim(&mut s, key, &members[2], b"c"), None);
        assert_eq!(
            claim(&mut s, key, &members[3], b"d"),
            Some(Verdict::Reject)
        );
    }

    #[test]
    fn bad_signature_is_discarded() {
        let mut s = sentinel(1, 8);
        let key = (Address::random(), 1);
        let a = NodeIdentity::generate();

        let signature = a.sign(b"other content");
        assert_eq!(
            s.add(key, a.address(), &a.public_key(), b"content", &signature),
            None
        );
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn claimant_must_own_the_key() {
        let mut s = sentinel(1, 8);
        let key = (Address::random(), 1);
        let a = NodeIdentity::generate();

        let signature = a.sign(b"content");
        // Claimed address does not match the signing key.
        assert_eq!(
            s.add(
                key,
                Address::random(),
                &a.public_key(),
                b"content",
                &signature
            ),
            None
        );
    }

    #[test]
    fn window_expires_stale_accumulations() {
        let mut s = Sentinel::new(SentinelConfig {
            quorum: 2,
            group_size: 8,
            window: Duration::from_millis(20),
        });
        let key = (Address::random(), 1);
        let a = NodeIdentity::generate();
        let b = NodeIdentity::generate();

        claim(&mut s, key, &a, b"x");
        std::thread::sleep(Duration::from_millis(30));
        // The first claim has aged out; this starts a new accumulation.
        assert_eq!(claim(&mut s, key, &b, b"x"), None);
        assert_eq!(s.pending(), 1);
    }
}
