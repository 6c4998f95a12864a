//! The seam between the overlay core and the application built on it.

use weft_core::Identity;
use weft_net::CloseGroupDifference;
use weft_proto::{Authority, MessageBody, MessageTypeTag, SourceAddress};

/// What the application wants done with a `GetData` it was offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    /// Let the request travel on; someone closer will answer.
    Forward,
    /// Answer it with this payload.
    Reply(Vec<u8>),
}

/// Callbacks the node controller delivers into the application.
///
/// The core never interprets application payloads; everything that
/// terminates at this node and is not overlay housekeeping lands here.
pub trait Application: Send + Sync + 'static {
    /// An application message terminated at this node.
    fn on_message(
        &self,
        source: SourceAddress,
        authority: Authority,
        tag: MessageTypeTag,
        body: MessageBody,
    );

    /// The close group changed.
    fn on_churn(&self, diff: CloseGroupDifference);

    /// A `GetData` reached this node; decide what to do with it.
    fn on_get(
        &self,
        source: SourceAddress,
        authority: Authority,
        data_tag: u32,
        name: Identity,
    ) -> Option<GetOutcome>;
}
