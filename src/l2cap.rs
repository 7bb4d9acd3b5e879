//! Logical Link Control and Adaptation Protocol interfaces ([Vol 3] Part A).
//!
//! The proxy does not run an L2CAP state machine of its own; it owns a
//! registry of channels (the [`ChannelManager`]) implemented by the embedding
//! system and per-connection signaling endpoints whose internals live
//! elsewhere. This module defines those seams plus the small wire pieces the
//! ACL data channel needs to classify traffic.

use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use nameof::name_of_type;
use structbuf::{StructBuf, Unpacker};

use crate::hci::ConnHandle;

/// Basic L2CAP header size ([Vol 3] Part A, Section 3).
pub const L2CAP_HDR: usize = 4;

/// Channel identifier ([Vol 3] Part A, Section 2.1).
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Cid(u16);

impl Cid {
    /// BR/EDR (ACL-U) signaling channel.
    pub const SIGNAL: Self = Self(0x0001);
    /// LE-U signaling channel.
    pub const LE_SIGNAL: Self = Self(0x0005);

    /// Wraps a raw CID.
    #[inline]
    #[must_use]
    pub const fn from_raw(v: u16) -> Self {
        Self(v)
    }
}

impl From<Cid> for u16 {
    #[inline]
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

impl Debug for Cid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#06X})", name_of_type!(Cid), self.0)
    }
}

impl Display for Cid {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Basic L2CAP header ([Vol 3] Part A, Section 3.1).
#[derive(Clone, Copy, Debug)]
pub struct BasicHeader {
    pub pdu_length: u16,
    pub channel_id: Cid,
}

impl BasicHeader {
    /// Parses the basic header at the start of an L2CAP frame, or `None` if
    /// `frame` is too short to contain one.
    #[must_use]
    pub fn parse(frame: &[u8]) -> Option<Self> {
        let mut p = Unpacker::new(frame);
        let (len, cid) = (p.u16(), p.u16());
        p.is_ok().then(|| Self {
            pdu_length: len,
            channel_id: Cid::from_raw(cid),
        })
    }

    /// Total frame length described by the header.
    #[inline]
    #[must_use]
    pub fn frame_len(&self) -> usize {
        L2CAP_HDR + usize::from(self.pdu_length)
    }
}

/// Source of contiguous receive buffers for PDU recombination.
pub trait PduAllocator: Debug + Send + Sync {
    /// Allocates a buffer bounded to exactly `size` bytes, or `None` when the
    /// allocation cannot be satisfied. Storage is contiguous so a finished
    /// frame can be handed onward as a single span.
    fn alloc(&self, size: usize) -> Option<StructBuf>;
}

/// One of the proxy's L2CAP channel endpoints.
pub trait Channel: Debug + Send + Sync {
    /// Returns the allocator backing inbound recombination, or `None` if the
    /// channel cannot accept fragmented frames.
    fn rx_allocator(&self) -> Option<&dyn PduAllocator>;

    /// Handles a complete PDU travelling from the controller. Returns whether
    /// the channel consumed it.
    fn handle_pdu_from_controller(&self, pdu: &[u8]) -> bool;

    /// Handles a complete PDU travelling from the host. Returns whether the
    /// channel consumed it.
    fn handle_pdu_from_host(&self, pdu: &[u8]) -> bool;
}

/// Registry of the proxy's L2CAP channels, implemented by the embedding
/// system. The registry outlives every tracked connection.
pub trait ChannelManager: Debug + Send + Sync {
    /// Looks up a channel by the CID it receives on.
    fn find_channel_by_local_cid(&self, handle: ConnHandle, cid: Cid) -> Option<Arc<dyn Channel>>;

    /// Looks up a channel by the CID the peer receives on.
    fn find_channel_by_remote_cid(&self, handle: ConnHandle, cid: Cid) -> Option<Arc<dyn Channel>>;

    /// Tears down channel state for a disconnected link.
    fn handle_disconnection_complete(&self, handle: ConnHandle);

    /// Flushes PDUs that queued while send credits were unavailable. Called
    /// without the proxy lock held; implementations may call back into the
    /// send path.
    fn drain_channel_queues(&self);

    /// Publishes the controller's maximum LE ACL payload size.
    fn set_le_acl_data_packet_length(&self, len: u16);
}

/// Fixed signaling endpoint owned by a tracked ACL connection
/// ([Vol 3] Part A, Section 4). The endpoint reports to the channel manager;
/// its protocol logic lives with the manager, not the proxy core.
#[derive(Debug)]
pub struct SignalingChannel {
    manager: Arc<dyn ChannelManager>,
    handle: ConnHandle,
    local_cid: Cid,
}

impl SignalingChannel {
    #[must_use]
    pub(crate) fn new(
        manager: Arc<dyn ChannelManager>,
        handle: ConnHandle,
        local_cid: Cid,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            handle,
            local_cid,
        })
    }

    /// Returns the CID this endpoint receives on.
    #[inline]
    #[must_use]
    pub fn local_cid(&self) -> Cid {
        self.local_cid
    }

    /// Returns the connection carrying this endpoint.
    #[inline]
    #[must_use]
    pub fn connection_handle(&self) -> ConnHandle {
        self.handle
    }

    /// Returns the channel manager this endpoint reports to.
    #[inline]
    #[must_use]
    pub fn channel_manager(&self) -> &dyn ChannelManager {
        &*self.manager
    }
}
