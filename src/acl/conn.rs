use std::sync::Arc;

use structbuf::StructBuf;
use tracing::info;

use crate::hci::{AclTransport, ConnHandle, Direction};
use crate::l2cap::{ChannelManager, Cid, PduAllocator, SignalingChannel};

use super::recombine::RecombinationBuffer;
use super::{Error, Result};

/// State for one tracked ACL connection: the proxy's in-flight packet count
/// and the per-direction recombination slots, plus the fixed signaling
/// endpoints created with the connection.
#[derive(Debug)]
pub(super) struct AclConnection {
    transport: AclTransport,
    handle: ConnHandle,
    num_pending_packets: u16,
    recombination: [Option<RecombinationBuffer>; 2],
    leu_signaling: Arc<SignalingChannel>,
    aclu_signaling: Arc<SignalingChannel>,
}

impl AclConnection {
    #[must_use]
    pub fn new(
        transport: AclTransport,
        handle: ConnHandle,
        manager: &Arc<dyn ChannelManager>,
    ) -> Self {
        info!("New {transport} connection {handle}");
        Self {
            transport,
            handle,
            num_pending_packets: 0,
            recombination: [None, None],
            leu_signaling: SignalingChannel::new(Arc::clone(manager), handle, Cid::LE_SIGNAL),
            aclu_signaling: SignalingChannel::new(Arc::clone(manager), handle, Cid::SIGNAL),
        }
    }

    #[inline]
    #[must_use]
    pub const fn transport(&self) -> AclTransport {
        self.transport
    }

    #[inline]
    #[must_use]
    pub const fn handle(&self) -> ConnHandle {
        self.handle
    }

    #[inline]
    #[must_use]
    pub const fn num_pending_packets(&self) -> u16 {
        self.num_pending_packets
    }

    #[inline]
    pub fn set_num_pending_packets(&mut self, n: u16) {
        self.num_pending_packets = n;
    }

    /// Returns the signaling endpoint matching the connection's transport.
    #[must_use]
    pub fn signaling_channel(&self) -> &Arc<SignalingChannel> {
        match self.transport {
            AclTransport::BrEdr => &self.aclu_signaling,
            AclTransport::Le => &self.leu_signaling,
        }
    }

    #[inline]
    #[must_use]
    pub fn recombination_active(&self, direction: Direction) -> bool {
        self.recombination[direction.idx()].is_some()
    }

    /// Starts accumulating a fragmented frame of `size` total bytes.
    pub fn start_recombination(
        &mut self,
        direction: Direction,
        alloc: &dyn PduAllocator,
        size: usize,
    ) -> Result<()> {
        if self.recombination_active(direction) {
            return Err(Error::RecombinationActive);
        }
        let buf = RecombinationBuffer::create(alloc, size).ok_or(Error::RecombinationAlloc)?;
        self.recombination[direction.idx()] = Some(buf);
        Ok(())
    }

    /// Appends one fragment payload to the active slot. Returns the whole
    /// frame once the last fragment arrives, ending recombination.
    pub fn recombine_fragment(
        &mut self,
        direction: Direction,
        data: &[u8],
    ) -> Result<Option<StructBuf>> {
        let Some(buf) = self.recombination[direction.idx()].as_mut() else {
            return Err(Error::RecombinationInactive);
        };
        buf.write(data)?;
        if !buf.is_complete() {
            return Ok(None);
        }
        let pdu = buf.take();
        self.end_recombination(direction);
        Ok(Some(pdu))
    }

    /// Discards any partially assembled frame. Idempotent.
    #[inline]
    pub fn end_recombination(&mut self, direction: Direction) {
        self.recombination[direction.idx()] = None;
    }
}
