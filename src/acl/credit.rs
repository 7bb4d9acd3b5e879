use std::sync::Arc;

use crate::hci::AclTransport;
use crate::SyncMutex;

use super::State;

/// Reservation of one controller buffer slot for a proxy-originated ACL
/// packet, handed out by [`AclDataChannel::reserve_send_credit`].
///
/// Exactly one of two things happens to a credit: the send path consumes it
/// when a packet is irrevocably queued to the controller, or dropping it
/// returns the reservation to its pool. Moving the credit moves the release
/// obligation with it.
///
/// [`AclDataChannel::reserve_send_credit`]: super::AclDataChannel::reserve_send_credit
#[derive(Debug)]
#[must_use = "an unused credit should be dropped to release its reservation"]
pub struct SendCredit {
    transport: AclTransport,
    /// Release hook; `None` once the credit is consumed.
    pool: Option<Arc<SyncMutex<State>>>,
}

impl SendCredit {
    pub(super) fn new(transport: AclTransport, pool: Arc<SyncMutex<State>>) -> Self {
        Self {
            transport,
            pool: Some(pool),
        }
    }

    /// Returns the transport this credit was reserved against.
    #[inline]
    #[must_use]
    pub const fn transport(&self) -> AclTransport {
        self.transport
    }

    /// Consumes the reservation after a packet is queued to the controller.
    ///
    /// # Panics
    ///
    /// Panics if the credit was already consumed.
    pub(super) fn mark_used(&mut self) {
        assert!(self.pool.take().is_some(), "send credit consumed twice");
    }
}

impl Drop for SendCredit {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.lock().credits_mut(self.transport).mark_completed(1);
        }
    }
}
