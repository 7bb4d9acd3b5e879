use tracing::{error, info};

use super::{Error, Result};

/// ACL send-credit pool for one transport. Each credit is one controller
/// buffer slot reserved for proxy-originated packets.
#[derive(Debug)]
pub(super) struct Credits {
    /// Configured reservation target.
    to_reserve: u16,
    /// Reservation actually granted; zero until the controller reports its
    /// buffer counts.
    proxy_max: u16,
    /// Proxy packets currently in flight.
    proxy_pending: u16,
}

impl Credits {
    #[must_use]
    pub const fn new(to_reserve: u16) -> Self {
        Self {
            to_reserve,
            proxy_max: 0,
            proxy_pending: 0,
        }
    }

    /// Claims the proxy's share of the controller's `controller_max` ACL
    /// buffers and returns the count left for the host.
    ///
    /// # Panics
    ///
    /// Panics if credits were already reserved. The proxy must be reset
    /// before the controller is initialized again.
    pub fn reserve(&mut self, controller_max: u16) -> u16 {
        assert!(
            !self.is_initialized(),
            "ACL credits already reserved; proxy should have been reset"
        );
        self.proxy_max = controller_max.min(self.to_reserve);
        let host_max = controller_max - self.proxy_max;
        info!(
            "Reserved {} ACL data credits, passing {host_max} on to the host",
            self.proxy_max
        );
        if self.proxy_max < self.to_reserve {
            error!(
                "Reserved only {} of the configured {} ACL data credits (controller has {controller_max})",
                self.proxy_max, self.to_reserve
            );
        }
        host_max
    }

    /// Marks `n` credits as consumed by in-flight packets.
    pub fn mark_pending(&mut self, n: u16) -> Result<()> {
        if n > self.available() {
            return Err(Error::CreditsExhausted);
        }
        self.proxy_pending += n;
        Ok(())
    }

    /// Returns `n` credits to the pool. Completions in excess of the pending
    /// count clamp to zero.
    pub fn mark_completed(&mut self, n: u16) {
        if n > self.proxy_pending {
            error!("Marked more packets completed than were pending");
            self.proxy_pending = 0;
        } else {
            self.proxy_pending -= n;
        }
    }

    /// Returns the pool to its uninitialized state.
    pub fn reset(&mut self) {
        self.proxy_max = 0;
        self.proxy_pending = 0;
    }

    /// Credits not currently in flight.
    #[inline]
    #[must_use]
    pub const fn available(&self) -> u16 {
        self.proxy_max - self.proxy_pending
    }

    #[inline]
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.proxy_max > 0
    }

    /// Returns whether the proxy can originate packets on this transport.
    #[inline]
    #[must_use]
    pub const fn has_send_capability(&self) -> bool {
        self.is_initialized()
    }
}
