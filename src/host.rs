//! HCI transport interface toward the host and the controller.

use std::fmt::Debug;

/// Packet sinks on the two sides of the proxy.
///
/// Sends are enqueue operations: implementations must hand the packet to the
/// transport without blocking on I/O and without calling back into the proxy,
/// as the proxy may still be holding its lock when a packet is submitted.
pub trait Transport: Debug + Send + Sync {
    /// Forwards an HCI event packet to the host.
    fn send_to_host(&self, event: &[u8]);

    /// Forwards an HCI ACL data packet to the controller.
    fn send_to_controller(&self, acl: &[u8]);
}
