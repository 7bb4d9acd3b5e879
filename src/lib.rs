//! Bluetooth host-controller proxy library.
//!
//! The proxy sits on the HCI transport between a Bluetooth host stack and a
//! Bluetooth controller, passing most traffic through untouched. It reserves
//! a share of the controller's ACL data buffers for its own outbound traffic,
//! tracks ACL connections by watching HCI events, recombines L2CAP frames
//! that were fragmented across ACL packets, and consumes exactly the frames
//! addressed to its own L2CAP channels.
//!
//! [`acl::AclDataChannel`] is the heart of the crate. The host stack, the
//! controller transport, and the L2CAP channel registry are reached through
//! the [`host`] and [`l2cap`] interfaces.

pub mod acl;
pub mod hci;
pub mod host;
pub mod l2cap;

pub(crate) type SyncMutex<T> = parking_lot::Mutex<T>;
