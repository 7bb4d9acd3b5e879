//! Host Controller Interface structures used by the proxy ([Vol 4] Part E).

pub use {acl::*, consts::*, event::*, handle::*};

mod acl;
mod consts;
mod event;
mod handle;

/// Error type returned by the HCI layer.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid event: {0:02X?}")]
    InvalidEvent(Vec<u8>),
    #[error("invalid ACL data packet: {0:02X?}")]
    InvalidAcl(Vec<u8>),
}

/// Common HCI result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Direction of a packet travelling through the proxy.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum Direction {
    /// Host to controller.
    #[strum(serialize = "from host")]
    FromHost,
    /// Controller to host.
    #[strum(serialize = "from controller")]
    FromController,
}

impl Direction {
    /// Index of the per-direction recombination slot.
    #[inline]
    pub(crate) const fn idx(self) -> usize {
        match self {
            Self::FromHost => 0,
            Self::FromController => 1,
        }
    }
}
