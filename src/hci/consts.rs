#![allow(clippy::use_self)]

/// HCI event codes recognized by the proxy ([Vol 4] Part E, Section 7.7).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum EventCode {
    ConnectionComplete = 0x03,
    DisconnectionComplete = 0x05,
    CommandComplete = 0x0E,
    NumberOfCompletedPackets = 0x13,
    LeMetaEvent = 0x3E,
}

/// LE subevent codes recognized by the proxy ([Vol 4] Part E, Section 7.7.65).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum SubeventCode {
    ConnectionComplete = 0x01,
    EnhancedConnectionCompleteV1 = 0x0A,
    EnhancedConnectionCompleteV2 = 0x29,
}

/// Logical transport carrying ACL data ([Vol 1] Part A, Section 3.5). Each
/// transport has its own controller buffer pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum AclTransport {
    #[strum(serialize = "BR/EDR")]
    BrEdr,
    #[strum(serialize = "LE")]
    Le,
}

/// ACL packet boundary flag ([Vol 4] Part E, Section 5.4.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum BoundaryFlag {
    FirstNonFlushable = 0b00,
    Continuing = 0b01,
    FirstFlushable = 0b10,
    /// Deprecated "complete automatically flushable" marker.
    Complete = 0b11,
}

impl BoundaryFlag {
    /// Extracts the flag from the two bits above the connection handle.
    #[must_use]
    pub(crate) const fn from_bits(b: u16) -> Self {
        match b & 0b11 {
            0b00 => Self::FirstNonFlushable,
            0b01 => Self::Continuing,
            0b10 => Self::FirstFlushable,
            _ => Self::Complete,
        }
    }
}

/// HCI status codes ([Vol 1] Part F, Section 1.3). Only the codes the proxy
/// inspects or reports are named; everything else decodes to
/// [`Status::UnspecifiedError`].
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::FromPrimitive,
    num_enum::IntoPrimitive,
    strum::Display,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    UnknownConnectionIdentifier = 0x02,
    HardwareFailure = 0x03,
    MemoryCapacityExceeded = 0x07,
    ConnectionTimeout = 0x08,
    ConnectionLimitExceeded = 0x09,
    ConnectionAlreadyExists = 0x0B,
    CommandDisallowed = 0x0C,
    ConnectionRejectedDueToLimitedResources = 0x0D,
    RemoteUserTerminatedConnection = 0x13,
    RemoteDeviceTerminatedConnectionDueToLowResources = 0x14,
    RemoteDeviceTerminatedConnectionDueToPowerOff = 0x15,
    ConnectionTerminatedByLocalHost = 0x16,
    #[num_enum(default)] // [Vol 4] Part E, Section 1.2
    UnspecifiedError = 0x1F,
    ConnectionFailedToBeEstablished = 0x3E,
}

impl Status {
    /// Returns whether the status indicates success.
    #[inline]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Success)
    }
}
