use std::fmt::{Debug, Display, Formatter};

use nameof::name_of_type;

/// Connection handle ([Vol 4] Part E, Section 5.4.2).
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct ConnHandle(u16);

impl ConnHandle {
    pub(crate) const MAX: u16 = 0xEFF; // [Vol 4] Part E, Section 5.4.2
    /// Meaningful bits in a connection handle.
    pub(crate) const BITS: u32 = 12;

    /// Creates a connection handle from the low 12 bits of `v`, or `None` if
    /// the result is outside the valid handle range.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Option<Self> {
        let v = v & ((1 << Self::BITS) - 1);
        if v <= Self::MAX {
            Some(Self(v))
        } else {
            None
        }
    }

    /// Wraps a raw connection handle.
    #[inline]
    #[must_use]
    pub(crate) const fn from_raw(h: u16) -> Self {
        Self(h)
    }
}

impl From<ConnHandle> for u16 {
    #[inline]
    fn from(h: ConnHandle) -> Self {
        h.0
    }
}

impl Debug for ConnHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#05X})", name_of_type!(ConnHandle), self.0)
    }
}

impl Display for ConnHandle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}
