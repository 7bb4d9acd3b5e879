use structbuf::{Pack, StructBuf};

use crate::l2cap::PduAllocator;

use super::{Error, Result};

/// Accumulates ACL fragment payloads until a full L2CAP frame is assembled.
#[derive(Debug)]
pub(super) struct RecombinationBuffer {
    buf: StructBuf,
}

impl RecombinationBuffer {
    /// Obtains storage for a `size`-byte frame from the channel's receive
    /// allocator, or `None` if the allocator refuses.
    #[must_use]
    pub fn create(alloc: &dyn PduAllocator, size: usize) -> Option<Self> {
        let buf = alloc.alloc(size)?;
        debug_assert_eq!(buf.lim(), size);
        Some(Self { buf })
    }

    /// Appends one fragment payload.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut p = self.buf.append();
        if !p.can_put(data.len()) {
            return Err(Error::FragmentOverflow);
        }
        p.put(data);
        Ok(())
    }

    /// Returns whether every byte of the frame has arrived.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.buf.is_full()
    }

    /// Yields the assembled frame, leaving the writer empty.
    pub fn take(&mut self) -> StructBuf {
        self.buf.take()
    }
}
