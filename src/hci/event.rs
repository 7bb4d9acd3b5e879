use bytes::BufMut;
use structbuf::Unpacker;

use super::*;

/// Event packet header size (event code + parameter length).
pub(crate) const EVT_HDR: usize = 2;

/// Command completion parameter header size (`Num_HCI_Command_Packets` +
/// opcode) preceding the return parameters.
const CC_HDR: usize = 3;

/// Validates the event header and returns the parameters of event `code`.
fn params(hci: &[u8], code: EventCode) -> Result<&[u8]> {
    let mut p = Unpacker::new(hci);
    let (c, len) = (p.u8(), p.u8());
    if !p.is_ok() || c != u8::from(code) || p.len() != usize::from(len) {
        return Err(Error::InvalidEvent(Vec::from(hci)));
    }
    Ok(p.into_inner())
}

/// Validates a command completion of at least `min` return parameter bytes.
fn command_params(hci: &[u8], min: usize) -> Result<&[u8]> {
    let p = params(hci, EventCode::CommandComplete)?;
    if p.len() < CC_HDR + min {
        return Err(Error::InvalidEvent(Vec::from(hci)));
    }
    Ok(p)
}

#[inline]
fn get_u16(b: &[u8], i: usize) -> u16 {
    Unpacker::new(&b[i..]).u16()
}

#[inline]
fn put_u16(b: &mut [u8], i: usize, v: u16) {
    let mut s = &mut b[i..i + 2];
    s.put_u16_le(v);
}

/// Writable view of an `HCI_Read_Buffer_Size` command completion
/// ([Vol 4] Part E, Section 7.4.5). The proxy rewrites
/// `Total_Num_ACL_Data_Packets` before the event reaches the host.
#[derive(Debug)]
pub(crate) struct ReadBufferSizeComplete<'a> {
    hci: &'a mut [u8],
}

impl<'a> ReadBufferSizeComplete<'a> {
    const TOTAL_ACL: usize = EVT_HDR + CC_HDR + 4;

    pub fn new(hci: &'a mut [u8]) -> Result<Self> {
        command_params(hci, 8)?;
        Ok(Self { hci })
    }

    #[must_use]
    pub fn total_num_acl_data_packets(&self) -> u16 {
        get_u16(self.hci, Self::TOTAL_ACL)
    }

    pub fn set_total_num_acl_data_packets(&mut self, n: u16) {
        put_u16(self.hci, Self::TOTAL_ACL, n);
    }
}

/// Common surface of the `HCI_LE_Read_Buffer_Size` command completions
/// ([Vol 4] Part E, Sections 7.8.2 and 7.8.93). V1 and V2 share a parameter
/// prefix; V2 appends ISO buffer counts the proxy does not touch.
pub(crate) trait LeBufferSizeComplete {
    /// Offsets shared by both versions.
    const LE_LEN: usize = EVT_HDR + CC_HDR + 1;
    const TOTAL_LE_ACL: usize = EVT_HDR + CC_HDR + 3;

    fn hci(&self) -> &[u8];
    fn hci_mut(&mut self) -> &mut [u8];

    /// Maximum LE ACL payload accepted by the controller. Zero means the
    /// controller shares its BR/EDR buffers with the LE transport.
    #[must_use]
    fn le_acl_data_packet_length(&self) -> u16 {
        get_u16(self.hci(), Self::LE_LEN)
    }

    #[must_use]
    fn total_num_le_acl_data_packets(&self) -> u16 {
        u16::from(self.hci()[Self::TOTAL_LE_ACL])
    }

    fn set_total_num_le_acl_data_packets(&mut self, n: u16) {
        // The host share never exceeds the single-byte controller total.
        debug_assert!(n <= u16::from(u8::MAX));
        let i = Self::TOTAL_LE_ACL;
        self.hci_mut()[i] = n as u8;
    }
}

/// Writable view of an `HCI_LE_Read_Buffer_Size` [v1] command completion.
#[derive(Debug)]
pub(crate) struct LeReadBufferSizeV1Complete<'a> {
    hci: &'a mut [u8],
}

impl<'a> LeReadBufferSizeV1Complete<'a> {
    pub fn new(hci: &'a mut [u8]) -> Result<Self> {
        command_params(hci, 4)?;
        Ok(Self { hci })
    }
}

impl LeBufferSizeComplete for LeReadBufferSizeV1Complete<'_> {
    #[inline]
    fn hci(&self) -> &[u8] {
        self.hci
    }

    #[inline]
    fn hci_mut(&mut self) -> &mut [u8] {
        self.hci
    }
}

/// Writable view of an `HCI_LE_Read_Buffer_Size` [v2] command completion.
#[derive(Debug)]
pub(crate) struct LeReadBufferSizeV2Complete<'a> {
    hci: &'a mut [u8],
}

impl<'a> LeReadBufferSizeV2Complete<'a> {
    pub fn new(hci: &'a mut [u8]) -> Result<Self> {
        command_params(hci, 7)?;
        Ok(Self { hci })
    }
}

impl LeBufferSizeComplete for LeReadBufferSizeV2Complete<'_> {
    #[inline]
    fn hci(&self) -> &[u8] {
        self.hci
    }

    #[inline]
    fn hci_mut(&mut self) -> &mut [u8] {
        self.hci
    }
}

/// Writable view of an `HCI_Number_Of_Completed_Packets` event
/// ([Vol 4] Part E, Section 7.7.19). Completed counts are rewritten in place
/// as the proxy reclaims credits for its own packets.
#[derive(Debug)]
pub(crate) struct NumberOfCompletedPackets<'a> {
    hci: &'a mut [u8],
}

impl<'a> NumberOfCompletedPackets<'a> {
    const PAIRS: usize = EVT_HDR + 1;

    pub fn new(hci: &'a mut [u8]) -> Result<Self> {
        let p = params(hci, EventCode::NumberOfCompletedPackets)?;
        if p.is_empty() || p.len() - 1 != usize::from(p[0]) * 4 {
            return Err(Error::InvalidEvent(Vec::from(&*hci)));
        }
        Ok(Self { hci })
    }

    #[must_use]
    pub fn num_handles(&self) -> usize {
        usize::from(self.hci[EVT_HDR])
    }

    #[must_use]
    pub fn connection_handle(&self, i: usize) -> ConnHandle {
        let v = get_u16(self.hci, Self::PAIRS + 4 * i);
        ConnHandle::from_raw(v & ((1 << ConnHandle::BITS) - 1))
    }

    #[must_use]
    pub fn num_completed_packets(&self, i: usize) -> u16 {
        get_u16(self.hci, Self::PAIRS + 4 * i + 2)
    }

    pub fn set_num_completed_packets(&mut self, i: usize, n: u16) {
        put_u16(self.hci, Self::PAIRS + 4 * i + 2, n);
    }
}

impl AsRef<[u8]> for NumberOfCompletedPackets<'_> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.hci
    }
}

/// `HCI_Connection_Complete` parameters inspected by the proxy
/// ([Vol 4] Part E, Section 7.7.3).
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConnectionComplete {
    pub status: Status,
    pub handle: ConnHandle,
}

impl ConnectionComplete {
    pub fn parse(hci: &[u8]) -> Result<Self> {
        let p = params(hci, EventCode::ConnectionComplete)?;
        if p.len() < 11 {
            return Err(Error::InvalidEvent(Vec::from(hci)));
        }
        let mut u = Unpacker::new(p);
        Ok(Self {
            status: Status::from(u.u8()),
            handle: ConnHandle::from_raw(u.u16() & ((1 << ConnHandle::BITS) - 1)),
        })
    }
}

/// `HCI_Disconnection_Complete` parameters ([Vol 4] Part E, Section 7.7.5).
#[derive(Clone, Copy, Debug)]
pub(crate) struct DisconnectionComplete {
    pub status: Status,
    pub handle: ConnHandle,
    pub reason: Status,
}

impl DisconnectionComplete {
    pub fn parse(hci: &[u8]) -> Result<Self> {
        let p = params(hci, EventCode::DisconnectionComplete)?;
        if p.len() < 4 {
            return Err(Error::InvalidEvent(Vec::from(hci)));
        }
        let mut u = Unpacker::new(p);
        Ok(Self {
            status: Status::from(u.u8()),
            handle: ConnHandle::from_raw(u.u16() & ((1 << ConnHandle::BITS) - 1)),
            reason: Status::from(u.u8()),
        })
    }
}

/// Status and handle shared by the `HCI_LE_Connection_Complete` and
/// `HCI_LE_Enhanced_Connection_Complete` subevents ([Vol 4] Part E,
/// Sections 7.7.65.1 and 7.7.65.10).
#[derive(Clone, Copy, Debug)]
pub(crate) struct LeConnectionComplete {
    pub status: Status,
    pub handle: ConnHandle,
}

impl LeConnectionComplete {
    pub fn parse(hci: &[u8], subevent: SubeventCode) -> Result<Self> {
        let p = params(hci, EventCode::LeMetaEvent)?;
        let min = match subevent {
            SubeventCode::ConnectionComplete => 19,
            SubeventCode::EnhancedConnectionCompleteV1 => 31,
            SubeventCode::EnhancedConnectionCompleteV2 => 34,
        };
        if p.len() < min || p[0] != u8::from(subevent) {
            return Err(Error::InvalidEvent(Vec::from(hci)));
        }
        let mut u = Unpacker::new(&p[1..]);
        Ok(Self {
            status: Status::from(u.u8()),
            handle: ConnHandle::from_raw(u.u16() & ((1 << ConnHandle::BITS) - 1)),
        })
    }
}
