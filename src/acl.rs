//! ACL data channel: the proxy's credit accounting, connection tracking, and
//! selective interposition on ACL traffic ([Vol 4] Part E, Section 5.4.2).

use std::sync::Arc;

use tracing::{error, info, warn};

pub use credit::SendCredit;

use conn::AclConnection;
use credits::Credits;

use crate::hci::{
    self, AclFrame, AclTransport, BoundaryFlag, ConnHandle, ConnectionComplete,
    DisconnectionComplete, Direction, LeBufferSizeComplete, LeConnectionComplete,
    LeReadBufferSizeV1Complete, LeReadBufferSizeV2Complete, NumberOfCompletedPackets,
    ReadBufferSizeComplete, SubeventCode,
};
use crate::l2cap::{self, BasicHeader, ChannelManager, Cid, SignalingChannel};
use crate::{host, SyncMutex};

mod conn;
mod credit;
mod credits;
mod recombine;


/// Error type returned by the ACL data channel.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Hci(#[from] hci::Error),
    #[error("unknown connection {0}")]
    UnknownConnection(ConnHandle),
    #[error("connection {0} is already tracked")]
    ConnectionExists(ConnHandle),
    #[error("connection table is full")]
    ConnectionTableFull,
    #[error("no free send credits")]
    CreditsExhausted,
    #[error("credit is for the {credit} transport, connection is {connection}")]
    CreditTransportMismatch {
        credit: AclTransport,
        connection: AclTransport,
    },
    #[error("recombination is already active")]
    RecombinationActive,
    #[error("recombination buffer allocation failed")]
    RecombinationAlloc,
    #[error("recombination is not active")]
    RecombinationInactive,
    #[error("fragment exceeds the advertised frame length")]
    FragmentOverflow,
}

/// Common ACL data channel result type.
pub type Result<T> = std::result::Result<T, Error>;

/// ACL data channel configuration, fixed for the lifetime of the proxy.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// BR/EDR controller buffers to reserve for proxy-originated traffic.
    pub br_edr_credits: u16,
    /// LE controller buffers to reserve for proxy-originated traffic.
    pub le_credits: u16,
    /// Capacity of the connection table.
    pub max_connections: usize,
}

/// Verdict of ACL frame classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[must_use]
pub enum Disposition {
    /// The frame belongs to the proxy and must not be forwarded.
    Consumed,
    /// The frame is not the proxy's; the caller forwards it to the other
    /// side.
    Pass,
}

/// Credit pools and the connection table, guarded by the proxy mutex.
#[derive(Debug)]
struct State {
    br_edr: Credits,
    le: Credits,
    connections: Vec<AclConnection>,
    max_connections: usize,
}

impl State {
    fn credits(&self, transport: AclTransport) -> &Credits {
        match transport {
            AclTransport::BrEdr => &self.br_edr,
            AclTransport::Le => &self.le,
        }
    }

    fn credits_mut(&mut self, transport: AclTransport) -> &mut Credits {
        match transport {
            AclTransport::BrEdr => &mut self.br_edr,
            AclTransport::Le => &mut self.le,
        }
    }

    fn connection_mut(&mut self, handle: ConnHandle) -> Option<&mut AclConnection> {
        self.connections.iter_mut().find(|c| c.handle() == handle)
    }
}

/// The proxy's ACL data channel. Owns the per-transport credit pools and the
/// connection table, processes the HCI events that affect them, classifies
/// ACL frames in both directions, and exposes the proxy's send path.
///
/// All operations may be called concurrently from multiple threads. One
/// mutex guards all state; forwarding and L2CAP dispatch happen outside it
/// except where noted.
#[derive(Debug)]
pub struct AclDataChannel {
    state: Arc<SyncMutex<State>>,
    hci_transport: Arc<dyn host::Transport>,
    channels: Arc<dyn ChannelManager>,
}

impl AclDataChannel {
    /// Creates the ACL data channel.
    #[must_use]
    pub fn new(
        hci_transport: Arc<dyn host::Transport>,
        channels: Arc<dyn ChannelManager>,
        config: Config,
    ) -> Self {
        Self {
            state: Arc::new(SyncMutex::new(State {
                br_edr: Credits::new(config.br_edr_credits),
                le: Credits::new(config.le_credits),
                connections: Vec::with_capacity(config.max_connections),
                max_connections: config.max_connections,
            })),
            hci_transport,
            channels,
        }
    }

    /// Returns both credit pools to their uninitialized state and drops all
    /// tracked connections. Must precede controller re-initialization.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        // Credits first, so nothing queued behind the pools can still send.
        state.le.reset();
        state.br_edr.reset();
        state.connections.clear();
    }

    /// Processes an `HCI_Read_Buffer_Size` command completion, reserving the
    /// proxy's BR/EDR credits and rewriting the count passed on to the host.
    /// The caller forwards the rewritten event.
    pub fn process_read_buffer_size_event(&self, hci: &mut [u8]) {
        let mut event = match ReadBufferSizeComplete::new(hci) {
            Ok(event) => event,
            Err(e) => {
                error!("Ignoring malformed Read Buffer Size completion: {e}");
                return;
            }
        };
        {
            let mut state = self.state.lock();
            let host_max = state.br_edr.reserve(event.total_num_acl_data_packets());
            event.set_total_num_acl_data_packets(host_max);
        }
        // Send anything that queued before credits existed.
        self.channels.drain_channel_queues();
    }

    /// Processes an `HCI_LE_Read_Buffer_Size` [v1] command completion against
    /// the LE pool. The caller forwards the rewritten event.
    pub fn process_le_read_buffer_size_v1_event(&self, hci: &mut [u8]) {
        match LeReadBufferSizeV1Complete::new(hci) {
            Ok(event) => self.process_le_read_buffer_size(event),
            Err(e) => error!("Ignoring malformed LE Read Buffer Size completion: {e}"),
        }
    }

    /// Processes an `HCI_LE_Read_Buffer_Size` [v2] command completion against
    /// the LE pool. The caller forwards the rewritten event.
    pub fn process_le_read_buffer_size_v2_event(&self, hci: &mut [u8]) {
        match LeReadBufferSizeV2Complete::new(hci) {
            Ok(event) => self.process_le_read_buffer_size(event),
            Err(e) => error!("Ignoring malformed LE Read Buffer Size completion: {e}"),
        }
    }

    fn process_le_read_buffer_size<E: LeBufferSizeComplete>(&self, mut event: E) {
        {
            let mut state = self.state.lock();
            let host_max = state.le.reserve(event.total_num_le_acl_data_packets());
            event.set_total_num_le_acl_data_packets(host_max);
        }
        let le_acl_data_packet_length = event.le_acl_data_packet_length();
        if le_acl_data_packet_length == 0 {
            error!(
                "Controller shares data buffers between BR/EDR and LE, which is \
                 not supported; LE channels will not be functional"
            );
        }
        self.channels
            .set_le_acl_data_packet_length(le_acl_data_packet_length);
        // Send anything that queued before credits existed.
        self.channels.drain_channel_queues();
    }

    /// Processes an `HCI_Number_Of_Completed_Packets` event. Completions for
    /// proxy packets are reclaimed and erased from the event in place; the
    /// event reaches the host only if completions remain for host traffic.
    pub fn handle_number_of_completed_packets_event(&self, hci: &mut [u8]) {
        let mut event = match NumberOfCompletedPackets::new(hci) {
            Ok(event) => event,
            Err(e) => {
                error!("Forwarding unparsed Number Of Completed Packets event: {e}");
                self.hci_transport.send_to_host(hci);
                return;
            }
        };
        let mut should_send_to_host = false;
        let mut reclaimed_any = false;
        {
            let mut state = self.state.lock();
            for i in 0..event.num_handles() {
                let completed = event.num_completed_packets(i);
                if completed == 0 {
                    continue;
                }
                let Some(conn) = state.connection_mut(event.connection_handle(i)) else {
                    // Completions for a connection the proxy is not tracking.
                    should_send_to_host = true;
                    continue;
                };
                let reclaimed = completed.min(conn.num_pending_packets());
                conn.set_num_pending_packets(conn.num_pending_packets() - reclaimed);
                let transport = conn.transport();
                state.credits_mut(transport).mark_completed(reclaimed);
                if reclaimed > 0 {
                    reclaimed_any = true;
                }
                let remaining = completed - reclaimed;
                event.set_num_completed_packets(i, remaining);
                if remaining > 0 {
                    should_send_to_host = true;
                }
            }
        }
        if reclaimed_any {
            // Reclaimed credits may unblock queued channel traffic.
            self.channels.drain_channel_queues();
        }
        if should_send_to_host {
            self.hci_transport.send_to_host(event.as_ref());
        }
    }

    /// Handles `HCI_Connection_Complete`, tracking the new BR/EDR connection
    /// on success. The event is always forwarded to the host.
    pub fn handle_connection_complete_event(&self, hci: &[u8]) {
        match ConnectionComplete::parse(hci) {
            Ok(event) if event.status.is_ok() => {
                self.track_connection(event.handle, AclTransport::BrEdr);
            }
            Ok(_) | Err(_) => {}
        }
        self.hci_transport.send_to_host(hci);
    }

    /// Handles an `HCI_LE_Connection_Complete` subevent. The event is always
    /// forwarded to the host.
    pub fn handle_le_connection_complete_event(&self, hci: &[u8]) {
        self.handle_le_connection(hci, SubeventCode::ConnectionComplete);
    }

    /// Handles an `HCI_LE_Enhanced_Connection_Complete` [v1] subevent. The
    /// event is always forwarded to the host.
    pub fn handle_le_enhanced_connection_complete_v1_event(&self, hci: &[u8]) {
        self.handle_le_connection(hci, SubeventCode::EnhancedConnectionCompleteV1);
    }

    /// Handles an `HCI_LE_Enhanced_Connection_Complete` [v2] subevent. The
    /// event is always forwarded to the host.
    pub fn handle_le_enhanced_connection_complete_v2_event(&self, hci: &[u8]) {
        self.handle_le_connection(hci, SubeventCode::EnhancedConnectionCompleteV2);
    }

    fn handle_le_connection(&self, hci: &[u8], subevent: SubeventCode) {
        match LeConnectionComplete::parse(hci, subevent) {
            Ok(event) if event.status.is_ok() => {
                self.track_connection(event.handle, AclTransport::Le);
            }
            Ok(_) | Err(_) => {}
        }
        self.hci_transport.send_to_host(hci);
    }

    /// Starts tracking a connection. A full table is logged, not fatal: the
    /// event still flows to the host, and later traffic on the handle passes
    /// through untracked.
    fn track_connection(&self, handle: ConnHandle, transport: AclTransport) {
        if matches!(
            self.create_connection(handle, transport),
            Err(Error::ConnectionTableFull)
        ) {
            error!("Cannot track {transport} connection {handle}: connection table is full");
        }
    }

    fn create_connection(&self, handle: ConnHandle, transport: AclTransport) -> Result<()> {
        let mut state = self.state.lock();
        if state.connection_mut(handle).is_some() {
            warn!("Connection {handle} is already tracked");
            return Err(Error::ConnectionExists(handle));
        }
        if state.connections.len() >= state.max_connections {
            return Err(Error::ConnectionTableFull);
        }
        let conn = AclConnection::new(transport, handle, &self.channels);
        state.connections.push(conn);
        Ok(())
    }

    /// Processes `HCI_Disconnection_Complete`, dropping the connection record
    /// and releasing its in-flight credits. The caller forwards the event.
    pub fn process_disconnection_complete_event(&self, hci: &[u8]) {
        let event = match DisconnectionComplete::parse(hci) {
            Ok(event) => event,
            Err(e) => {
                error!("Ignoring malformed Disconnection Complete event: {e}");
                return;
            }
        };
        let mut state = self.state.lock();
        let Some(i) = state
            .connections
            .iter()
            .position(|c| c.handle() == event.handle)
        else {
            warn!(
                "Disconnect (reason: {}) for untracked connection {}",
                event.reason, event.handle
            );
            return;
        };
        if !event.status.is_ok() {
            if state.connections[i].num_pending_packets() > 0 {
                warn!(
                    "Failed disconnect ({}) for connection {} with packets in flight; \
                     keeping its credits",
                    event.status, event.handle
                );
            }
            return;
        }
        info!(
            "Disconnect (reason: {}) for connection {}",
            event.reason, event.handle
        );
        let conn = state.connections.swap_remove(i);
        if conn.num_pending_packets() > 0 {
            warn!(
                "Connection {} disconnected with {} packets in flight; releasing their credits",
                event.handle,
                conn.num_pending_packets()
            );
            state
                .credits_mut(conn.transport())
                .mark_completed(conn.num_pending_packets());
        }
        self.channels.handle_disconnection_complete(event.handle);
    }

    /// Returns whether the proxy holds any `transport` send credits.
    #[must_use]
    pub fn has_send_acl_capability(&self, transport: AclTransport) -> bool {
        self.state.lock().credits(transport).has_send_capability()
    }

    /// Returns the number of free proxy send credits on `transport`.
    #[must_use]
    pub fn num_free_acl_packets(&self, transport: AclTransport) -> u16 {
        self.state.lock().credits(transport).available()
    }

    /// Reserves one `transport` send credit, or `None` if the pool is
    /// exhausted or was never initialized.
    pub fn reserve_send_credit(&self, transport: AclTransport) -> Option<SendCredit> {
        let mut state = self.state.lock();
        state.credits_mut(transport).mark_pending(1).ok()?;
        Some(SendCredit::new(transport, Arc::clone(&self.state)))
    }

    /// Sends a proxy-originated ACL packet to the controller, consuming
    /// `credit`. On any error the credit returns to its pool.
    pub fn send_acl(&self, acl: &[u8], mut credit: SendCredit) -> Result<()> {
        // The guard drops before the `credit` parameter, so an error return
        // releases the credit only after the lock is free again.
        let mut state = self.state.lock();
        let frame = AclFrame::parse(acl).map_err(|e| {
            error!("Not sending invalid ACL packet: {e}");
            e
        })?;
        let Some(conn) = state.connection_mut(frame.handle()) else {
            error!("Not sending ACL packet on unknown connection {}", frame.handle());
            return Err(Error::UnknownConnection(frame.handle()));
        };
        if conn.transport() != credit.transport() {
            warn!("Not sending ACL packet: credit is for the wrong transport");
            return Err(Error::CreditTransportMismatch {
                credit: credit.transport(),
                connection: conn.transport(),
            });
        }
        credit.mark_used();
        conn.set_num_pending_packets(conn.num_pending_packets() + 1);
        self.hci_transport.send_to_controller(acl);
        Ok(())
    }

    /// Returns the signaling endpoint of `handle`, if `local_cid` addresses
    /// it.
    #[must_use]
    pub fn find_signaling_channel(
        &self,
        handle: ConnHandle,
        local_cid: Cid,
    ) -> Option<Arc<SignalingChannel>> {
        let mut state = self.state.lock();
        let conn = state.connection_mut(handle)?;
        let sig = conn.signaling_channel();
        (sig.local_cid() == local_cid).then(|| Arc::clone(sig))
    }

    /// Classifies an ACL data frame travelling in `direction`.
    ///
    /// A frame is consumed when it addresses one of the proxy's L2CAP
    /// channels, either as a complete frame or as a fragment under
    /// recombination; everything else passes through. Fragments need care:
    /// once the first fragment of a frame has been consumed, every following
    /// fragment must be consumed too, or the receiver would see a
    /// continuation with no beginning.
    pub fn handle_acl_data(&self, direction: Direction, acl: &[u8]) -> Disposition {
        let Ok(frame) = AclFrame::parse(acl) else {
            // Unparseable traffic is not the proxy's to keep.
            return Disposition::Pass;
        };
        let handle = frame.handle();
        let payload = frame.payload();

        let mut is_fragment = false;
        let mut recombined = None;
        {
            let mut state = self.state.lock();
            let Some(conn) = state.connection_mut(handle) else {
                return Disposition::Pass;
            };
            match frame.boundary_flag() {
                BoundaryFlag::Continuing => {
                    // Without active recombination, these continue a frame
                    // the proxy previously chose not to intercept.
                    if !conn.recombination_active(direction) {
                        return Disposition::Pass;
                    }
                    is_fragment = true;
                }
                BoundaryFlag::FirstNonFlushable | BoundaryFlag::FirstFlushable => {
                    if conn.recombination_active(direction) {
                        warn!(
                            "First packet {direction} on connection {handle} while \
                             recombination is active; dropping the partial frame"
                        );
                        conn.end_recombination(direction);
                    }
                    // The whole basic header is needed up front: its length
                    // field says how much to recombine, its CID whether to.
                    let Some(hdr) = BasicHeader::parse(payload) else {
                        warn!(
                            "ACL packet {direction} on connection {handle} is too short \
                             for an L2CAP header; passing on"
                        );
                        return Disposition::Pass;
                    };
                    let Some(channel) = self.find_channel(direction, handle, hdr.channel_id)
                    else {
                        return Disposition::Pass;
                    };
                    let frame_len = hdr.frame_len();
                    if frame_len < payload.len() {
                        error!(
                            "ACL packet {direction} on connection {handle} has a larger \
                             payload ({} bytes) than its L2CAP frame ({frame_len} bytes); \
                             dropping",
                            payload.len()
                        );
                        return Disposition::Consumed;
                    }
                    if frame_len > payload.len() {
                        is_fragment = true;
                        let Some(alloc) = channel.rx_allocator() else {
                            error!(
                                "Cannot recombine for channel {}: no rx allocator; \
                                 passing on",
                                hdr.channel_id
                            );
                            return Disposition::Pass;
                        };
                        if let Err(e) = conn.start_recombination(direction, alloc, frame_len) {
                            error!(
                                "Cannot recombine for channel {}: {e}; passing on",
                                hdr.channel_id
                            );
                            return Disposition::Pass;
                        }
                    }
                }
                BoundaryFlag::Complete => {
                    error!(
                        "Unexpected boundary flag on ACL packet {direction} on \
                         connection {handle}"
                    );
                    return Disposition::Pass;
                }
            }
            if is_fragment {
                match conn.recombine_fragment(direction, payload) {
                    Ok(Some(pdu)) => recombined = Some(pdu),
                    // Await the remaining fragments.
                    Ok(None) => return Disposition::Consumed,
                    Err(e) => {
                        error!(
                            "Recombination {direction} on connection {handle} failed: \
                             {e}; dropping the whole frame"
                        );
                        conn.end_recombination(direction);
                        return Disposition::Consumed;
                    }
                }
            }
        }

        let pdu = recombined.as_ref().map_or(payload, |b| b.as_ref());
        // Recombination both starts and completes only with a full header.
        let hdr = BasicHeader::parse(pdu).expect("classified frame has a valid L2CAP header");
        let Some(channel) = self.find_channel(direction, handle, hdr.channel_id) else {
            // A fragment cannot get here: recombination only starts for a
            // recognized channel.
            debug_assert!(!is_fragment);
            return Disposition::Pass;
        };
        let consumed = match direction {
            Direction::FromController => channel.handle_pdu_from_controller(pdu),
            Direction::FromHost => channel.handle_pdu_from_host(pdu),
        };
        if is_fragment && !consumed {
            // Passing only this last fragment would strand the continuations
            // already consumed, so the whole recombined frame is dropped.
            error!(
                "Channel {} rejected a recombined frame, which is unsupported; \
                 dropping it",
                hdr.channel_id
            );
            return Disposition::Consumed;
        }
        if consumed {
            Disposition::Consumed
        } else {
            Disposition::Pass
        }
    }

    /// Looks up the proxy channel an ACL frame addresses. The CID names the
    /// receiver, so which side's registry to consult depends on the travel
    /// direction.
    fn find_channel(
        &self,
        direction: Direction,
        handle: ConnHandle,
        cid: Cid,
    ) -> Option<Arc<dyn l2cap::Channel>> {
        match direction {
            Direction::FromController => self.channels.find_channel_by_local_cid(handle, cid),
            Direction::FromHost => self.channels.find_channel_by_remote_cid(handle, cid),
        }
    }
}
