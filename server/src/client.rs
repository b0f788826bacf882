//! Client slots and the table that owns them.

use std::num::NonZeroUsize;

use bitstream::ByteBuffer;
use codec::{ClientFrame, FrameHistory, FrameSequence};
use wire::InfoString;

use crate::address::NetAddress;
use crate::userid::NetworkUserId;

/// Largest unreliable datagram, and the size of each client's pending one.
pub const MAX_DATAGRAM: usize = 4000;

/// Where a client slot is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Free,
    /// Admitted, still loading.
    Connected,
    /// In the game.
    Active,
    /// In the game with a spawned player entity.
    Spawned,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        !matches!(self, Self::Free)
    }

    #[must_use]
    pub const fn is_in_game(self) -> bool {
        matches!(self, Self::Active | Self::Spawned)
    }
}

/// A downloadable or precached resource tracked for a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub index: u16,
    pub download_size: u32,
}

/// One client slot.
#[derive(Debug)]
pub struct Client {
    pub slot: usize,
    pub state: ConnectionState,
    /// Finished the signon sequence.
    pub fully_connected: bool,
    /// A bot, without a network peer.
    pub fake: bool,
    /// An HLTV proxy.
    pub proxy: bool,
    /// Last peer address; kept after the slot is freed so a reconnect from
    /// the same address lands in the same slot.
    pub address: Option<NetAddress>,
    pub user_id: i32,
    pub network_id: NetworkUserId,
    pub name: String,
    pub userinfo: InfoString,
    pub hashed_key: String,
    pub frames: FrameHistory<ClientFrame>,
    /// Frame the client asked to be delta-compressed against.
    pub delta_sequence: Option<FrameSequence>,
    /// Sequence the next datagram will carry.
    pub outgoing_sequence: u32,
    /// Newest sequence the client acknowledged.
    pub incoming_acknowledged: FrameSequence,
    /// Server time of the last packet from the client.
    pub last_received: f64,
    /// Percent of recent packets lost.
    pub packet_loss: u32,
    pub resources_needed: Vec<Resource>,
    pub resources_on_hand: Vec<Resource>,
    /// Unreliable messages queued for the next datagram.
    pub datagram: ByteBuffer,
}

impl Client {
    /// Creates a free slot.
    #[must_use]
    pub fn new(slot: usize, update_backup: NonZeroUsize) -> Self {
        Self {
            slot,
            state: ConnectionState::Free,
            fully_connected: false,
            fake: false,
            proxy: false,
            address: None,
            user_id: 0,
            network_id: NetworkUserId::default(),
            name: String::new(),
            userinfo: InfoString::default(),
            hashed_key: String::new(),
            frames: FrameHistory::new(update_backup),
            delta_sequence: None,
            outgoing_sequence: 0,
            incoming_acknowledged: FrameSequence::default(),
            last_received: 0.0,
            packet_loss: 0,
            resources_needed: Vec::new(),
            resources_on_hand: Vec::new(),
            datagram: ByteBuffer::new(format!("client{slot}"), MAX_DATAGRAM),
        }
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Clears per-connection state, leaving the address in place.
    pub fn reset(&mut self) {
        let capacity = NonZeroUsize::new(self.frames.capacity()).unwrap_or(NonZeroUsize::MIN);
        self.state = ConnectionState::Free;
        self.fully_connected = false;
        self.fake = false;
        self.proxy = false;
        self.user_id = 0;
        self.network_id = NetworkUserId::default();
        self.name.clear();
        self.userinfo = InfoString::default();
        self.hashed_key.clear();
        self.frames = FrameHistory::new(capacity);
        self.delta_sequence = None;
        self.outgoing_sequence = 0;
        self.incoming_acknowledged = FrameSequence::default();
        self.packet_loss = 0;
        self.resources_needed.clear();
        self.resources_on_hand.clear();
        self.datagram.clear();
    }

    /// Handles an acknowledgment for `sequence` received at `now`.
    ///
    /// The acknowledged frame gets its round-trip time.
    pub fn acknowledge(&mut self, sequence: FrameSequence, now: f64) {
        self.last_received = now;
        if sequence > self.incoming_acknowledged {
            self.incoming_acknowledged = sequence;
        }
        if let Some(frame) = self.frames.get_mut(sequence) {
            if frame.ping_time < 0.0 {
                frame.ping_time = (now - frame.sent_time) as f32;
            }
        }
    }

    /// Records the delta frame a move command asked for.
    ///
    /// Clients send only the low byte of the sequence; it is resolved to the
    /// newest sent frame with that low byte. Any other value clears the
    /// request, forcing a full update.
    pub fn request_delta(&mut self, low_byte: Option<u8>) {
        self.delta_sequence = low_byte.and_then(|byte| {
            let last = self.outgoing_sequence.checked_sub(1)?;
            let back = (last as u8).wrapping_sub(byte);
            let sequence = FrameSequence::new(last.checked_sub(u32::from(back))?);
            self.frames.get(sequence).map(|_| sequence)
        });
    }
}

/// Fixed set of client slots.
#[derive(Debug)]
pub struct ClientTable {
    clients: Vec<Client>,
    next_user_id: i32,
}

impl ClientTable {
    #[must_use]
    pub fn new(max_clients: usize, update_backup: NonZeroUsize) -> Self {
        Self {
            clients: (0..max_clients)
                .map(|slot| Client::new(slot, update_backup))
                .collect(),
            next_user_id: 1,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&Client> {
        self.clients.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Client> {
        self.clients.get_mut(slot)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Client> {
        self.clients.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Client> {
        self.clients.iter_mut()
    }

    /// Slots not in use.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.clients.iter().filter(|c| !c.is_connected()).count()
    }

    /// First slot with nothing in it.
    #[must_use]
    pub fn find_free_slot(&self) -> Option<usize> {
        self.clients.iter().position(|c| !c.is_connected())
    }

    /// Slot whose last peer had exactly this address, free or not.
    #[must_use]
    pub fn find_by_address(&self, address: &NetAddress) -> Option<usize> {
        self.clients
            .iter()
            .position(|c| c.address.as_ref() == Some(address))
    }

    /// Connected slot of the in-game client with this user id.
    #[must_use]
    pub fn find_by_user_id(&self, user_id: i32) -> Option<usize> {
        self.clients
            .iter()
            .position(|c| c.is_connected() && c.user_id == user_id)
    }

    /// Clients from this host that are connected but still signing on.
    #[must_use]
    pub fn half_open_count(&self, address: &NetAddress) -> usize {
        self.clients
            .iter()
            .filter(|c| {
                c.is_connected()
                    && !c.fully_connected
                    && c.address.is_some_and(|a| a.same_base(address))
            })
            .count()
    }

    /// Connected HLTV proxies.
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.clients
            .iter()
            .filter(|c| c.is_connected() && c.proxy)
            .count()
    }

    /// Whether a connected client other than `except` uses this name,
    /// ignoring case.
    #[must_use]
    pub fn name_in_use(&self, name: &str, except: Option<usize>) -> bool {
        self.clients
            .iter()
            .any(|c| c.is_connected() && Some(c.slot) != except && c.name.eq_ignore_ascii_case(name))
    }

    /// Hands out the next user id.
    pub fn next_user_id(&mut self) -> i32 {
        let id = self.next_user_id;
        self.next_user_id = self.next_user_id.wrapping_add(1).max(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ClientTable {
        ClientTable::new(4, NonZeroUsize::new(8).unwrap())
    }

    fn connect(table: &mut ClientTable, slot: usize, address: NetAddress, name: &str) {
        let client = table.get_mut(slot).unwrap();
        client.state = ConnectionState::Connected;
        client.address = Some(address);
        client.name = name.to_string();
    }

    #[test]
    fn free_slots_and_lookup() {
        let mut table = table();
        assert_eq!(table.find_free_slot(), Some(0));
        let addr = NetAddress::ip([10, 0, 0, 1], 27005);
        connect(&mut table, 0, addr, "alice");
        assert_eq!(table.find_free_slot(), Some(1));
        assert_eq!(table.free_count(), 3);
        assert_eq!(table.find_by_address(&addr), Some(0));
        assert_eq!(table.find_by_address(&NetAddress::ip([10, 0, 0, 1], 1)), None);
    }

    #[test]
    fn freed_slot_keeps_address() {
        let mut table = table();
        let addr = NetAddress::ip([10, 0, 0, 1], 27005);
        connect(&mut table, 2, addr, "alice");
        table.get_mut(2).unwrap().reset();
        assert!(!table.get(2).unwrap().is_connected());
        assert_eq!(table.find_by_address(&addr), Some(2));
    }

    #[test]
    fn half_open_counts_by_host() {
        let mut table = table();
        connect(&mut table, 0, NetAddress::ip([10, 0, 0, 1], 1), "a");
        connect(&mut table, 1, NetAddress::ip([10, 0, 0, 1], 2), "b");
        connect(&mut table, 2, NetAddress::ip([10, 0, 0, 2], 1), "c");
        table.get_mut(1).unwrap().fully_connected = true;
        assert_eq!(table.half_open_count(&NetAddress::ip([10, 0, 0, 1], 9)), 1);
    }

    #[test]
    fn names_compare_without_case() {
        let mut table = table();
        connect(&mut table, 0, NetAddress::Loopback, "Player");
        assert!(table.name_in_use("player", None));
        assert!(!table.name_in_use("player", Some(0)));
        assert!(!table.name_in_use("other", None));
    }

    #[test]
    fn user_ids_increase() {
        let mut table = table();
        assert_eq!(table.next_user_id(), 1);
        assert_eq!(table.next_user_id(), 2);
    }

    #[test]
    fn acknowledge_sets_ping_once() {
        let mut client = Client::new(0, NonZeroUsize::new(8).unwrap());
        client
            .frames
            .insert(
                FrameSequence::new(3),
                ClientFrame {
                    sent_time: 1.0,
                    ..ClientFrame::default()
                },
            )
            .unwrap();
        client.acknowledge(FrameSequence::new(3), 1.25);
        client.acknowledge(FrameSequence::new(3), 9.0);
        let frame = client.frames.get(FrameSequence::new(3)).unwrap();
        assert!((frame.ping_time - 0.25).abs() < 1e-6);
        assert_eq!(client.incoming_acknowledged, FrameSequence::new(3));
        assert!((client.last_received - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn delta_request_resolves_full_sequence() {
        let mut client = Client::new(0, NonZeroUsize::new(8).unwrap());
        for seq in 254..260 {
            client
                .frames
                .insert(FrameSequence::new(seq), ClientFrame::default())
                .unwrap();
        }
        client.outgoing_sequence = 260;

        client.request_delta(Some(2));
        assert_eq!(client.delta_sequence, Some(FrameSequence::new(258)));
        client.request_delta(Some(255));
        assert_eq!(client.delta_sequence, Some(FrameSequence::new(255)));
        // older than the history holds
        client.request_delta(Some(100));
        assert_eq!(client.delta_sequence, None);
        client.request_delta(None);
        assert_eq!(client.delta_sequence, None);
    }

    #[test]
    fn reset_clears_connection_state() {
        let mut client = Client::new(1, NonZeroUsize::new(8).unwrap());
        client.state = ConnectionState::Spawned;
        client.resources_needed.push(Resource {
            name: "models/player.mdl".to_string(),
            index: 1,
            download_size: 100,
        });
        client.delta_sequence = Some(FrameSequence::new(4));
        client.reset();
        assert_eq!(client.state, ConnectionState::Free);
        assert!(client.resources_needed.is_empty());
        assert!(client.delta_sequence.is_none());
        assert_eq!(client.frames.capacity(), 8);
    }
}
