//! Services the core calls out to: sockets, authentication and game logic.

use std::collections::VecDeque;

use wire::{CommandLine, InfoString};

use crate::address::NetAddress;
use crate::userid::{AuthProtocol, NetworkUserId};

/// Which socket a packet goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SocketKind {
    #[default]
    Server,
    Client,
    Multicast,
}

/// Datagram I/O.
pub trait Transport {
    /// Sends one datagram. Delivery is best effort.
    fn send_packet(&mut self, socket: SocketKind, data: &[u8], to: &NetAddress);

    /// Returns the next pending datagram, if any.
    fn receive_packet(&mut self, socket: SocketKind) -> Option<(Vec<u8>, NetAddress)>;
}

/// The authentication service that validates connect tickets.
pub trait AuthBackend {
    /// Validates a Steam ticket. `None` rejects the client.
    fn verify_certificate(
        &mut self,
        address: &NetAddress,
        protocol: AuthProtocol,
        certificate: &[u8],
        userinfo: &InfoString,
    ) -> Option<NetworkUserId>;

    /// The server's own Steam id, advertised in challenge responses.
    fn server_steam_id(&self) -> u64;

    /// A client was admitted into `slot`.
    fn notify_client_connect(&mut self, slot: usize, id: &NetworkUserId);

    /// The client in `slot` went away.
    fn notify_client_disconnect(&mut self, slot: usize);
}

/// Game-side hooks.
pub trait GameLogic {
    /// Last word on a connecting client. `Err` carries the rejection text.
    fn on_client_connect(
        &mut self,
        slot: usize,
        address: &NetAddress,
        name: &str,
        userinfo: &InfoString,
    ) -> Result<(), String>;

    /// An in-game client left.
    fn on_client_disconnect(&mut self, slot: usize);

    /// The client's userinfo was set or changed.
    fn on_client_user_info_changed(&mut self, _slot: usize, _userinfo: &InfoString) {}

    /// Reply to `pstat`, if any.
    fn player_status(&mut self, _from: &NetAddress) -> Option<Vec<u8>> {
        None
    }

    /// Reply to a connectionless command the core does not know.
    fn query(
        &mut self,
        _from: &NetAddress,
        _command: &CommandLine,
        _payload: &[u8],
    ) -> Option<Vec<u8>> {
        None
    }

    /// Runs an authenticated rcon command and returns its console output.
    fn execute_rcon(&mut self, command: &str) -> String;
}

/// A datagram handed to [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub socket: SocketKind,
    pub data: Vec<u8>,
    pub to: NetAddress,
}

/// In-process transport: queued inbound datagrams, recorded outbound ones.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbox: VecDeque<(SocketKind, Vec<u8>, NetAddress)>,
    sent: Vec<SentPacket>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a datagram for the server socket.
    pub fn push_incoming(&mut self, data: impl Into<Vec<u8>>, from: NetAddress) {
        self.inbox.push_back((SocketKind::Server, data.into(), from));
    }

    /// Every datagram sent so far.
    #[must_use]
    pub fn sent(&self) -> &[SentPacket] {
        &self.sent
    }

    /// Drains the sent datagrams.
    pub fn take_sent(&mut self) -> Vec<SentPacket> {
        std::mem::take(&mut self.sent)
    }

    /// Datagrams still waiting to be received.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }
}

impl Transport for MemoryTransport {
    fn send_packet(&mut self, socket: SocketKind, data: &[u8], to: &NetAddress) {
        self.sent.push(SentPacket {
            socket,
            data: data.to_vec(),
            to: *to,
        });
    }

    fn receive_packet(&mut self, socket: SocketKind) -> Option<(Vec<u8>, NetAddress)> {
        let index = self.inbox.iter().position(|(s, ..)| *s == socket)?;
        self.inbox.remove(index).map(|(_, data, from)| (data, from))
    }
}
