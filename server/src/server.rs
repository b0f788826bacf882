//! The server context: every registry the core owns plus its collaborators.

use std::num::NonZeroUsize;

use bitstream::ByteBuffer;
use codec::{
    calc_ping, write_pings, Baselines, ClientFrame, CodecLimits, DeltaSource, EntityDeltaEncoder,
    FrameSequence, PacketEntities, PingRow, SnapshotDeltaBuilder,
};
use tracing::{debug, info, warn};
use wire::{banned_packet, is_connectionless, InfoString, Limits, MessageWrite, SvcOp};

use crate::address::NetAddress;
use crate::ban::BanRegistry;
use crate::challenge::ChallengeRegistry;
use crate::client::{ClientTable, ConnectionState, MAX_DATAGRAM};
use crate::collab::{AuthBackend, GameLogic, SocketKind, Transport};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::rate_limit::{CommandClass, RateBreach, RateLimiters};
use crate::rcon::RconGuard;
use crate::userid::NetworkUserId;

/// Entity numbers covered by static baselines.
pub const MAX_EDICTS: usize = 900;

/// What [`Server::handle_packet`] did with a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDisposition {
    /// The source is filtered; a ban notice was sent.
    Banned,
    /// Handled as a connectionless command.
    Connectionless,
    /// In-band traffic from the client in this slot.
    Client(usize),
    /// In-band traffic from nobody we know.
    Unknown,
}

/// Server-side protocol core.
///
/// Owns the challenge ring, ban lists, rcon guard, flood limiters and client
/// table, and reaches the outside world only through its three
/// collaborators.
pub struct Server<T, A, G> {
    pub(crate) config: ServerConfig,
    pub(crate) wire_limits: Limits,
    pub(crate) codec_limits: CodecLimits,
    pub(crate) challenges: ChallengeRegistry,
    pub(crate) bans: BanRegistry,
    pub(crate) rcon: RconGuard,
    pub(crate) rate_limiters: RateLimiters,
    pub(crate) clients: ClientTable,
    pub(crate) baselines: Baselines,
    pub(crate) transport: T,
    pub(crate) auth: A,
    pub(crate) game: G,
    pub(crate) realtime: f64,
}

impl<T, A, G> Server<T, A, G>
where
    T: Transport,
    A: AuthBackend,
    G: GameLogic,
{
    /// Validates `config` and builds an empty server.
    pub fn new(config: ServerConfig, transport: T, auth: A, game: G) -> ServerResult<Self> {
        config.validate()?;
        let update_backup =
            NonZeroUsize::new(config.update_backup).ok_or(ServerError::InvalidConfig {
                field: "update_backup",
                reason: "must be at least 1".to_string(),
            })?;
        let codec_limits = CodecLimits::default();

        Ok(Self {
            wire_limits: Limits::default(),
            challenges: ChallengeRegistry::new(&config.challenges),
            bans: BanRegistry::new(config.max_filters, config.filter_ban, config.lan),
            rcon: RconGuard::new(&config.rcon),
            rate_limiters: RateLimiters::new(&config.rate_limits, config.max_clients),
            clients: ClientTable::new(config.max_clients, update_backup),
            baselines: Baselines::new(MAX_EDICTS, &codec_limits),
            codec_limits,
            transport,
            auth,
            game,
            realtime: 0.0,
            config,
        })
    }

    /// Replaces the challenge generator with a seeded one.
    #[must_use]
    pub fn with_challenge_seed(mut self, seed: u64) -> Self {
        self.challenges = ChallengeRegistry::with_seed(&self.config.challenges, seed);
        self
    }

    /// Replaces the codec limits.
    #[must_use]
    pub fn with_codec_limits(mut self, limits: CodecLimits) -> Self {
        self.codec_limits = limits;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    pub fn clients_mut(&mut self) -> &mut ClientTable {
        &mut self.clients
    }

    pub fn challenges(&self) -> &ChallengeRegistry {
        &self.challenges
    }

    pub fn bans(&self) -> &BanRegistry {
        &self.bans
    }

    pub fn bans_mut(&mut self) -> &mut BanRegistry {
        &mut self.bans
    }

    pub fn rcon(&self) -> &RconGuard {
        &self.rcon
    }

    pub fn rate_limiters(&self) -> &RateLimiters {
        &self.rate_limiters
    }

    pub fn baselines(&self) -> &Baselines {
        &self.baselines
    }

    pub fn baselines_mut(&mut self) -> &mut Baselines {
        &mut self.baselines
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub fn game(&self) -> &G {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut G {
        &mut self.game
    }

    /// Current server time in seconds.
    pub const fn realtime(&self) -> f64 {
        self.realtime
    }

    /// Advances the server clock.
    pub fn set_time(&mut self, now: f64) {
        self.realtime = now;
    }

    pub(crate) fn send(&mut self, data: &[u8], to: &NetAddress) {
        self.transport.send_packet(SocketKind::Server, data, to);
    }

    /// Routes one inbound datagram.
    ///
    /// Filtered sources get a ban notice. Connectionless datagrams are
    /// dispatched by command; anything else refreshes the sending client's
    /// timeout and is left to the caller.
    pub fn handle_packet(&mut self, data: &[u8], from: &NetAddress) -> PacketDisposition {
        if self.bans.filter_packet(from, self.realtime) {
            self.send(&banned_packet(), from);
            return PacketDisposition::Banned;
        }

        if is_connectionless(data) {
            self.handle_connectionless(data, from);
            return PacketDisposition::Connectionless;
        }

        let now = self.realtime;
        let client = self
            .clients
            .iter_mut()
            .find(|c| c.is_connected() && c.address.as_ref() == Some(from));
        match client {
            Some(client) => {
                client.last_received = now;
                PacketDisposition::Client(client.slot)
            }
            None => {
                debug!(address = %from, len = data.len(), "Sequenced packet without connection");
                PacketDisposition::Unknown
            }
        }
    }

    /// Drains the transport, handling every pending datagram.
    ///
    /// Returns how many were read.
    pub fn read_packets(&mut self) -> usize {
        let mut count = 0;
        while let Some((data, from)) = self.transport.receive_packet(SocketKind::Server) {
            self.handle_packet(&data, &from);
            count += 1;
        }
        count
    }

    /// Whether traffic from `address` is refused.
    pub fn check_ban(&mut self, address: &NetAddress) -> bool {
        self.bans.filter_packet(address, self.realtime)
    }

    /// Whether the user id is refused.
    pub fn check_user_ban(&mut self, id: &NetworkUserId) -> bool {
        self.bans.filter_user(id, self.realtime)
    }

    /// Adds an address ban and drops in-game clients it covers.
    ///
    /// Returns the slots that were dropped.
    pub fn add_ip(&mut self, minutes: f32, text: &str) -> ServerResult<Vec<usize>> {
        let filter = self.bans.add_ip(minutes, text, self.realtime)?;
        if !self.config.filter_ban {
            return Ok(Vec::new());
        }

        let kicked: Vec<usize> = self
            .clients
            .iter()
            .filter(|c| c.state.is_in_game() && !c.fake)
            .filter(|c| c.address.is_some_and(|a| filter.matches(a.octets())))
            .map(|c| c.slot)
            .collect();
        for &slot in &kicked {
            self.drop_client(slot, "Added to banned list")?;
        }
        Ok(kicked)
    }

    /// Bans a user id, given as `#<userid>` of a connected client or as an id
    /// string. With `kick`, connected clients using the id are dropped.
    pub fn ban_id(&mut self, minutes: f32, selector: &str, kick: bool) -> ServerResult<NetworkUserId> {
        let id = match selector.strip_prefix('#') {
            Some(user_id) => user_id
                .parse::<i32>()
                .ok()
                .and_then(|user_id| self.clients.find_by_user_id(user_id))
                .and_then(|slot| self.clients.get(slot))
                .map(|client| client.network_id),
            None => NetworkUserId::parse(selector),
        }
        .ok_or_else(|| ServerError::InvalidUserId {
            text: selector.to_string(),
        })?;

        self.bans.ban_id(minutes, id, self.realtime)?;

        if kick {
            let lan = self.config.lan;
            let matching: Vec<usize> = self
                .clients
                .iter()
                .filter(|c| c.is_connected() && !c.fake && c.network_id.matches(&id, lan))
                .map(|c| c.slot)
                .collect();
            for slot in matching {
                self.drop_client(slot, "Kicked and banned")?;
            }
        }
        Ok(id)
    }

    /// Counts `count` movement commands from `slot`.
    ///
    /// Returns the breach if the client was dropped and banned for it.
    pub fn record_move_commands(&mut self, slot: usize, count: u32) -> ServerResult<Option<RateBreach>> {
        self.record_commands(slot, CommandClass::Move, count)
    }

    /// Counts one string command from `slot`.
    pub fn record_string_command(&mut self, slot: usize) -> ServerResult<Option<RateBreach>> {
        self.record_commands(slot, CommandClass::String, 1)
    }

    fn record_commands(
        &mut self,
        slot: usize,
        class: CommandClass,
        count: u32,
    ) -> ServerResult<Option<RateBreach>> {
        let active = self
            .clients
            .get(slot)
            .ok_or(ServerError::InvalidSlot { slot })?
            .state
            .is_in_game();
        let now = self.realtime;
        if self.rate_limiters.for_class(class).issued(slot, count, active, now) {
            self.punish_flood(slot, class, RateBreach::Burst)?;
            return Ok(Some(RateBreach::Burst));
        }
        Ok(None)
    }

    /// Decays both flood limiters and punishes average-rate breaches.
    ///
    /// Returns the slots that were dropped.
    pub fn rate_limit_frame(&mut self) -> ServerResult<Vec<usize>> {
        let now = self.realtime;
        let clients = &self.clients;
        let in_game = |slot: usize| clients.get(slot).is_some_and(|c| c.state.is_in_game());
        let moves = self.rate_limiters.moves.decay(now, in_game);
        let strings = self.rate_limiters.strings.decay(now, in_game);

        let mut dropped = Vec::new();
        for (class, slots) in [(CommandClass::Move, moves), (CommandClass::String, strings)] {
            for slot in slots {
                if dropped.contains(&slot) {
                    continue;
                }
                self.punish_flood(slot, class, RateBreach::Average)?;
                dropped.push(slot);
            }
        }
        Ok(dropped)
    }

    fn punish_flood(&mut self, slot: usize, class: CommandClass, breach: RateBreach) -> ServerResult<()> {
        let client = self.clients.get(slot).ok_or(ServerError::InvalidSlot { slot })?;
        let address = client.address;
        warn!(
            slot,
            name = %client.name,
            class = ?class,
            breach = ?breach,
            "Command flood detected"
        );

        self.drop_client(slot, class.drop_reason(breach))?;
        if let Some(address) = address.filter(|a| !a.is_loopback()) {
            let minutes = self.config.rate_limits.flood_ban_minutes;
            if let Err(err) = self.add_ip(minutes, &address.base_string()) {
                warn!(address = %address, error = %err, "Couldn't ban flooding address");
            }
        }
        Ok(())
    }

    /// Disconnects the client in `slot` and frees it.
    ///
    /// The address stays on the slot so a reconnect lands in the same place.
    pub fn drop_client(&mut self, slot: usize, reason: &str) -> ServerResult<()> {
        let client = self
            .clients
            .get_mut(slot)
            .ok_or(ServerError::InvalidSlot { slot })?;
        if !client.is_connected() {
            return Ok(());
        }

        info!(
            slot,
            name = %client.name,
            user_id = client.user_id,
            reason,
            "Dropped client"
        );
        let was_in_game = client.state.is_in_game();
        let fake = client.fake;
        client.reset();

        if !fake {
            self.auth.notify_client_disconnect(slot);
        }
        if was_in_game {
            self.game.on_client_disconnect(slot);
        }
        Ok(())
    }

    /// Drops every client silent for longer than the timeout.
    ///
    /// Returns the dropped slots.
    pub fn check_timeouts(&mut self) -> ServerResult<Vec<usize>> {
        let drop_time = self.realtime - self.config.timeout_secs;
        let expired: Vec<(usize, String)> = self
            .clients
            .iter()
            .filter(|c| !c.fake && c.is_connected() && c.last_received < drop_time)
            .map(|c| (c.slot, c.name.clone()))
            .collect();

        for (slot, name) in &expired {
            info!(slot, "{name} timed out");
            self.drop_client(*slot, "Timed out")?;
        }
        Ok(expired.into_iter().map(|(slot, _)| slot).collect())
    }

    /// Replaces a client's userinfo, re-deriving its name.
    pub fn set_user_info(&mut self, slot: usize, mut userinfo: InfoString) -> ServerResult<()> {
        let client = self.clients.get(slot).ok_or(ServerError::InvalidSlot { slot })?;
        if !client.is_connected() {
            return Err(ServerError::InvalidSlot { slot });
        }

        userinfo.remove_key("password");
        let sanitized = crate::admission::sanitize_name(userinfo.value_for_key("name").unwrap_or(""));
        let name = crate::admission::unique_name(&self.clients, &sanitized, Some(slot));
        userinfo.set_value_for_key("name", &name, &self.wire_limits)?;
        if let Some(sid) = client.userinfo.value_for_key("*sid").map(str::to_string) {
            userinfo.set_star_value_for_key("*sid", &sid, &self.wire_limits)?;
        }

        let client = self
            .clients
            .get_mut(slot)
            .ok_or(ServerError::InvalidSlot { slot })?;
        client.name = name;
        client.proxy = crate::admission::atoi(userinfo.value_for_key("*hltv").unwrap_or("")) == 1;
        client.userinfo = userinfo;
        self.game.on_client_user_info_changed(slot, &client.userinfo);
        Ok(())
    }

    /// One ping table row per in-game client.
    pub fn ping_rows(&self) -> Vec<PingRow> {
        self.clients
            .iter()
            .filter(|c| c.state.is_in_game())
            .map(|c| PingRow {
                slot: c.slot as u32,
                ping: if c.fake {
                    0
                } else {
                    calc_ping(&c.frames, c.incoming_acknowledged)
                },
                loss: c.packet_loss,
            })
            .collect()
    }

    /// Builds the unreliable datagram for the client in `slot`.
    ///
    /// Writes the server time, the visible entities (delta-compressed against
    /// the frame the client asked for when it is still held) and optionally
    /// the ping table, then appends whatever the client had queued. The frame
    /// is recorded under the client's outgoing sequence.
    ///
    /// An overflowed message yields an empty datagram.
    pub fn build_client_datagram<E>(
        &mut self,
        slot: usize,
        visible: PacketEntities,
        encoder: &mut E,
        send_pings: bool,
    ) -> ServerResult<Vec<u8>>
    where
        E: EntityDeltaEncoder + ?Sized,
    {
        let pings = if send_pings { Some(self.ping_rows()) } else { None };
        let realtime = self.realtime;
        let client = self
            .clients
            .get_mut(slot)
            .filter(|c| c.is_connected())
            .ok_or(ServerError::InvalidSlot { slot })?;

        let mut msg = ByteBuffer::overflowable(format!("datagram {}", client.name), MAX_DATAGRAM);
        msg.write_byte(SvcOp::Time.raw())?;
        msg.write_float(realtime as f32)?;

        let from = client
            .delta_sequence
            .and_then(|sequence| {
                client.frames.get(sequence).map(|frame| DeltaSource {
                    sequence,
                    entities: &frame.entities,
                })
            });
        SnapshotDeltaBuilder::new(&self.baselines, &self.codec_limits)
            .with_max_clients(self.config.max_clients as u32)
            .with_instanced_baselines(self.config.instanced_baselines)
            .write(encoder, &mut msg, &visible, from)?;

        if let Some(rows) = pings {
            write_pings(&mut msg, rows)?;
        }

        if client.datagram.is_overflowed() {
            warn!(name = %client.name, "Datagram overflowed, discarding");
        } else {
            msg.write(client.datagram.as_slice())?;
        }
        client.datagram.clear();

        let sequence = FrameSequence::new(client.outgoing_sequence);
        client.frames.insert(
            sequence,
            ClientFrame {
                sent_time: realtime,
                ping_time: -1.0,
                entities: visible,
            },
        )?;
        client.outgoing_sequence = client.outgoing_sequence.wrapping_add(1);

        if msg.is_overflowed() {
            warn!(name = %client.name, "Message overflowed, sending empty datagram");
            return Ok(Vec::new());
        }
        Ok(msg.as_slice().to_vec())
    }

    /// Marks the client in `slot` as in game.
    pub fn activate_client(&mut self, slot: usize, spawned: bool) -> ServerResult<()> {
        let client = self
            .clients
            .get_mut(slot)
            .filter(|c| c.is_connected())
            .ok_or(ServerError::InvalidSlot { slot })?;
        client.state = if spawned {
            ConnectionState::Spawned
        } else {
            ConnectionState::Active
        };
        client.fully_connected = true;
        Ok(())
    }
}
