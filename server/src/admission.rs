//! Connection admission: the `connect` handshake.
//!
//! Every check runs before the client table is touched. A rejection sends
//! exactly one packet to the source and leaves the server as it was; only
//! [`Server::admit_connection`]'s final commit step mutates a slot.

use tracing::{debug, info, warn};
use wire::{
    accept_packet, bad_password_packet, reject_packet, CommandKind, CommandLine,
    ConnectionlessPacket, InfoString, MAX_NAME,
};

use crate::address::NetAddress;
use crate::challenge::ChallengeCheck;
use crate::client::{ClientTable, ConnectionState};
use crate::collab::{AuthBackend, GameLogic, Transport};
use crate::server::Server;
use crate::userid::{AuthProtocol, NetworkUserId};

/// Longest Steam ticket accepted, exclusive.
const MAX_TICKET_LEN: usize = 1024;

/// Length of a hashed key and of a proxy certificate.
const HASHED_KEY_LEN: usize = 32;

/// Duplicate names are cut to this many bytes before the `(N)` prefix.
const DUPLICATE_NAME_LEN: usize = 28;

/// Result of a `connect` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// The client holds `slot` and was sent the accept packet.
    ///
    /// `duplicate_of` names another connected client with the same Steam
    /// id. What to do about it is up to the caller.
    Admitted {
        slot: usize,
        user_id: i32,
        reconnect: bool,
        duplicate_of: Option<usize>,
    },
    /// One rejection packet was sent; nothing changed.
    Rejected { reason: String },
    /// Not a `connect` packet.
    Ignored,
}

impl AdmissionOutcome {
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

#[derive(Debug)]
enum Rejection {
    Reject(String),
    BadPassword,
}

impl Rejection {
    fn reason(text: impl Into<String>) -> Self {
        Self::Reject(text.into())
    }
}

/// Everything a successful check collects for the commit step.
#[derive(Debug)]
struct PendingClient {
    slot: usize,
    reconnect: bool,
    name: String,
    userinfo: InfoString,
    hashed_key: String,
    network_id: NetworkUserId,
    proxy: bool,
}

/// Parsed `protinfo`.
#[derive(Debug)]
struct KeyInfo {
    protocol: AuthProtocol,
    certificate: String,
    hashed_key: String,
}

/// Parses a leading decimal integer the lenient C way: optional whitespace
/// and sign, then digits; anything unparsable is 0.
pub(crate) fn atoi(text: &str) -> i32 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let mut value: i32 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.wrapping_mul(10).wrapping_add(i32::from(b - b'0'));
    }
    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}

/// Cuts `text` to at most `max` bytes without splitting a character.
fn truncate_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Cleans a requested player name.
///
/// `%` and `&` become spaces, control characters and surrounding whitespace
/// go, and leading `#` is stripped. Empty names, `console` and names with
/// `..` become `unnamed`.
pub(crate) fn sanitize_name(raw: &str) -> String {
    let cut = truncate_bytes(raw, MAX_NAME - 1);
    let cleaned: String = cut
        .chars()
        .map(|c| if c == '%' || c == '&' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();
    let name = cleaned.trim().trim_start_matches('#').trim();

    if name.is_empty() || name.eq_ignore_ascii_case("console") || name.contains("..") {
        "unnamed".to_string()
    } else {
        name.to_string()
    }
}

/// Prefixes `(N)` until no other connected client uses the name.
pub(crate) fn unique_name(clients: &ClientTable, name: &str, except: Option<usize>) -> String {
    let raw = truncate_bytes(name, DUPLICATE_NAME_LEN);
    let mut candidate = name.to_string();
    let mut n = 0;
    while clients.name_in_use(&candidate, except) {
        n += 1;
        candidate = format!("({n}){raw}");
    }
    candidate
}

/// The client IP as stored in a user id: the address octets in memory order.
fn client_ip(address: &NetAddress, lan: bool) -> u32 {
    if address.is_loopback() && lan {
        0x7F00_0001
    } else {
        u32::from_le_bytes(address.octets())
    }
}

impl<T, A, G> Server<T, A, G>
where
    T: Transport,
    A: AuthBackend,
    G: GameLogic,
{
    /// Runs the `connect` handshake for one datagram.
    ///
    /// A rejected attempt gets exactly one packet (a rejection reason or the
    /// bad-password notice) and changes nothing. An admitted one claims a
    /// slot and gets the accept packet.
    pub fn admit_connection(&mut self, datagram: &[u8], from: &NetAddress) -> AdmissionOutcome {
        let Some(packet) = ConnectionlessPacket::parse(datagram, &self.wire_limits) else {
            return AdmissionOutcome::Ignored;
        };
        if packet.kind() != CommandKind::Connect {
            return AdmissionOutcome::Ignored;
        }
        self.connect(&packet.command, packet.payload, from)
    }

    pub(crate) fn connect(
        &mut self,
        command: &CommandLine,
        payload: &[u8],
        from: &NetAddress,
    ) -> AdmissionOutcome {
        match self.check_connect(command, payload, from) {
            Ok(pending) => self.commit(pending, from),
            Err(Rejection::BadPassword) => {
                debug!(address = %from, "Password failed");
                self.send(&bad_password_packet(), from);
                AdmissionOutcome::Rejected {
                    reason: "BADPASSWORD".to_string(),
                }
            }
            Err(Rejection::Reject(reason)) => {
                debug!(address = %from, reason = reason.trim_end(), "Connection rejected");
                self.send(&reject_packet(&reason), from);
                AdmissionOutcome::Rejected { reason }
            }
        }
    }

    fn check_connect(
        &mut self,
        command: &CommandLine,
        payload: &[u8],
        from: &NetAddress,
    ) -> Result<PendingClient, Rejection> {
        if command.argc() < 5 {
            return Err(Rejection::reason("Insufficient connection info\n"));
        }

        self.check_protocol(atoi(command.argv(1)))?;

        match self.challenges.check(from, atoi(command.argv(2)) as u32) {
            ChallengeCheck::Bypass | ChallengeCheck::Valid => {}
            ChallengeCheck::Mismatch => return Err(Rejection::reason("Bad challenge.\n")),
            ChallengeCheck::Missing => {
                return Err(Rejection::reason("No challenge for your address.\n"))
            }
        }

        let protinfo = InfoString::new(command.argv(3));
        if !protinfo.is_valid(&self.wire_limits) {
            return Err(Rejection::reason("Invalid protinfo in connect command\n"));
        }
        let key = Self::check_key_info(&protinfo)?;

        if !self.ip_allowed(from, key.protocol) {
            return Err(Rejection::reason(
                "LAN servers are restricted to local clients (class C).\n",
            ));
        }

        let raw_userinfo = command.argv(4);
        let mut userinfo = InfoString::new(raw_userinfo);
        if raw_userinfo.len() >= self.wire_limits.max_info_string
            || !userinfo.is_valid(&self.wire_limits)
        {
            return Err(Rejection::reason("Invalid userinfo in connect command\n"));
        }

        let reconnect_slot = if self.config.lan
            || matches!(key.protocol, AuthProtocol::HashedKey | AuthProtocol::Steam)
        {
            self.clients.find_by_address(from)
        } else {
            None
        };

        let (name, proxy) = self.check_user_info(from, &mut userinfo, reconnect_slot)?;
        Self::check_certificate(from, &key, &userinfo)?;

        let slot = match reconnect_slot {
            Some(slot) => slot,
            None => self
                .clients
                .find_free_slot()
                .ok_or_else(|| Rejection::reason("Server is full.\n"))?,
        };

        if self.clients.half_open_count(from) > self.config.max_half_open_per_address {
            warn!(address = %from, "Too many connect packets from {from}");
            return Err(Rejection::reason(
                "Too many connect packets from your address.\n",
            ));
        }

        let network_id = self.authenticate(from, &key, payload, &userinfo)?;

        self.game
            .on_client_connect(slot, from, &name, &userinfo)
            .map_err(Rejection::Reject)?;

        Ok(PendingClient {
            slot,
            reconnect: reconnect_slot.is_some(),
            name,
            userinfo,
            hashed_key: key.hashed_key,
            network_id,
            proxy,
        })
    }

    fn check_protocol(&self, version: i32) -> Result<(), Rejection> {
        let ours = self.config.protocol_version;
        if version == ours {
            return Ok(());
        }
        let text = if version < ours {
            format!(
                "This server is using a newer protocol ( {ours} ) than your client ( {version} ).  You should check for updates to your client.\n"
            )
        } else {
            let contact = if self.config.admin_contact.is_empty() {
                "(no email address specified)"
            } else {
                self.config.admin_contact.as_str()
            };
            format!(
                "This server is using an older protocol ( {ours} ) than your client ( {version} ).  If you believe this server is outdated, you can contact the server administrator at {contact}.\n"
            )
        };
        Err(Rejection::Reject(text))
    }

    fn check_key_info(protinfo: &InfoString) -> Result<KeyInfo, Rejection> {
        let protocol = AuthProtocol::from_raw(atoi(protinfo.value_for_key("prot").unwrap_or("")))
            .ok_or_else(|| Rejection::reason("Invalid connection.\n"))?;

        let certificate = protinfo.value_for_key("raw").unwrap_or("");
        if certificate.is_empty()
            || (protocol == AuthProtocol::HashedKey && certificate.len() != HASHED_KEY_LEN)
        {
            return Err(Rejection::reason(
                "Invalid authentication certificate length.\n",
            ));
        }

        let hashed_key = if protocol == AuthProtocol::HashedKey {
            certificate
        } else {
            let cdkey = protinfo.value_for_key("cdkey").unwrap_or("");
            if cdkey.len() != HASHED_KEY_LEN {
                return Err(Rejection::reason("Invalid hashed CD key.\n"));
            }
            cdkey
        };

        Ok(KeyInfo {
            protocol,
            certificate: certificate.to_string(),
            hashed_key: hashed_key.to_string(),
        })
    }

    /// LAN servers, and non-Steam clients anywhere, must come from a private
    /// address; HLTV proxies are exempt.
    fn ip_allowed(&self, from: &NetAddress, protocol: AuthProtocol) -> bool {
        if !self.config.lan && protocol == AuthProtocol::Steam {
            return true;
        }
        protocol == AuthProtocol::HashedKey || (self.config.lan && from.is_reserved())
    }

    /// Password, shape, name and HLTV checks. Returns the final name and
    /// whether the client is a proxy.
    fn check_user_info(
        &self,
        from: &NetAddress,
        userinfo: &mut InfoString,
        reconnect_slot: Option<usize>,
    ) -> Result<(String, bool), Rejection> {
        if !from.is_loopback()
            && self.config.has_password()
            && userinfo.value_for_key("password").unwrap_or("") != self.config.password
        {
            return Err(Rejection::BadPassword);
        }

        let raw = userinfo.as_str();
        if raw.len() <= 4 || raw.contains("\\\\") || raw.ends_with('\\') {
            return Err(Rejection::reason("Unknown HLTV client type.\n"));
        }

        userinfo.remove_key("password");

        let sanitized = sanitize_name(userinfo.value_for_key("name").unwrap_or(""));
        let name = unique_name(&self.clients, &sanitized, reconnect_slot);
        userinfo
            .set_value_for_key("name", &name, &self.wire_limits)
            .map_err(|_| Rejection::reason("Invalid userinfo in connect command\n"))?;

        let hltv = userinfo.value_for_key("*hltv").unwrap_or("");
        if hltv.is_empty() {
            return Ok((name, false));
        }
        match atoi(hltv) {
            0 => Ok((name, false)),
            1 => {
                if self.clients.proxy_count() >= self.config.max_proxies
                    && reconnect_slot.is_none()
                {
                    return Err(Rejection::reason("Proxy slots are full.\n"));
                }
                Ok((name, true))
            }
            3 => Err(Rejection::reason("Please connect to HLTV master proxy.\n")),
            _ => Err(Rejection::reason("Unknown HLTV client type.\n")),
        }
    }

    fn check_certificate(
        from: &NetAddress,
        key: &KeyInfo,
        userinfo: &InfoString,
    ) -> Result<(), Rejection> {
        if key.protocol != AuthProtocol::HashedKey {
            if !key.certificate.eq_ignore_ascii_case("steam") {
                return Err(Rejection::reason(
                    "Expecting STEAM authentication USERID ticket!\n",
                ));
            }
            return Ok(());
        }

        if key.certificate.len() != HASHED_KEY_LEN {
            return Err(Rejection::reason("Invalid CD Key.\n"));
        }
        if from.is_loopback() {
            return Ok(());
        }
        if atoi(userinfo.value_for_key("*hltv").unwrap_or("")) != 1 {
            return Err(Rejection::reason("Invalid CD Key.\n"));
        }
        Ok(())
    }

    fn authenticate(
        &mut self,
        from: &NetAddress,
        key: &KeyInfo,
        ticket: &[u8],
        userinfo: &InfoString,
    ) -> Result<NetworkUserId, Rejection> {
        let ip = client_ip(from, self.config.lan);
        match key.protocol {
            AuthProtocol::Steam => {
                if ticket.is_empty() || ticket.len() >= MAX_TICKET_LEN {
                    return Err(Rejection::Reject(format!(
                        "STEAM certificate length error! {}/{MAX_TICKET_LEN}\n",
                        ticket.len()
                    )));
                }
                match self
                    .auth
                    .verify_certificate(from, key.protocol, ticket, userinfo)
                {
                    Some(id) => Ok(id.with_ip(ip)),
                    None if self.config.lan => Ok(NetworkUserId::steam(0).with_ip(ip)),
                    None => Err(Rejection::reason("STEAM validation rejected\n")),
                }
            }
            AuthProtocol::HashedKey => {
                if atoi(userinfo.value_for_key("*hltv").unwrap_or("")) != 1 {
                    return Err(Rejection::reason("Invalid validation type\n"));
                }
                Ok(NetworkUserId::local(ip))
            }
            AuthProtocol::Wonid | AuthProtocol::SteamHashed => {
                Err(Rejection::reason("Invalid authentication type\n"))
            }
        }
    }

    fn commit(&mut self, pending: PendingClient, from: &NetAddress) -> AdmissionOutcome {
        let slot = pending.slot;
        let lan = self.config.lan;

        if pending.reconnect {
            if let Some(old) = self.clients.get(slot).filter(|c| c.is_connected()) {
                let was_in_game = old.state.is_in_game();
                self.auth.notify_client_disconnect(slot);
                if was_in_game {
                    self.game.on_client_disconnect(slot);
                }
            }
            info!(address = %from, "{from}:reconnect");
        }

        let user_id = self.clients.next_user_id();
        let mut userinfo = pending.userinfo;
        let steam_id = pending.network_id.steam_id.to_string();
        if let Err(err) = userinfo.set_star_value_for_key("*sid", &steam_id, &self.wire_limits) {
            debug!(slot, error = %err, "Couldn't store *sid");
        }

        let realtime = self.realtime;
        let Some(client) = self.clients.get_mut(slot) else {
            return AdmissionOutcome::Rejected {
                reason: "Server is full.\n".to_string(),
            };
        };
        client.reset();
        client.state = ConnectionState::Connected;
        client.address = Some(*from);
        client.user_id = user_id;
        client.network_id = pending.network_id;
        client.name = pending.name;
        client.hashed_key = pending.hashed_key;
        client.proxy = pending.proxy;
        client.userinfo = userinfo;
        client.last_received = realtime;
        client.datagram.set_allow_overflow(true);
        client.datagram.set_name(client.name.clone());

        let id_string = client.network_id.id_string(lan);
        info!(
            name = %client.name,
            user_id,
            id = %id_string,
            address = %from,
            "Client connected"
        );

        self.auth.notify_client_connect(slot, &pending.network_id);
        let accept = accept_packet(
            user_id,
            &from.to_string(),
            self.config.secure,
            self.config.build_number,
        );
        self.send(&accept, from);
        if let Some(client) = self.clients.get(slot) {
            self.game.on_client_user_info_changed(slot, &client.userinfo);
        }
        self.rate_limiters.client_connected(slot);

        let duplicate_of = self.find_duplicate_steam_id(slot);
        if let Some(other) = duplicate_of {
            warn!(slot, other, address = %from, "Duplicate Steam id");
        }

        AdmissionOutcome::Admitted {
            slot,
            user_id,
            reconnect: pending.reconnect,
            duplicate_of,
        }
    }

    /// Another connected client with the same Steam or Valve id as `slot`.
    ///
    /// Always `None` on LAN servers, where ids are not unique.
    pub fn find_duplicate_steam_id(&self, slot: usize) -> Option<usize> {
        if self.config.lan {
            return None;
        }
        let id = self.clients.get(slot)?.network_id;
        self.clients
            .iter()
            .filter(|c| c.slot != slot && c.is_connected() && !c.fake)
            .find(|c| c.network_id.matches(&id, false))
            .map(|c| c.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::server::test_support::{oob, seat, test_server, TestServer, STEAM_ID_OF_TEST_CLIENT};
    use std::num::NonZeroUsize;

    #[test]
    fn atoi_is_lenient() {
        assert_eq!(atoi("48"), 48);
        assert_eq!(atoi("  -12abc"), -12);
        assert_eq!(atoi("+7"), 7);
        assert_eq!(atoi("abc"), 0);
        assert_eq!(atoi(""), 0);
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("  Gordon  "), "Gordon");
        assert_eq!(sanitize_name("100%&fun"), "100  fun");
        assert_eq!(sanitize_name("##hash"), "hash");
        assert_eq!(sanitize_name("bad\u{7}bell"), "badbell");
        assert_eq!(sanitize_name(""), "unnamed");
        assert_eq!(sanitize_name("CONSOLE"), "unnamed");
        assert_eq!(sanitize_name("../etc"), "unnamed");
        assert_eq!(sanitize_name(&"x".repeat(40)).len(), MAX_NAME - 1);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_bytes("héllo", 2), "h");
        assert_eq!(truncate_bytes("abc", 10), "abc");
    }

    #[test]
    fn duplicate_names_get_prefix() {
        let mut clients = ClientTable::new(3, NonZeroUsize::new(4).unwrap());
        for (slot, name) in [(0, "player"), (1, "(1)player")] {
            let client = clients.get_mut(slot).unwrap();
            client.state = ConnectionState::Connected;
            client.name = name.to_string();
        }
        assert_eq!(unique_name(&clients, "Player", None), "(2)Player");
        assert_eq!(unique_name(&clients, "player", Some(0)), "player");
        assert_eq!(unique_name(&clients, "other", None), "other");

        let long = "y".repeat(31);
        clients.get_mut(2).unwrap().state = ConnectionState::Connected;
        clients.get_mut(2).unwrap().name = long.clone();
        assert_eq!(unique_name(&clients, &long, None), format!("(1){}", "y".repeat(28)));
    }

    #[test]
    fn client_ip_uses_memory_order() {
        let addr = NetAddress::ip([10, 0, 0, 1], 1);
        assert_eq!(client_ip(&addr, false), 0x0100_000A);
        assert_eq!(client_ip(&NetAddress::Loopback, true), 0x7F00_0001);
    }

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn peer(port: u16) -> NetAddress {
        NetAddress::ip([198, 51, 100, 1], port)
    }

    fn connect_with(
        server: &mut TestServer,
        from: &NetAddress,
        protinfo: &str,
        userinfo: &str,
    ) -> AdmissionOutcome {
        let challenge = server.challenges.issue(from, server.realtime);
        let mut data = oob(&format!(
            "connect {} {challenge} \"{protinfo}\" \"{userinfo}\"\n",
            server.config().protocol_version
        ));
        data.extend_from_slice(b"ticket");
        server.admit_connection(&data, from)
    }

    fn connect(server: &mut TestServer, from: &NetAddress, userinfo: &str) -> AdmissionOutcome {
        let protinfo = format!("\\prot\\3\\unique\\-1\\raw\\steam\\cdkey\\{KEY}");
        connect_with(server, from, &protinfo, userinfo)
    }

    fn rejected(outcome: &AdmissionOutcome) -> &str {
        match outcome {
            AdmissionOutcome::Rejected { reason } => reason,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn admits_steam_client() {
        let mut server = test_server(ServerConfig::for_testing());
        let from = peer(27005);

        let outcome = connect(&mut server, &from, "\\name\\Gordon\\rate\\25000");
        assert_eq!(
            outcome,
            AdmissionOutcome::Admitted {
                slot: 0,
                user_id: 1,
                reconnect: false,
                duplicate_of: None,
            }
        );

        let sent = server.transport().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data, accept_packet(1, &from.to_string(), false, 8684));

        let client = server.clients().get(0).unwrap();
        assert_eq!(client.state, ConnectionState::Connected);
        assert_eq!(client.name, "Gordon");
        assert_eq!(client.hashed_key, KEY);
        assert_eq!(client.network_id.steam_id, STEAM_ID_OF_TEST_CLIENT);
        assert_eq!(
            client.userinfo.value_for_key("*sid"),
            Some(STEAM_ID_OF_TEST_CLIENT.to_string().as_str())
        );
        assert_eq!(server.auth().connected, vec![0]);
        assert_eq!(server.game().connected, vec![0]);
    }

    #[test]
    fn non_connect_packets_are_ignored() {
        let mut server = test_server(ServerConfig::for_testing());
        assert_eq!(server.admit_connection(&oob("ping"), &peer(1)), AdmissionOutcome::Ignored);
        assert_eq!(server.admit_connection(b"not oob", &peer(1)), AdmissionOutcome::Ignored);
        assert!(server.transport().sent().is_empty());
    }

    #[test]
    fn bad_challenge_sends_one_reject() {
        let mut server = test_server(ServerConfig::for_testing());
        let from = peer(27005);
        server.challenges.issue(&from, 0.0);

        let data = oob(&format!(
            "connect 48 1 \"\\prot\\3\\raw\\steam\\cdkey\\{KEY}\" \"\\name\\x\\rate\\1\"\n"
        ));
        let outcome = server.admit_connection(&data, &from);
        assert_eq!(rejected(&outcome), "Bad challenge.\n");
        assert_eq!(server.transport().sent().len(), 1);
        assert_eq!(server.transport().sent()[0].data, reject_packet("Bad challenge.\n"));
        assert_eq!(server.clients().free_count(), 4);
    }

    #[test]
    fn missing_challenge_and_short_command() {
        let mut server = test_server(ServerConfig::for_testing());
        let data = oob("connect 48 1 \"\\prot\\3\" \"\\name\\x\"\n");
        let outcome = server.admit_connection(&data, &peer(1));
        assert_eq!(rejected(&outcome), "No challenge for your address.\n");

        let outcome = server.admit_connection(&oob("connect 48 1"), &peer(1));
        assert_eq!(rejected(&outcome), "Insufficient connection info\n");
    }

    #[test]
    fn protocol_mismatch_messages() {
        let mut server = test_server(ServerConfig::for_testing());
        let data = oob("connect 47 1 a b\n");
        let outcome = server.admit_connection(&data, &peer(1));
        assert!(rejected(&outcome).starts_with("This server is using a newer protocol ( 48 ) than your client ( 47 )"));

        let data = oob("connect 49 1 a b\n");
        let outcome = server.admit_connection(&data, &peer(1));
        assert!(rejected(&outcome).ends_with("at (no email address specified).\n"));
    }

    #[test]
    fn key_info_checks() {
        let mut server = test_server(ServerConfig::for_testing());
        let from = peer(1);
        let info = "\\name\\x\\rate\\1";

        let outcome = connect_with(&mut server, &from, "\\prot\\9\\raw\\steam", info);
        assert_eq!(rejected(&outcome), "Invalid connection.\n");
        let outcome = connect_with(&mut server, &from, "\\prot\\3\\raw\\steam\\cdkey\\short", info);
        assert_eq!(rejected(&outcome), "Invalid hashed CD key.\n");
        let outcome = connect_with(&mut server, &from, "\\prot\\2\\raw\\short", info);
        assert_eq!(rejected(&outcome), "Invalid authentication certificate length.\n");
        let outcome = connect_with(&mut server, &from, "\\prot\\3\\raw\\", info);
        assert_eq!(rejected(&outcome), "Invalid protinfo in connect command\n");
        let outcome = connect_with(
            &mut server,
            &from,
            &format!("\\prot\\3\\raw\\valve\\cdkey\\{KEY}"),
            info,
        );
        assert_eq!(rejected(&outcome), "Expecting STEAM authentication USERID ticket!\n");
        assert_eq!(server.clients().free_count(), 4);
    }

    #[test]
    fn wrong_password_gets_notice() {
        let mut config = ServerConfig::for_testing();
        config.password = "pw".to_string();
        let mut server = test_server(config);
        let from = peer(1);

        let outcome = connect(&mut server, &from, "\\name\\x\\rate\\1");
        assert!(!outcome.is_admitted());
        assert_eq!(server.transport().sent()[0].data, bad_password_packet());

        let outcome = connect(&mut server, &from, "\\name\\x\\password\\pw");
        assert!(outcome.is_admitted());
        let client = server.clients().get(0).unwrap();
        assert_eq!(client.userinfo.value_for_key("password"), None);
    }

    #[test]
    fn malformed_userinfo_is_refused() {
        let mut server = test_server(ServerConfig::for_testing());
        let outcome = connect(&mut server, &peer(1), "\\a\\b");
        assert_eq!(rejected(&outcome), "Unknown HLTV client type.\n");
        let outcome = connect(&mut server, &peer(1), "\\name\\x\\*hltv\\3");
        assert_eq!(rejected(&outcome), "Please connect to HLTV master proxy.\n");
        let outcome = connect(&mut server, &peer(1), "\\name\\x\\*hltv\\7");
        assert_eq!(rejected(&outcome), "Unknown HLTV client type.\n");
    }

    #[test]
    fn proxy_slots_are_limited() {
        let mut server = test_server(ServerConfig::for_testing());
        let outcome = connect(&mut server, &peer(1), "\\name\\tv\\*hltv\\1");
        assert!(outcome.is_admitted());
        assert!(server.clients().get(0).unwrap().proxy);

        let outcome = connect(&mut server, &NetAddress::ip([203, 0, 113, 4], 1), "\\name\\tv2\\*hltv\\1");
        assert_eq!(rejected(&outcome), "Proxy slots are full.\n");
    }

    #[test]
    fn duplicate_names_are_prefixed() {
        let mut server = test_server(ServerConfig::for_testing());
        seat(&mut server, 0, NetAddress::ip([203, 0, 113, 4], 1), "Gordon");

        let outcome = connect(&mut server, &peer(1), "\\name\\gordon\\rate\\1");
        assert!(outcome.is_admitted());
        assert_eq!(server.clients().get(1).unwrap().name, "(1)gordon");
    }

    #[test]
    fn full_server_rejects() {
        let mut server = test_server(ServerConfig::for_testing());
        for slot in 0..4 {
            seat(&mut server, slot, NetAddress::ip([203, 0, 113, slot as u8], 1), &format!("p{slot}"));
        }
        let outcome = connect(&mut server, &peer(1), "\\name\\late\\rate\\1");
        assert_eq!(rejected(&outcome), "Server is full.\n");
    }

    #[test]
    fn half_open_connections_are_capped() {
        let mut server = test_server(ServerConfig::for_testing());
        for port in 1..=3 {
            assert!(connect(&mut server, &peer(port), &format!("\\name\\p{port}")).is_admitted());
        }
        let outcome = connect(&mut server, &peer(4), "\\name\\p4\\rate\\1");
        assert_eq!(rejected(&outcome), "Too many connect packets from your address.\n");
    }

    #[test]
    fn game_can_refuse() {
        let mut server = test_server(ServerConfig::for_testing());
        server.game_mut().refuse = Some("Go away\n".to_string());
        let outcome = connect(&mut server, &peer(1), "\\name\\x\\rate\\1");
        assert_eq!(rejected(&outcome), "Go away\n");
        assert_eq!(server.transport().sent()[0].data, reject_packet("Go away\n"));
        assert!(server.auth().connected.is_empty());
    }

    #[test]
    fn failed_validation_depends_on_lan() {
        let mut server = test_server(ServerConfig::for_testing());
        server.auth.steam_id = None;
        let outcome = connect(&mut server, &peer(1), "\\name\\x\\rate\\1");
        assert_eq!(rejected(&outcome), "STEAM validation rejected\n");
        assert!(server.game().connected.is_empty());
        assert!(server.auth().connected.is_empty());

        let mut config = ServerConfig::for_testing();
        config.lan = true;
        let mut server = test_server(config);
        server.auth.steam_id = None;
        let local = NetAddress::ip([192, 168, 1, 20], 27005);
        assert!(connect(&mut server, &local, "\\name\\x\\rate\\1").is_admitted());
        let client = server.clients().get(0).unwrap();
        assert_eq!(client.network_id.steam_id, 0);
        assert_eq!(client.network_id.client_ip, u32::from_le_bytes([192, 168, 1, 20]));

        let outcome = connect(&mut server, &peer(1), "\\name\\y\\rate\\1");
        assert_eq!(
            rejected(&outcome),
            "LAN servers are restricted to local clients (class C).\n"
        );
    }

    #[test]
    fn reconnect_reuses_slot() {
        let mut server = test_server(ServerConfig::for_testing());
        let from = peer(27005);
        assert!(connect(&mut server, &from, "\\name\\Gordon\\rate\\1").is_admitted());

        let outcome = connect(&mut server, &from, "\\name\\Gordon\\rate\\1");
        assert_eq!(
            outcome,
            AdmissionOutcome::Admitted {
                slot: 0,
                user_id: 2,
                reconnect: true,
                duplicate_of: None,
            }
        );
        assert_eq!(server.clients().get(0).unwrap().name, "Gordon");
        assert_eq!(server.auth().disconnected, vec![0]);
        assert!(server.game().disconnected.is_empty());
    }

    #[test]
    fn duplicate_steam_ids_are_found() {
        let mut server = test_server(ServerConfig::for_testing());
        seat(&mut server, 0, peer(1), "a");
        seat(&mut server, 2, peer(2), "b");
        assert_eq!(server.find_duplicate_steam_id(0), None);

        let id = server.clients().get(0).unwrap().network_id;
        server.clients_mut().get_mut(2).unwrap().network_id = id;
        assert_eq!(server.find_duplicate_steam_id(0), Some(2));
    }

    #[test]
    fn second_client_with_same_steam_id_is_reported() {
        let mut server = test_server(ServerConfig::for_testing());
        let first = connect(&mut server, &peer(27005), "\\name\\a\\rate\\1");
        assert!(matches!(
            first,
            AdmissionOutcome::Admitted { slot: 0, duplicate_of: None, .. }
        ));

        let second = connect(&mut server, &peer(27006), "\\name\\b\\rate\\1");
        assert!(matches!(
            second,
            AdmissionOutcome::Admitted { slot: 1, duplicate_of: Some(0), .. }
        ));
        assert_eq!(server.clients().free_count(), 2);
    }

    #[test]
    fn duplicate_steam_ids_are_not_reported_on_lan() {
        let mut config = ServerConfig::for_testing();
        config.lan = true;
        let mut server = test_server(config);
        let a = NetAddress::ip([192, 168, 1, 20], 27005);
        let b = NetAddress::ip([192, 168, 1, 21], 27005);
        assert!(connect(&mut server, &a, "\\name\\a\\rate\\1").is_admitted());
        let outcome = connect(&mut server, &b, "\\name\\b\\rate\\1");
        assert!(matches!(
            outcome,
            AdmissionOutcome::Admitted { duplicate_of: None, .. }
        ));
    }
}
