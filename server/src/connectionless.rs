//! Dispatch of out-of-band commands.

use tracing::{debug, info, warn};
use wire::{
    challenge_response, ping_reply, rcon_challenge_response, redirect_packet, reject_packet,
    ChallengeAuth, CommandKind, CommandLine, ConnectionlessPacket,
};

use crate::address::NetAddress;
use crate::challenge::ChallengeCheck;
use crate::collab::{AuthBackend, GameLogic, Transport};
use crate::rcon::RconVerdict;
use crate::server::Server;

const BAD_RCON_PASSWORD: &str = "Bad rcon_password.\n";
const NO_RCON_PASSWORD: &str = "Bad rcon_password.\nNo password set for this server.\n";

impl<T, A, G> Server<T, A, G>
where
    T: Transport,
    A: AuthBackend,
    G: GameLogic,
{
    pub(crate) fn handle_connectionless(&mut self, data: &[u8], from: &NetAddress) {
        let Some(packet) = ConnectionlessPacket::parse(data, &self.wire_limits) else {
            return;
        };
        let command = &packet.command;

        match packet.kind() {
            CommandKind::Ping => self.send(&ping_reply(), from),
            CommandKind::Ack => debug!(address = %from, "ping ack"),
            CommandKind::Ignored(byte) => {
                debug!(address = %from, byte, "ignored connectionless packet");
            }
            CommandKind::Log => {
                if self.config.log_relay {
                    info!(address = %from, "{}", command.args().trim_end());
                }
            }
            CommandKind::GetChallenge => self.get_challenge(command, from),
            CommandKind::ServiceChallenge => {
                if command.argc() == 2 && command.argv(1).eq_ignore_ascii_case("rcon") {
                    let value = self.challenges.issue(from, self.realtime);
                    self.send(&rcon_challenge_response(value), from);
                }
            }
            CommandKind::Connect => {
                self.connect(command, packet.payload, from);
            }
            CommandKind::PlayerStatus => {
                if let Some(reply) = self.game.player_status(from) {
                    self.send(&reply, from);
                }
            }
            CommandKind::Rcon => self.handle_rcon(command, from),
            CommandKind::Query => {
                if let Some(reply) = self.game.query(from, command, packet.payload) {
                    self.send(&reply, from);
                }
            }
        }
    }

    fn get_challenge(&mut self, command: &CommandLine, from: &NetAddress) {
        let value = self.challenges.issue(from, self.realtime);
        let auth = if command.argc() == 2 && command.argv(1).eq_ignore_ascii_case("steam") {
            ChallengeAuth::Steam {
                server_steam_id: self.auth.server_steam_id(),
                secure: self.config.secure,
            }
        } else {
            ChallengeAuth::Hashed
        };
        self.send(&challenge_response(value, auth), from);
    }

    fn handle_rcon(&mut self, command: &CommandLine, from: &NetAddress) {
        let verdict = self
            .rcon
            .validate(command, from, &self.challenges, self.realtime);

        let reply = match verdict {
            RconVerdict::Valid => {
                info!(address = %from, command = command.args(), "Rcon");
                match command.rest_after(3) {
                    Some(text) => self.game.execute_rcon(text),
                    None => "Empty rcon\n".to_string(),
                }
            }
            RconVerdict::Ban => {
                warn!(address = %from, "Banning {from} for rcon hacking attempts");
                let minutes = self.rcon.ban_penalty();
                if let Err(err) = self.add_ip(minutes, &from.base_string()) {
                    warn!(address = %from, error = %err, "Couldn't ban rcon address");
                }
                BAD_RCON_PASSWORD.to_string()
            }
            RconVerdict::BadChallenge(check) => {
                warn!(address = %from, "Bad Rcon");
                let reason = match check {
                    ChallengeCheck::Missing => "No challenge for your address.\n",
                    _ => "Bad challenge.\n",
                };
                self.send(&reject_packet(reason), from);
                BAD_RCON_PASSWORD.to_string()
            }
            RconVerdict::Invalid => {
                warn!(address = %from, "Bad Rcon");
                if self.rcon.has_password() {
                    BAD_RCON_PASSWORD.to_string()
                } else {
                    NO_RCON_PASSWORD.to_string()
                }
            }
        };
        self.send(&redirect_packet(&reply), from);
    }
}
