//! Out-of-band (connectionless) packet framing.
//!
//! Every connectionless datagram starts with four `0xFF` bytes, followed by a
//! single text command line. Anything after the line (for example a Steam
//! ticket on `connect`) is left as the payload.

use crate::limits::Limits;
use crate::message::MessageReader;
use crate::protocol::oob;

/// Prefix that marks a datagram as connectionless.
pub const OOB_PREFIX: [u8; 4] = [0xFF; 4];

/// Returns `true` if the datagram carries the connectionless prefix.
#[must_use]
pub fn is_connectionless(data: &[u8]) -> bool {
    data.starts_with(&OOB_PREFIX)
}

/// A tokenized command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandLine {
    line: String,
    argv: Vec<String>,
    args_offset: Option<usize>,
}

impl CommandLine {
    /// Tokenizes `line`.
    ///
    /// Tokens are separated by whitespace; double quotes group a token;
    /// `{ } ( ) ' ,` are single-character tokens and `//` starts a comment.
    /// Tokenizing stops at the first newline.
    #[must_use]
    pub fn parse(line: &str, limits: &Limits) -> Self {
        let bytes = line.as_bytes();
        let mut argv = Vec::new();
        let mut args_offset = None;
        let mut pos = 0;
        let mut in_quotes = false;

        loop {
            if !in_quotes {
                while pos < bytes.len() && bytes[pos] <= b' ' && bytes[pos] != b'\n' {
                    pos += 1;
                }
                if pos >= bytes.len() || bytes[pos] == b'\n' {
                    break;
                }
                if argv.len() == 1 && args_offset.is_none() {
                    args_offset = Some(pos);
                }
            }

            let Some((token, next, continues)) = next_token(bytes, pos, in_quotes, limits) else {
                break;
            };
            if argv.len() < limits.max_args {
                argv.push(token);
            }
            pos = next;
            in_quotes = continues;
        }

        Self {
            line: line.to_string(),
            argv,
            args_offset,
        }
    }

    /// Returns the number of tokens.
    #[must_use]
    pub fn argc(&self) -> usize {
        self.argv.len()
    }

    /// Returns token `i`, or `""` past the end.
    #[must_use]
    pub fn argv(&self, i: usize) -> &str {
        self.argv.get(i).map_or("", String::as_str)
    }

    /// Returns the raw text following the first token.
    #[must_use]
    pub fn args(&self) -> &str {
        self.args_offset
            .and_then(|offset| self.line.get(offset..))
            .unwrap_or("")
    }

    /// Returns the raw line.
    #[must_use]
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Returns the raw text after the first `n` tokens, trimmed.
    ///
    /// `None` if the line holds `n` tokens or fewer.
    #[must_use]
    pub fn rest_after(&self, n: usize) -> Option<&str> {
        let bytes = self.line.as_bytes();
        let mut pos = 0;
        for _ in 0..n {
            while pos < bytes.len() && bytes[pos] <= b' ' {
                pos += 1;
            }
            let (_, next, _) = next_token(bytes, pos, false, &Limits::unlimited())?;
            pos = next;
        }
        let rest = self.line.get(pos..)?.trim();
        (!rest.is_empty()).then_some(rest)
    }
}

fn is_break_char(c: u8) -> bool {
    matches!(c, b'{' | b'}' | b'(' | b')' | b'\'' | b',')
}

/// Reads one token starting at `pos` (whitespace already skipped).
///
/// Returns the token, the next position, and whether a quoted token was cut
/// at the length limit and continues.
fn next_token(
    bytes: &[u8],
    mut pos: usize,
    in_quotes: bool,
    limits: &Limits,
) -> Option<(String, usize, bool)> {
    let max = limits.max_token_len.saturating_sub(1).max(1);

    if !in_quotes && bytes.get(pos) == Some(&b'/') && bytes.get(pos + 1) == Some(&b'/') {
        return None;
    }

    let mut token = Vec::new();
    if in_quotes || bytes.get(pos) == Some(&b'"') {
        if !in_quotes {
            pos += 1;
        }
        while let Some(&c) = bytes.get(pos) {
            pos += 1;
            if c == b'"' {
                return Some((lossy(&token), pos, false));
            }
            token.push(c);
            if token.len() == max {
                return Some((lossy(&token), pos, true));
            }
        }
        return Some((lossy(&token), pos, false));
    }

    let first = *bytes.get(pos)?;
    if is_break_char(first) {
        return Some(((first as char).to_string(), pos + 1, false));
    }

    while let Some(&c) = bytes.get(pos) {
        if c <= b' ' || (is_break_char(c) && !token.is_empty()) || token.len() == max {
            break;
        }
        token.push(c);
        pos += 1;
    }
    Some((lossy(&token), pos, false))
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// A decoded connectionless datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionlessPacket<'a> {
    /// The tokenized command line.
    pub command: CommandLine,
    /// Bytes following the command line.
    pub payload: &'a [u8],
}

impl<'a> ConnectionlessPacket<'a> {
    /// Parses a datagram; `None` if it lacks the connectionless prefix.
    #[must_use]
    pub fn parse(data: &'a [u8], limits: &Limits) -> Option<Self> {
        if !is_connectionless(data) {
            return None;
        }
        let mut reader = MessageReader::with_limits(data, *limits);
        reader.read_long();
        let line = reader.read_string_line();
        Some(Self {
            command: CommandLine::parse(&line, limits),
            payload: reader.remaining(),
        })
    }

    /// Classifies the command.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        CommandKind::classify(&self.command)
    }
}

/// Connectionless commands understood by the server core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `ping` or `i`.
    Ping,
    /// `j`, a ping acknowledgment.
    Ack,
    /// Master or query bytes handled elsewhere.
    Ignored(u8),
    /// `log <text>`, relayed from another server.
    Log,
    /// `getchallenge [steam]`.
    GetChallenge,
    /// `challenge rcon`.
    ServiceChallenge,
    /// `connect <protocol> <challenge> <protinfo> <userinfo>`.
    Connect,
    /// `pstat`.
    PlayerStatus,
    /// `rcon <challenge> <password> <command>`.
    Rcon,
    /// Anything else, passed to the game logic.
    Query,
}

impl CommandKind {
    /// Classifies a tokenized command line.
    #[must_use]
    pub fn classify(command: &CommandLine) -> Self {
        let c = command.argv(0);
        let bytes = c.as_bytes();
        let single = |b: u8| bytes.first() == Some(&b) && matches!(bytes.get(1), None | Some(b'\n'));

        if c == "ping" || single(oob::A2A_PING) {
            Self::Ping
        } else if single(oob::A2A_ACK) {
            Self::Ack
        } else if let Some(&b) = bytes.first().filter(|b| oob::IGNORED.contains(*b)) {
            Self::Ignored(b)
        } else if c.eq_ignore_ascii_case("log") {
            Self::Log
        } else if c == "getchallenge" {
            Self::GetChallenge
        } else if c.eq_ignore_ascii_case("challenge") {
            Self::ServiceChallenge
        } else if c == "connect" {
            Self::Connect
        } else if c == "pstat" {
            Self::PlayerStatus
        } else if c == "rcon" {
            Self::Rcon
        } else {
            Self::Query
        }
    }
}

/// Authentication advertised in a challenge response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeAuth {
    /// Hashed-key authentication (type 2).
    Hashed,
    /// Steam authentication (type 3) with the server's Steam id.
    Steam { server_steam_id: u64, secure: bool },
}

fn oob_packet(kind: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(OOB_PREFIX.len() + 2 + body.len());
    out.extend_from_slice(&OOB_PREFIX);
    out.push(kind);
    out.extend_from_slice(body);
    out.push(0);
    out
}

fn oob_text(text: &str) -> Vec<u8> {
    let mut out = OOB_PREFIX.to_vec();
    out.extend_from_slice(text.as_bytes());
    out.push(0);
    out
}

/// `-1, '9', text`: connection rejected with a reason.
#[must_use]
pub fn reject_packet(reason: &str) -> Vec<u8> {
    oob_packet(oob::S2C_REJECT, reason.as_bytes())
}

/// `-1, '8', "BADPASSWORD"`.
#[must_use]
pub fn bad_password_packet() -> Vec<u8> {
    oob_packet(oob::S2C_BADPASSWORD, b"BADPASSWORD")
}

/// `-1, 'l', text`: a console print.
#[must_use]
pub fn print_packet(text: &str) -> Vec<u8> {
    oob_packet(oob::A2A_PRINT, text.as_bytes())
}

/// Reply sent to filtered sources.
#[must_use]
pub fn banned_packet() -> Vec<u8> {
    print_packet("You have been banned from this server.\n")
}

/// Redirected console output (rcon replies), with its extra trailing byte.
#[must_use]
pub fn redirect_packet(text: &str) -> Vec<u8> {
    let mut out = print_packet(text);
    out.push(0);
    out
}

/// `-1, 'j'` including the terminator.
#[must_use]
pub fn ping_reply() -> Vec<u8> {
    oob_packet(oob::A2A_ACK, b"")
}

/// Challenge response for `getchallenge`.
#[must_use]
pub fn challenge_response(challenge: u32, auth: ChallengeAuth) -> Vec<u8> {
    let body = match auth {
        ChallengeAuth::Hashed => format!("00000000 {challenge} 2\n"),
        ChallengeAuth::Steam {
            server_steam_id,
            secure,
        } => format!(
            "00000000 {challenge} 3 {server_steam_id} {}\n",
            i32::from(secure)
        ),
    };
    oob_packet(oob::S2C_CHALLENGE, body.as_bytes())
}

/// Challenge response for `challenge rcon`.
#[must_use]
pub fn rcon_challenge_response(challenge: u32) -> Vec<u8> {
    oob_text(&format!("challenge rcon {challenge}\n"))
}

/// Connection accepted: `B <userid> "<address>" <secure> <build>`.
#[must_use]
pub fn accept_packet(user_id: i32, address: &str, secure: bool, build: i32) -> Vec<u8> {
    let body = format!(" {user_id} \"{address}\" {} {build}", i32::from(secure));
    oob_packet(oob::S2C_CONNECTION, body.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> CommandLine {
        CommandLine::parse(line, &Limits::default())
    }

    #[test]
    fn tokenize_with_quotes() {
        let cmd = parse("connect 48 1234 \"\\prot\\3\" \"\\name\\a b\"");
        assert_eq!(cmd.argc(), 5);
        assert_eq!(cmd.argv(0), "connect");
        assert_eq!(cmd.argv(3), "\\prot\\3");
        assert_eq!(cmd.argv(4), "\\name\\a b");
        assert_eq!(cmd.argv(9), "");
    }

    #[test]
    fn tokenize_break_chars_and_comments() {
        let cmd = parse("say (hi),there // ignored");
        assert_eq!(cmd.argc(), 6);
        assert_eq!(cmd.argv(1), "(");
        assert_eq!(cmd.argv(2), "hi");
        assert_eq!(cmd.argv(3), ")");
        assert_eq!(cmd.argv(4), ",");
        assert_eq!(cmd.argv(5), "there");
    }

    #[test]
    fn tokenize_keeps_colons() {
        let cmd = parse("banid 0 STEAM_0:1:1234");
        assert_eq!(cmd.argv(2), "STEAM_0:1:1234");
    }

    #[test]
    fn tokenize_stops_at_newline() {
        let cmd = parse("ping\nconnect");
        assert_eq!(cmd.argc(), 1);
    }

    #[test]
    fn tokenize_caps_argument_count() {
        let cmd = CommandLine::parse("a b c d e f g h i j", &Limits::for_testing());
        assert_eq!(cmd.argc(), 8);
    }

    #[test]
    fn long_quoted_token_splits() {
        let limits = Limits::for_testing();
        let long = "y".repeat(40);
        let cmd = CommandLine::parse(&format!("x \"{long}\""), &limits);
        assert_eq!(cmd.argc(), 3);
        assert_eq!(cmd.argv(1).len(), 31);
        assert_eq!(cmd.argv(2).len(), 9);
    }

    #[test]
    fn args_is_text_after_first_token() {
        let cmd = parse("log   L 01/01 message");
        assert_eq!(cmd.args(), "L 01/01 message");
        assert_eq!(parse("ping").args(), "");
    }

    #[test]
    fn rest_after_skips_tokens() {
        let cmd = parse("rcon 123 \"secret pw\" kick #2");
        assert_eq!(cmd.rest_after(3), Some("kick #2"));
        assert_eq!(parse("rcon 123 pw").rest_after(3), None);
    }

    #[test]
    fn classify_commands() {
        let cases = [
            ("ping", CommandKind::Ping),
            ("i", CommandKind::Ping),
            ("j", CommandKind::Ack),
            ("TSource Engine Query", CommandKind::Ignored(b'T')),
            ("LOG hello", CommandKind::Log),
            ("getchallenge steam", CommandKind::GetChallenge),
            ("Challenge rcon", CommandKind::ServiceChallenge),
            ("connect 48", CommandKind::Connect),
            ("pstat", CommandKind::PlayerStatus),
            ("rcon 1 2 3", CommandKind::Rcon),
            ("details", CommandKind::Query),
            ("ij", CommandKind::Query),
        ];
        for (line, kind) in cases {
            assert_eq!(CommandKind::classify(&parse(line)), kind, "{line}");
        }
    }

    #[test]
    fn parse_packet_splits_payload() {
        let mut data = OOB_PREFIX.to_vec();
        data.extend_from_slice(b"connect 48 1 \"\\prot\\3\" \"\\name\\x\"\n");
        data.extend_from_slice(&[1, 2, 3]);
        let packet = ConnectionlessPacket::parse(&data, &Limits::default()).unwrap();
        assert_eq!(packet.kind(), CommandKind::Connect);
        assert_eq!(packet.payload, &[1, 2, 3]);
    }

    #[test]
    fn parse_requires_prefix() {
        assert!(ConnectionlessPacket::parse(b"\xFF\xFF\xFFping", &Limits::default()).is_none());
        assert!(!is_connectionless(&[0xFF, 0xFF]));
    }

    #[test]
    fn reply_layouts() {
        assert_eq!(ping_reply(), b"\xFF\xFF\xFF\xFFj\0");
        assert_eq!(reject_packet("Server is full.\n"), b"\xFF\xFF\xFF\xFF9Server is full.\n\0");
        assert_eq!(bad_password_packet(), b"\xFF\xFF\xFF\xFF8BADPASSWORD\0");
        assert_eq!(
            banned_packet(),
            b"\xFF\xFF\xFF\xFFlYou have been banned from this server.\n\0"
        );
        assert_eq!(redirect_packet("ok"), b"\xFF\xFF\xFF\xFFlok\0\0");
    }

    #[test]
    fn challenge_layouts() {
        assert_eq!(
            challenge_response(77, ChallengeAuth::Hashed),
            b"\xFF\xFF\xFF\xFFA00000000 77 2\n\0"
        );
        assert_eq!(
            challenge_response(
                5,
                ChallengeAuth::Steam {
                    server_steam_id: 90_071_992,
                    secure: true
                }
            ),
            b"\xFF\xFF\xFF\xFFA00000000 5 3 90071992 1\n\0"
        );
        assert_eq!(
            rcon_challenge_response(42),
            b"\xFF\xFF\xFF\xFFchallenge rcon 42\n\0"
        );
    }

    #[test]
    fn accept_layout() {
        assert_eq!(
            accept_packet(3, "10.0.0.2:27005", false, 8684),
            b"\xFF\xFF\xFF\xFFB 3 \"10.0.0.2:27005\" 0 8684\0"
        );
    }
}
