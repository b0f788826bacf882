//! Inspection and maintenance tools for svproto servers.
//!
//! - Classify captured datagrams and summarize the messages inside them
//! - Audit ban list files before a server loads them
//!
//! # Design Principles
//!
//! - **Same code paths** - Reports are built with the parsers the server runs.
//! - **Human-readable output** - Every report serializes to JSON and prints as text.

use std::fmt::Write as _;

use codec::{read_pings, Baselines, CodecLimits, FieldListEncoder, PacketEntitiesHeader, PacketEntitiesReader};
use serde::Serialize;
use server::{BanRegistry, MAX_CLIENTS, MAX_EDICTS};
use wire::{ConnectionlessPacket, Limits, MessageReader, SvcOp};

/// What a captured datagram contains.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InspectReport {
    Connectionless {
        command: String,
        args: Vec<String>,
        class: String,
        payload_len: usize,
    },
    Messages {
        messages: Vec<MessageSummary>,
        /// Bytes left after the last message that could be walked.
        trailing_bytes: usize,
    },
}

/// One server-to-client message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MessageSummary {
    Time {
        time: f32,
    },
    Print {
        text: String,
    },
    PacketEntities {
        count: usize,
        delta_from: Option<u8>,
        /// Entity numbers, when the body could be decoded.
        entities: Option<Vec<u32>>,
    },
    Pings {
        rows: Vec<PingSummary>,
    },
    Unknown {
        opcode: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PingSummary {
    pub slot: u32,
    pub ping: u32,
    pub loss: u32,
}

/// Builds a report for one datagram.
///
/// In-band datagrams are walked message by message. Walking stops at an
/// unknown opcode or at a delta packet entities message, whose body needs
/// the frame it was compressed against.
#[must_use]
pub fn inspect_datagram(bytes: &[u8], limits: &Limits, codec_limits: &CodecLimits) -> InspectReport {
    if let Some(packet) = ConnectionlessPacket::parse(bytes, limits) {
        let command = &packet.command;
        return InspectReport::Connectionless {
            command: command.argv(0).to_string(),
            args: (1..command.argc()).map(|i| command.argv(i).to_string()).collect(),
            class: format!("{:?}", packet.kind()),
            payload_len: packet.payload.len(),
        };
    }

    let baselines = Baselines::new(MAX_EDICTS, codec_limits);
    let reader = PacketEntitiesReader::new(&baselines, codec_limits).with_max_clients(MAX_CLIENTS as u32);
    let encoder = FieldListEncoder::default();
    let mut msg = MessageReader::with_limits(bytes, *limits);
    let mut messages = Vec::new();

    while !msg.remaining().is_empty() {
        let opcode = msg.remaining()[0];
        let Ok(op) = SvcOp::parse(opcode) else {
            messages.push(MessageSummary::Unknown { opcode });
            break;
        };
        match op {
            SvcOp::Time => {
                msg.read_byte();
                messages.push(MessageSummary::Time {
                    time: msg.read_float(),
                });
            }
            SvcOp::Print => {
                msg.read_byte();
                messages.push(MessageSummary::Print {
                    text: msg.read_string(),
                });
            }
            SvcOp::Pings => {
                msg.read_byte();
                let rows = read_pings(&mut msg)
                    .into_iter()
                    .map(|row| PingSummary {
                        slot: row.slot,
                        ping: row.ping,
                        loss: row.loss,
                    })
                    .collect();
                messages.push(MessageSummary::Pings { rows });
            }
            SvcOp::PacketEntities | SvcOp::DeltaPacketEntities => {
                let Ok(header) = PacketEntitiesHeader::read(&mut msg) else {
                    break;
                };
                let entities = if header.delta_sequence.is_none() {
                    reader
                        .read_body(&encoder, &mut msg, &header, None)
                        .ok()
                        .map(|frame| frame.iter().map(|e| e.number.raw()).collect())
                } else {
                    None
                };
                let walked = entities.is_some();
                messages.push(MessageSummary::PacketEntities {
                    count: header.count,
                    delta_from: header.delta_sequence,
                    entities,
                });
                if !walked {
                    break;
                }
            }
            other => {
                messages.push(MessageSummary::Unknown {
                    opcode: other.raw(),
                });
                break;
            }
        }
        if msg.is_bad_read() {
            break;
        }
    }

    InspectReport::Messages {
        messages,
        trailing_bytes: msg.remaining().len(),
    }
}

/// Renders a report as indented text.
#[must_use]
pub fn format_report_pretty(report: &InspectReport) -> String {
    let mut out = String::new();
    match report {
        InspectReport::Connectionless {
            command,
            args,
            class,
            payload_len,
        } => {
            let _ = writeln!(out, "connectionless {class}: {command}");
            for (i, arg) in args.iter().enumerate() {
                let _ = writeln!(out, "  argv[{}]: {arg}", i + 1);
            }
            let _ = writeln!(out, "  payload: {payload_len} bytes");
        }
        InspectReport::Messages {
            messages,
            trailing_bytes,
        } => {
            for message in messages {
                let line = match message {
                    MessageSummary::Time { time } => format!("svc_time {time:.3}"),
                    MessageSummary::Print { text } => format!("svc_print {:?}", text),
                    MessageSummary::PacketEntities {
                        count,
                        delta_from,
                        entities,
                    } => {
                        let from = delta_from.map_or_else(|| "full".to_string(), |seq| format!("delta from {seq}"));
                        let numbers = entities.as_ref().map_or_else(
                            || "body not decoded".to_string(),
                            |list| format!("{list:?}"),
                        );
                        format!("svc_packetentities {count} ({from}): {numbers}")
                    }
                    MessageSummary::Pings { rows } => {
                        let cells: Vec<String> = rows
                            .iter()
                            .map(|r| format!("#{} {}ms {}%", r.slot, r.ping, r.loss))
                            .collect();
                        format!("svc_pings {}", cells.join(", "))
                    }
                    MessageSummary::Unknown { opcode } => format!("unknown opcode {opcode}"),
                };
                let _ = writeln!(out, "{line}");
            }
            if *trailing_bytes > 0 {
                let _ = writeln!(out, "({trailing_bytes} bytes not walked)");
            }
        }
    }
    out
}

/// Result of loading a ban list file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BanAudit {
    /// Lines that were applied.
    pub applied: usize,
    /// Non-empty, non-comment lines that were not.
    pub skipped: usize,
    pub addresses: Vec<String>,
    pub user_ids: Vec<String>,
}

/// Loads `text` into a scratch ban registry and reports what took effect.
#[must_use]
pub fn audit_ban_list(text: &str, max_filters: usize) -> BanAudit {
    let mut bans = BanRegistry::new(max_filters, true, false);
    let applied = bans.load(text, 0.0);
    let commands = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .count();
    BanAudit {
        applied,
        skipped: commands.saturating_sub(applied),
        addresses: bans.list_ip(),
        user_ids: bans.list_id(),
    }
}
