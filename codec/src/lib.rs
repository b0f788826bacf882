//! Packet entity delta compression for the svproto server core.
//!
//! This crate ties together bitstream and wire to turn per-client entity
//! frames into `svc_packetentities` / `svc_deltapacketentities` messages,
//! and keeps the per-client state that compression depends on.
//!
//! # Features
//!
//! - Merge walk between the acknowledged frame and the current frame
//! - Baseline selection: instance, nearby-entity and static baselines
//! - Legacy-compatible record headers, with a symmetric reader
//! - Per-client frame history keyed by outgoing sequence
//! - Ping table and ping averaging
//!
//! # Design Principles
//!
//! - **Encoder as a seam** - Field encoding lives behind [`EntityDeltaEncoder`].
//! - **Bounded packets** - Entity counts are capped by [`CodecLimits`].
//! - **Deterministic** - Same frames and baselines produce the same bits.

mod baseline;
mod encoder;
mod entity;
mod error;
mod header;
mod history;
mod limits;
mod packet_entities;
mod pings;
mod types;

pub use baseline::{Baselines, InstanceBaseline, InstanceBaselines, StaticBaselines};
pub use encoder::{DeltaDescriptor, EntityDeltaEncoder, FieldListEncoder, HeaderFn};
pub use entity::{collect_visible, EntityState, PacketEntities};
pub use error::{CodecError, CodecResult, LimitKind};
pub use header::{
    read_delta_header, write_delta_header, DeltaHeader, HeaderContext, MAX_BASELINE_OFFSET,
};
pub use history::{ClientFrame, FrameHistory};
pub use limits::CodecLimits;
pub use packet_entities::{
    DeltaSource, PacketEntitiesHeader, PacketEntitiesReader, SnapshotDeltaBuilder,
};
pub use pings::{calc_ping, read_pings, write_pings, PingRow};
pub use types::{ClassId, EntityId, EntityType, FrameSequence};
pub use wire::Limits as WireLimits;
