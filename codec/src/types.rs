//! Core types for the codec.

/// An outgoing frame sequence number.
///
/// Sequences come from the reliable channel and only ever grow; the frame
/// history slot of a sequence is `sequence & (capacity - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameSequence(u32);

impl FrameSequence {
    /// Creates a new frame sequence.
    #[must_use]
    pub const fn new(sequence: u32) -> Self {
        Self(sequence)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the sequence as written in a delta packet header.
    #[must_use]
    pub const fn wire_byte(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl From<u32> for FrameSequence {
    fn from(sequence: u32) -> Self {
        Self(sequence)
    }
}

impl From<FrameSequence> for u32 {
    fn from(sequence: FrameSequence) -> Self {
        sequence.0
    }
}

/// An entity number (edict index).
///
/// Number 0 is the world; `1..=max_clients` are players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity number.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw entity number.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if the entity is a player slot for `max_clients`.
    #[must_use]
    pub const fn is_player(self, max_clients: u32) -> bool {
        self.0 >= 1 && self.0 <= max_clients
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<EntityId> for u32 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Interned entity class name, used to match instance baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClassId(u32);

impl ClassId {
    /// Creates a new class id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw class id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for ClassId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Entity type flags carried in every entity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntityType(u32);

impl EntityType {
    /// Regular entity.
    pub const NORMAL: Self = Self(1);
    /// Beam (custom) entity, encoded with the custom descriptor.
    pub const BEAM: Self = Self(2);

    const CUSTOM_BIT: u32 = 0x2;

    /// Creates entity type flags from raw bits.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if the entity uses the custom delta descriptor.
    #[must_use]
    pub const fn is_custom(self) -> bool {
        self.0 & Self::CUSTOM_BIT != 0
    }
}
