//! The entity field encoder seam.

use bitstream::{BitReader, BitResult, BitWriter};

use crate::entity::EntityState;
use crate::types::EntityType;

/// Which field table encodes an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaDescriptor {
    /// Regular entities.
    Entity,
    /// Player slots `1..=max_clients`.
    Player,
    /// Beams and other custom entities.
    Custom,
}

impl DeltaDescriptor {
    /// Picks the descriptor for entity `number`.
    #[must_use]
    pub const fn select(number: u32, custom: bool, max_clients: u32) -> Self {
        if custom {
            Self::Custom
        } else if number >= 1 && number <= max_clients {
            Self::Player
        } else {
            Self::Entity
        }
    }
}

/// Callback that writes the record header in front of an entity body.
pub type HeaderFn<'h> = dyn FnMut(&mut BitWriter<'_>) -> BitResult<()> + 'h;

/// Field-level delta encoding of entity states.
///
/// The encoder owns every field of [`EntityState`] except `number` and
/// `class`.
pub trait EntityDeltaEncoder {
    /// Writes the fields of `to` that differ from `from`.
    ///
    /// `header` must be invoked exactly once, before the first body bit,
    /// whenever anything is written. Unless `force` is set, an unchanged
    /// entity writes nothing at all, header included.
    fn write_delta(
        &mut self,
        from: &EntityState,
        to: &EntityState,
        force: bool,
        descriptor: DeltaDescriptor,
        writer: &mut BitWriter<'_>,
        header: &mut HeaderFn<'_>,
    ) -> BitResult<()>;

    /// Applies a body written by [`write_delta`](Self::write_delta) on top of
    /// `from`.
    fn read_delta(
        &self,
        from: &EntityState,
        descriptor: DeltaDescriptor,
        reader: &mut BitReader<'_>,
    ) -> BitResult<EntityState>;

    /// Returns the number of body bits encoding `to` against `from` would take.
    fn test_delta(&self, from: &EntityState, to: &EntityState, descriptor: DeltaDescriptor)
        -> u32;
}

/// A plain encoder for states whose fields are small signed integers.
///
/// Body: `[type_changed:1][type:2]? [count:6] ([changed:1][value:field_bits]?)*`.
/// The same layout serves every descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldListEncoder {
    field_bits: u32,
}

const TYPE_BITS: u32 = 2;
const COUNT_BITS: u32 = 6;

impl Default for FieldListEncoder {
    fn default() -> Self {
        Self { field_bits: 16 }
    }
}

impl FieldListEncoder {
    /// Creates an encoder writing each changed field as `field_bits` signed bits.
    #[must_use]
    pub const fn new(field_bits: u32) -> Self {
        Self { field_bits }
    }

    fn changed<'a>(
        from: &'a EntityState,
        to: &'a EntityState,
    ) -> impl Iterator<Item = bool> + 'a {
        to.fields
            .iter()
            .enumerate()
            .map(move |(i, v)| from.fields.get(i) != Some(v))
    }
}

impl EntityDeltaEncoder for FieldListEncoder {
    fn write_delta(
        &mut self,
        from: &EntityState,
        to: &EntityState,
        force: bool,
        _descriptor: DeltaDescriptor,
        writer: &mut BitWriter<'_>,
        header: &mut HeaderFn<'_>,
    ) -> BitResult<()> {
        let type_changed = from.entity_type != to.entity_type;
        let unchanged = !type_changed
            && from.fields.len() == to.fields.len()
            && !Self::changed(from, to).any(|c| c);
        if unchanged && !force {
            return Ok(());
        }

        header(writer)?;
        writer.write_one_bit(type_changed)?;
        if type_changed {
            writer.write_bits(to.entity_type.raw(), TYPE_BITS)?;
        }
        writer.write_bits(to.fields.len() as u32, COUNT_BITS)?;
        for (changed, value) in Self::changed(from, to).zip(&to.fields) {
            writer.write_one_bit(changed)?;
            if changed {
                writer.write_signed_bits(*value, self.field_bits)?;
            }
        }
        Ok(())
    }

    fn read_delta(
        &self,
        from: &EntityState,
        _descriptor: DeltaDescriptor,
        reader: &mut BitReader<'_>,
    ) -> BitResult<EntityState> {
        let mut state = from.clone();
        if reader.read_one_bit() {
            state.entity_type = EntityType::from_raw(reader.read_bits(TYPE_BITS)?);
        }
        let count = reader.read_bits(COUNT_BITS)? as usize;
        state.fields.resize(count, 0);
        for field in &mut state.fields {
            if reader.read_one_bit() {
                *field = reader.read_signed_bits(self.field_bits)?;
            }
        }
        Ok(state)
    }

    fn test_delta(
        &self,
        from: &EntityState,
        to: &EntityState,
        _descriptor: DeltaDescriptor,
    ) -> u32 {
        let type_bits = if from.entity_type == to.entity_type {
            1
        } else {
            1 + TYPE_BITS
        };
        let changed = Self::changed(from, to).filter(|c| *c).count() as u32;
        type_bits + COUNT_BITS + to.fields.len() as u32 + changed * self.field_bits
    }
}
