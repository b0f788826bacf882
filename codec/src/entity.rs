//! Entity states and per-frame packet entity lists.

use tracing::debug;

use crate::error::{CodecError, CodecResult};
use crate::limits::CodecLimits;
use crate::types::{ClassId, EntityId, EntityType};

/// The transmitted state of one entity.
///
/// `fields` holds the field values in descriptor order. Their meaning belongs
/// to the delta encoder; the codec only compares, copies and routes them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityState {
    pub number: EntityId,
    pub entity_type: EntityType,
    /// Server-side class, used to pick an instance baseline. Never sent.
    pub class: Option<ClassId>,
    pub fields: Vec<i32>,
}

impl EntityState {
    /// Creates an all-zero state for an entity number.
    #[must_use]
    pub fn empty(number: EntityId) -> Self {
        Self {
            number,
            ..Self::default()
        }
    }

    /// Creates a regular entity state with the given fields.
    #[must_use]
    pub fn new(number: EntityId, fields: Vec<i32>) -> Self {
        Self {
            number,
            entity_type: EntityType::NORMAL,
            class: None,
            fields,
        }
    }

    /// Sets the class used for instance baseline matching.
    #[must_use]
    pub fn with_class(mut self, class: ClassId) -> Self {
        self.class = Some(class);
        self
    }

    /// Sets the entity type flags.
    #[must_use]
    pub fn with_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = entity_type;
        self
    }

    /// Returns `true` if the state uses the custom delta descriptor.
    #[must_use]
    pub const fn is_custom(&self) -> bool {
        self.entity_type.is_custom()
    }
}

/// Entities visible to one client in one frame, ordered by number.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketEntities {
    entities: Vec<EntityState>,
}

impl PacketEntities {
    /// Wraps a list of states.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidEntityOrder`] unless numbers are strictly
    /// ascending.
    pub fn new(entities: Vec<EntityState>) -> CodecResult<Self> {
        for pair in entities.windows(2) {
            let (previous, current) = (pair[0].number.raw(), pair[1].number.raw());
            if current <= previous {
                return Err(CodecError::InvalidEntityOrder { previous, current });
            }
        }
        Ok(Self { entities })
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if there are no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns the entities in ascending number order.
    #[must_use]
    pub fn as_slice(&self) -> &[EntityState] {
        &self.entities
    }

    /// Looks up an entity by number.
    #[must_use]
    pub fn find(&self, number: EntityId) -> Option<&EntityState> {
        self.entities
            .binary_search_by_key(&number, |state| state.number)
            .ok()
            .map(|idx| &self.entities[idx])
    }

    /// Iterates over the entities in ascending number order.
    pub fn iter(&self) -> std::slice::Iter<'_, EntityState> {
        self.entities.iter()
    }

    /// Consumes the list.
    #[must_use]
    pub fn into_inner(self) -> Vec<EntityState> {
        self.entities
    }
}

impl<'a> IntoIterator for &'a PacketEntities {
    type Item = &'a EntityState;
    type IntoIter = std::slice::Iter<'a, EntityState>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

/// Gathers visible entities into a packet list, stopping at the packet cap.
///
/// Candidates must arrive in ascending number order.
pub fn collect_visible<I>(candidates: I, limits: &CodecLimits) -> CodecResult<PacketEntities>
where
    I: IntoIterator<Item = EntityState>,
{
    let mut entities = Vec::new();
    for state in candidates {
        if entities.len() >= limits.max_packet_entities {
            debug!(
                limit = limits.max_packet_entities,
                "Too many entities in visible packet list"
            );
            break;
        }
        entities.push(state);
    }
    PacketEntities::new(entities)
}
