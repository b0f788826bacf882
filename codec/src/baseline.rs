//! Static and class-keyed instance baselines.

use crate::entity::EntityState;
use crate::error::{CodecError, CodecResult, LimitKind};
use crate::limits::CodecLimits;
use crate::types::{ClassId, EntityId};

/// Per-entity-number baselines captured when the level was spawned.
#[derive(Debug, Clone, Default)]
pub struct StaticBaselines {
    states: Vec<EntityState>,
    last_static: u32,
}

impl StaticBaselines {
    /// Creates empty baselines for entity numbers `0..max_entities`.
    #[must_use]
    pub fn new(max_entities: usize) -> Self {
        Self {
            states: (0..max_entities as u32)
                .map(|n| EntityState::empty(EntityId::new(n)))
                .collect(),
            last_static: 0,
        }
    }

    /// Number of entity slots covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` if no entity slot is covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Replaces the baseline for `state.number`.
    pub fn set(&mut self, state: EntityState) -> CodecResult<()> {
        let number = state.number.raw();
        let slot = self
            .states
            .get_mut(number as usize)
            .ok_or(CodecError::MissingBaseline { number })?;
        *slot = state;
        Ok(())
    }

    /// Returns the baseline for an entity number.
    #[must_use]
    pub fn get(&self, number: EntityId) -> Option<&EntityState> {
        self.states.get(number.raw() as usize)
    }

    /// Highest entity number that existed when the level spawned.
    #[must_use]
    pub const fn last_static(&self) -> u32 {
        self.last_static
    }

    /// Records the highest entity number that existed at spawn.
    pub fn set_last_static(&mut self, number: u32) {
        self.last_static = number;
    }
}

/// A template baseline shared by every entity of one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceBaseline {
    pub class: ClassId,
    pub state: EntityState,
}

/// Class-keyed baselines for entities created after the level spawned.
#[derive(Debug, Clone)]
pub struct InstanceBaselines {
    entries: Vec<InstanceBaseline>,
    max: usize,
}

impl Default for InstanceBaselines {
    fn default() -> Self {
        Self::new(&CodecLimits::default())
    }
}

impl InstanceBaselines {
    /// Creates an empty table bounded by `limits.max_instance_baselines`.
    #[must_use]
    pub fn new(limits: &CodecLimits) -> Self {
        Self {
            entries: Vec::new(),
            max: limits.max_instance_baselines,
        }
    }

    /// Number of stored baselines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no instance baseline exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds a baseline for `class` and returns its index.
    pub fn add(&mut self, class: ClassId, state: EntityState) -> CodecResult<u32> {
        if self.entries.len() >= self.max {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::InstanceBaselines,
                limit: self.max,
                actual: self.entries.len() + 1,
            });
        }
        self.entries.push(InstanceBaseline { class, state });
        Ok((self.entries.len() - 1) as u32)
    }

    /// Returns the first baseline registered for `class`.
    #[must_use]
    pub fn find(&self, class: ClassId) -> Option<(u32, &EntityState)> {
        self.entries
            .iter()
            .position(|entry| entry.class == class)
            .map(|idx| (idx as u32, &self.entries[idx].state))
    }

    /// Returns the baseline at `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&EntityState> {
        self.entries.get(index as usize).map(|entry| &entry.state)
    }
}

/// Every baseline source the packet entity builder can draw from.
#[derive(Debug, Clone, Default)]
pub struct Baselines {
    pub statics: StaticBaselines,
    pub instances: InstanceBaselines,
}

impl Baselines {
    /// Creates empty baselines for `max_entities` entity numbers.
    #[must_use]
    pub fn new(max_entities: usize, limits: &CodecLimits) -> Self {
        Self {
            statics: StaticBaselines::new(max_entities),
            instances: InstanceBaselines::new(limits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_baselines_default_to_empty_states() {
        let baselines = StaticBaselines::new(8);
        assert_eq!(baselines.len(), 8);
        let state = baselines.get(EntityId::new(3)).unwrap();
        assert_eq!(state.number, EntityId::new(3));
        assert!(state.fields.is_empty());
        assert!(baselines.get(EntityId::new(8)).is_none());
    }

    #[test]
    fn static_set_out_of_range() {
        let mut baselines = StaticBaselines::new(2);
        let err = baselines
            .set(EntityState::new(EntityId::new(5), vec![1]))
            .unwrap_err();
        assert_eq!(err, CodecError::MissingBaseline { number: 5 });
        baselines
            .set(EntityState::new(EntityId::new(1), vec![7]))
            .unwrap();
        assert_eq!(baselines.get(EntityId::new(1)).unwrap().fields, vec![7]);
    }

    #[test]
    fn instance_find_returns_first_match() {
        let mut instances = InstanceBaselines::default();
        let a = instances
            .add(ClassId::new(1), EntityState::new(EntityId::new(0), vec![1]))
            .unwrap();
        let b = instances
            .add(ClassId::new(2), EntityState::new(EntityId::new(0), vec![2]))
            .unwrap();
        instances
            .add(ClassId::new(2), EntityState::new(EntityId::new(0), vec![3]))
            .unwrap();
        assert_eq!((a, b), (0, 1));
        let (idx, state) = instances.find(ClassId::new(2)).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(state.fields, vec![2]);
        assert!(instances.find(ClassId::new(9)).is_none());
    }

    #[test]
    fn instance_table_is_bounded() {
        let mut instances = InstanceBaselines::new(&CodecLimits::for_testing());
        for class in 0..4 {
            instances
                .add(ClassId::new(class), EntityState::default())
                .unwrap();
        }
        let err = instances
            .add(ClassId::new(9), EntityState::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::LimitsExceeded {
                kind: LimitKind::InstanceBaselines,
                ..
            }
        ));
        assert_eq!(instances.len(), 4);
    }
}
