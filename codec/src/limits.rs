//! Limits for packet entity encoding.

/// Codec-specific limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecLimits {
    /// Maximum number of entities in one packet.
    pub max_packet_entities: usize,
    /// How many preceding entities a full update may search for a cheaper baseline.
    pub baseline_search_window: usize,
    /// Maximum number of class-keyed instance baselines.
    pub max_instance_baselines: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_packet_entities: 256,
            baseline_search_window: 64,
            max_instance_baselines: 64,
        }
    }
}

impl CodecLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_packet_entities: 16,
            baseline_search_window: 4,
            max_instance_baselines: 4,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    ///
    /// The baseline offset is still bounded by its 6-bit wire field.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_packet_entities: usize::MAX,
            baseline_search_window: usize::MAX,
            max_instance_baselines: usize::MAX,
        }
    }
}
