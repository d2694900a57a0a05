//! Counter value types and their on-disk encoding.

/// Width of a persisted counter value. The store holds each counter as a
/// little-endian `u64`, matching the layout of existing data files.
pub const COUNTER_WIDTH: usize = 8;

/// The pair of counters tracked by the service.
///
/// Arithmetic wraps on overflow and underflow; the counters are plain
/// fixed-width integers with no enforced upper bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterPair {
    pub visits: u64,
    pub likes: u64,
}

impl CounterPair {
    pub fn new(visits: u64, likes: u64) -> Self {
        Self { visits, likes }
    }

    /// The pair after one homepage view.
    #[must_use]
    pub fn with_visit(self) -> Self {
        Self {
            visits: self.visits.wrapping_add(1),
            ..self
        }
    }

    /// The pair after one like.
    ///
    /// When `decrement_visits` is set, a like also takes one visit away.
    /// Long-running deployments accumulated their counts under that rule,
    /// so the flag keeps their numbers evolving the same way; turning it
    /// off gives the corrected mode where visits are untouched.
    #[must_use]
    pub fn with_like(self, decrement_visits: bool) -> Self {
        let visits = if decrement_visits {
            self.visits.wrapping_sub(1)
        } else {
            self.visits
        };
        Self {
            visits,
            likes: self.likes.wrapping_add(1),
        }
    }
}

/// Encode a counter for storage.
pub fn encode_counter(value: u64) -> [u8; COUNTER_WIDTH] {
    value.to_le_bytes()
}

/// Decode a stored counter. Returns `None` unless the slice is exactly
/// [`COUNTER_WIDTH`] bytes.
pub fn decode_counter(bytes: &[u8]) -> Option<u64> {
    let raw: [u8; COUNTER_WIDTH] = bytes.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}
