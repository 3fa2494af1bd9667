//! Composite keys for the union and intersection indexes.

/// A pair of optional secondary keys addressing a composite index.
///
/// The two sides may have different key types; the composite index
/// routes each present side to its underlying index. With only one side
/// present, the composite queries that side alone; with both absent it
/// returns nothing.
///
/// # Example
///
/// ```
/// use readthrough::index::CompositeKey;
///
/// let by_both = CompositeKey::both("cat".to_string(), true);
/// let by_tag = CompositeKey::<String, bool>::left("cat".to_string());
/// let by_flag = CompositeKey::<String, bool>::right(true);
/// assert!(by_both.left.is_some() && by_both.right.is_some());
/// assert!(by_tag.right.is_none());
/// assert!(by_flag.left.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey<L, R> {
    /// The left secondary key, if present.
    pub left: Option<L>,
    /// The right secondary key, if present.
    pub right: Option<R>,
}

impl<L, R> CompositeKey<L, R> {
    /// Creates a key with both sides present.
    pub fn both(left: L, right: R) -> Self {
        Self {
            left: Some(left),
            right: Some(right),
        }
    }

    /// Creates a key with only the left side present.
    pub fn left(left: L) -> Self {
        Self {
            left: Some(left),
            right: None,
        }
    }

    /// Creates a key with only the right side present.
    pub fn right(right: R) -> Self {
        Self {
            left: None,
            right: Some(right),
        }
    }

    /// Returns true if neither side is present.
    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Pairs up two key lists positionally.
    ///
    /// The shorter list is padded with absent sides; the result length
    /// is the longer of the two inputs.
    pub fn zip(left: Vec<L>, right: Vec<R>) -> Vec<Self> {
        let len = left.len().max(right.len());
        let mut left = left.into_iter();
        let mut right = right.into_iter();
        (0..len)
            .map(|_| Self {
                left: left.next(),
                right: right.next(),
            })
            .collect()
    }

    /// Wraps each left key into a composite key with an absent right
    /// side.
    pub fn left_keys(keys: Vec<L>) -> Vec<Self> {
        keys.into_iter().map(Self::left).collect()
    }

    /// Wraps each right key into a composite key with an absent left
    /// side.
    pub fn right_keys(keys: Vec<R>) -> Vec<Self> {
        keys.into_iter().map(Self::right).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
