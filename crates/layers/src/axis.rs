//! Named tensor dimensions.
//!
//! An [`Axis`] is identified by its name; the size travels with it so that
//! two tensors meeting in an operation can be checked for agreement. Axes
//! are cheap to clone and immutable once built.

use std::fmt;

/// Axis names shared by the model components.
pub mod names {
    pub const EMBED: &str = "embedding";
    pub const VOCAB: &str = "vocab";
    pub const POSITION: &str = "position";
    pub const MAX_POSITION: &str = "max_position";
    pub const QUERY_POSITION: &str = "query_position";
    pub const KEY_POSITION: &str = "key_value_position";
    pub const QK_EMBED: &str = "query_key_embedding";
    pub const V_EMBED: &str = "value_embedding";
    pub const HEAD: &str = "head";
    pub const LAYER: &str = "layer";
    pub const INTERMEDIATE: &str = "intermediate";
}

/// A named dimension with a fixed size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Axis {
    name: String,
    size: usize,
}

impl Axis {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns an axis of the same size under a different name.
    pub fn alias(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.size)
    }

    /// Whether `other` refers to this axis (name equality).
    pub fn same_name(&self, other: &Axis) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.size)
    }
}

/// Total element count spanned by `axes`; the empty product is one.
pub fn volume(axes: &[Axis]) -> usize {
    axes.iter().map(Axis::size).product()
}

/// Sizes of `axes` in order.
pub fn sizes(axes: &[Axis]) -> Vec<usize> {
    axes.iter().map(Axis::size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_keeps_size_and_changes_identity() {
        let pos = Axis::new(names::POSITION, 7);
        let query = pos.alias(names::QUERY_POSITION);
        assert_eq!(query.size(), 7);
        assert!(!query.same_name(&pos));
        assert_eq!(query.to_string(), "query_position[7]");
    }

    #[test]
    fn volume_of_no_axes_is_one() {
        assert_eq!(volume(&[]), 1);
        let axes = [Axis::new("a", 2), Axis::new("b", 3)];
        assert_eq!(volume(&axes), 6);
        assert_eq!(sizes(&axes), vec![2, 3]);
    }
}
