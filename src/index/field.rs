//! Field model: index features, field metadata, field statistics.

use serde::{Deserialize, Serialize};

/// Identifier of a field within a segment.
pub type FieldId = u32;

/// Identifier of a column within a segment.
pub type ColumnId = u32;

/// The set of attributes a field indexes.
///
/// Features gate what a postings iterator can expose: requesting postings
/// with features the field never indexed is a caller error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexFeatures(u32);

impl IndexFeatures {
    /// Document ids only.
    pub const NONE: IndexFeatures = IndexFeatures(0);
    /// Per-document term frequency.
    pub const FREQ: IndexFeatures = IndexFeatures(1);
    /// Term positions within each document.
    pub const POSITION: IndexFeatures = IndexFeatures(1 << 1);
    /// Byte offsets attached to positions.
    pub const OFFSET: IndexFeatures = IndexFeatures(1 << 2);
    /// Payload bytes attached to positions.
    pub const PAYLOAD: IndexFeatures = IndexFeatures(1 << 3);
    /// Field-length normalization column.
    pub const NORM: IndexFeatures = IndexFeatures(1 << 4);
    /// Tokens carry a one-byte granularity prefix.
    pub const GRANULARITY: IndexFeatures = IndexFeatures(1 << 5);

    /// Whether every feature of `other` is present in `self`.
    pub fn contains(self, other: IndexFeatures) -> bool {
        self.0 & other.0 == other.0
    }

    /// The features present in both sets.
    pub fn intersection(self, other: IndexFeatures) -> IndexFeatures {
        IndexFeatures(self.0 & other.0)
    }

    /// Whether no feature is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for IndexFeatures {
    type Output = IndexFeatures;

    fn bitor(self, rhs: IndexFeatures) -> IndexFeatures {
        IndexFeatures(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for IndexFeatures {
    fn bitor_assign(&mut self, rhs: IndexFeatures) {
        self.0 |= rhs.0;
    }
}

/// Metadata of a field within one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field name, unique within the segment.
    pub name: String,

    /// Field id, unique within the segment.
    pub id: FieldId,

    /// Attributes indexed for this field.
    pub features: IndexFeatures,

    /// Column holding the field's norm values, when norms are indexed.
    pub norm_column: Option<ColumnId>,
}

/// Aggregate statistics of a field within one segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStats {
    /// Number of documents with at least one token in this field.
    pub docs_count: u64,

    /// Total number of tokens indexed for this field.
    pub total_term_freq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_algebra() {
        let indexed = IndexFeatures::FREQ | IndexFeatures::POSITION | IndexFeatures::NORM;
        assert!(indexed.contains(IndexFeatures::FREQ));
        assert!(indexed.contains(IndexFeatures::FREQ | IndexFeatures::POSITION));
        assert!(!indexed.contains(IndexFeatures::OFFSET));
        assert!(indexed.contains(IndexFeatures::NONE));

        let requested = IndexFeatures::FREQ | IndexFeatures::OFFSET;
        assert_eq!(
            indexed.intersection(requested),
            IndexFeatures::FREQ,
            "intersection drops what the field never indexed"
        );
        assert!(IndexFeatures::NONE.is_empty());
        assert!(!indexed.is_empty());
    }
}
