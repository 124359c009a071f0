//! Id types and ranges
//!
//! Defines the kinds of ids the kernel allocates and the ranges handed out
//! by the cluster.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IdError, Result};

/// Kinds of ids allocated through the cluster
///
/// The declaration order is the wire ordinal. Never reorder; append only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum IdType {
    Node = 0,
    Relationship = 1,
    Property = 2,
    StringBlock = 3,
    ArrayBlock = 4,
    PropertyKeyToken = 5,
    PropertyKeyTokenName = 6,
    RelationshipTypeToken = 7,
    RelationshipTypeTokenName = 8,
    LabelToken = 9,
    LabelTokenName = 10,
    NeoStore = 11,
    Schema = 12,
    NodeLabels = 13,
    RelationshipGroup = 14,
}

impl IdType {
    /// Every id type, in ordinal order
    pub const ALL: [IdType; 15] = [
        IdType::Node,
        IdType::Relationship,
        IdType::Property,
        IdType::StringBlock,
        IdType::ArrayBlock,
        IdType::PropertyKeyToken,
        IdType::PropertyKeyTokenName,
        IdType::RelationshipTypeToken,
        IdType::RelationshipTypeTokenName,
        IdType::LabelToken,
        IdType::LabelTokenName,
        IdType::NeoStore,
        IdType::Schema,
        IdType::NodeLabels,
        IdType::RelationshipGroup,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn ordinal(self) -> i32 {
        self as i32
    }

    pub fn from_ordinal(ordinal: i32) -> Result<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| IdError::Protocol(format!("Unknown id type ordinal: {}", ordinal)))
    }

    /// Lowercase name used by the CLI
    pub fn name(self) -> &'static str {
        match self {
            IdType::Node => "node",
            IdType::Relationship => "relationship",
            IdType::Property => "property",
            IdType::StringBlock => "string_block",
            IdType::ArrayBlock => "array_block",
            IdType::PropertyKeyToken => "property_key_token",
            IdType::PropertyKeyTokenName => "property_key_token_name",
            IdType::RelationshipTypeToken => "relationship_type_token",
            IdType::RelationshipTypeTokenName => "relationship_type_token_name",
            IdType::LabelToken => "label_token",
            IdType::LabelTokenName => "label_token_name",
            IdType::NeoStore => "neostore",
            IdType::Schema => "schema",
            IdType::NodeLabels => "node_labels",
            IdType::RelationshipGroup => "relationship_group",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

/// A contiguous range of ids plus previously freed ids eligible for reuse
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdRange {
    pub defrag_ids: Vec<u64>,
    pub range_start: u64,
    pub range_length: u32,
}

impl IdRange {
    pub const EMPTY: IdRange = IdRange {
        defrag_ids: Vec::new(),
        range_start: 0,
        range_length: 0,
    };

    pub fn new(defrag_ids: Vec<u64>, range_start: u64, range_length: u32) -> Self {
        Self {
            defrag_ids,
            range_start,
            range_length,
        }
    }

    /// A plain contiguous range without reusable ids
    pub fn contiguous(range_start: u64, range_length: u32) -> Self {
        Self::new(Vec::new(), range_start, range_length)
    }

    /// One past the last id of the contiguous part
    pub fn range_end(&self) -> u64 {
        self.range_start + u64::from(self.range_length)
    }

    pub fn total_size(&self) -> usize {
        self.defrag_ids.len() + self.range_length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total_size() == 0
    }

    /// Highest id contained in this range, if any
    pub fn highest_id(&self) -> Option<u64> {
        let contiguous = (self.range_length > 0).then(|| self.range_end() - 1);
        self.defrag_ids.iter().copied().chain(contiguous).max()
    }

    /// All ids in serving order: reusable ids first, then the contiguous part
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.defrag_ids
            .iter()
            .copied()
            .chain(self.range_start..self.range_end())
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IdRange[{}-{}, defrag {:?}]",
            self.range_start,
            self.range_end().saturating_sub(1),
            self.defrag_ids
        )
    }
}

/// A range granted by the cluster together with the bookkeeping around it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocation {
    pub id_range: IdRange,

    /// Highest id in use before this range was granted, -1 if none
    pub highest_id_in_use: i64,

    pub defrag_count: u64,
}

impl IdAllocation {
    pub fn new(id_range: IdRange, highest_id_in_use: i64, defrag_count: u64) -> Self {
        Self {
            id_range,
            highest_id_in_use,
            defrag_count,
        }
    }
}

/// Serves ids out of one [`IdRange`], reusable ids first
#[derive(Debug, Clone, Default)]
pub struct IdRangeIterator {
    defrag_ids: Vec<u64>,
    defrag_position: usize,
    next: u64,
    end: u64,
}

impl IdRangeIterator {
    pub fn new(range: IdRange) -> Self {
        let end = range.range_end();
        Self {
            defrag_ids: range.defrag_ids,
            defrag_position: 0,
            next: range.range_start,
            end,
        }
    }

    /// An exhausted iterator
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> Option<u64> {
        if let Some(&id) = self.defrag_ids.get(self.defrag_position) {
            self.defrag_position += 1;
            return Some(id);
        }
        if self.next < self.end {
            let id = self.next;
            self.next += 1;
            return Some(id);
        }
        None
    }

    /// Take up to `size` ids as a range of their own
    ///
    /// Reusable ids are returned as the batch's defrag ids; the rest comes out
    /// of the contiguous part.
    pub fn next_id_batch(&mut self, size: usize) -> IdRange {
        let defrag_take = size.min(self.defrag_ids.len() - self.defrag_position);
        let defrag_ids =
            self.defrag_ids[self.defrag_position..self.defrag_position + defrag_take].to_vec();
        self.defrag_position += defrag_take;

        let remaining_contiguous = self.end - self.next;
        let contiguous_take = ((size - defrag_take) as u64).min(remaining_contiguous);
        let range_start = self.next;
        self.next += contiguous_take;

        IdRange::new(defrag_ids, range_start, contiguous_take as u32)
    }

    /// Drop every id below `high_id`
    pub fn skip_below(&mut self, high_id: u64) {
        let position = self.defrag_position;
        self.defrag_ids.drain(..position);
        self.defrag_ids.retain(|&id| id >= high_id);
        self.defrag_position = 0;
        if self.next < high_id {
            self.next = high_id.min(self.end);
        }
    }

    pub fn remaining(&self) -> usize {
        (self.defrag_ids.len() - self.defrag_position) + (self.end - self.next) as usize
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}
