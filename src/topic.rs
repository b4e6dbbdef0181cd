//! A denormalized, read-friendly projection of [`ClusterMetadata`]
//! (`crate::client::metadata_cache::ClusterMetadata`) for callers that just
//! want to list topics and partitions without walking the raw maps.

use std::collections::BTreeMap;

use crate::protocol::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// The name of this topic.
    pub name: String,

    /// `None` unless the broker flagged this topic itself as an error
    /// (e.g. `UnknownTopicOrPartition` when it does not exist at all).
    pub error: Option<Error>,

    /// Partition information, keyed by partition id.
    pub partitions: BTreeMap<i32, Partition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// The partition id; also the key this value is stored under in
    /// [`Topic::partitions`].
    pub partition: i32,

    /// The ID of the leader broker. `-1` if no leader is currently elected.
    pub leader_id: i32,

    /// The set of all nodes that host this partition.
    pub replica_nodes: Vec<i32>,

    /// The set of all nodes that are in sync with the leader for this partition.
    pub isr_nodes: Vec<i32>,

    /// Per-partition broker error, if any.
    pub error: Option<Error>,
}

impl Partition {
    /// A partition with no elected leader, or whose routing error makes it
    /// unsafe to send to right now.
    pub fn is_unavailable(&self) -> bool {
        self.leader_id < 0 || self.error.map(Error::retriable).unwrap_or(false)
    }
}
