pub mod all_mappings;
pub mod apted;
pub mod mapping;

use crate::parsing::LabelId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TedError {
    #[error("input tree is empty")]
    EmptyTree,
    #[error("cost model returned an invalid cost: {0}")]
    InvalidCostModel(f64),
    #[error("edit mapping requested before a distance computation")]
    PreconditionViolated,
    #[error("tree of size {size} exceeds the enumeration limit of {limit} nodes")]
    ResourceExceeded { size: usize, limit: usize },
}

/// Consumer of a replayed edit script.
pub trait OperationExecutor {
    fn insert(&mut self, node: LabelId);
    fn delete(&mut self, node: LabelId);
    fn update(&mut self, src: LabelId, dst: LabelId);
}

pub use apted::{Apted, SpfKind};
