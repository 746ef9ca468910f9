//! Page views: summary counters, result tree, run annotations

pub mod annotations;
pub mod summary;
pub mod tree;

pub use annotations::{AnnotationCell, AnnotationTable};
pub use summary::{SummaryRow, SummaryTable};
pub use tree::{FieldContent, NodeRef, NodeState, ResultTree, Scope, TreeAction, TreeOptions};
