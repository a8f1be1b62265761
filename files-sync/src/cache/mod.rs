pub mod live;
pub mod mutations;
pub mod optimistic;
pub mod reconcile;
pub mod sort;
pub mod store;

pub use live::{LiveQueries, QueryId, RefetchDecision};
pub use mutations::ViewContext;
pub use optimistic::{OptimisticId, OptimisticLayers};
pub use reconcile::{ListOutcome, ReconcileReport};
pub use sort::{add_node_in_sorted_list, compare_nodes};
pub use store::{FieldKey, NodeList, NormalizedCache, SharedCache};
