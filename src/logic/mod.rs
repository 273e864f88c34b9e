pub mod apply;
pub mod extract;
pub mod heuristics;
pub mod pipeline;
pub mod reconcile;
pub mod walk;

pub use apply::*;
pub use extract::*;
pub use heuristics::*;
pub use pipeline::*;
pub use reconcile::*;
pub use walk::*;
