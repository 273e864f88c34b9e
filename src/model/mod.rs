pub mod common;
pub mod decision;
pub mod diff;
pub mod entities;
pub mod source;
pub mod workflow;

pub use common::*;
pub use decision::*;
pub use diff::*;
pub use entities::*;
pub use source::*;
pub use workflow::*;
