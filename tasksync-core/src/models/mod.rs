mod completion;
mod metadata;
mod project;
mod snapshot;
mod task;

pub use completion::*;
pub use metadata::*;
pub use project::*;
pub use snapshot::*;
pub use task::*;
