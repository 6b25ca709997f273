pub mod executor;
pub mod resource;

pub use executor::{Executor, SyncExecutor};
pub use resource::{InMemoryResourceResolver, ResourceError, ResourceResolver, SharedResourceResolver};
