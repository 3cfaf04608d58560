//! CLI command implementations

pub mod cache;
pub mod config;
pub mod dataset;
pub mod fetch;
pub mod push;

pub use cache::execute as cache;
pub use config::execute as config;
pub use dataset::execute as dataset;
pub use fetch::execute as fetch;
pub use push::execute as push;
