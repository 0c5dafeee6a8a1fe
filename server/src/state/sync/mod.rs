mod pipeline;
mod service;
pub(crate) mod store;

pub use pipeline::SyncOutcome;
pub use service::AccountSyncer;
