pub mod sync;
pub mod tasks;
