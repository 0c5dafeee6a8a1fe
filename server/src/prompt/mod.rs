pub mod chat;
pub mod priority;
