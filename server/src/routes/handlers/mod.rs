pub mod accounts;
pub mod auth;
pub mod emails;
pub mod preferences;
