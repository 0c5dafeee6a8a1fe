pub mod account;
pub mod analysis;
pub mod email;
pub mod preferences;
pub mod response;
