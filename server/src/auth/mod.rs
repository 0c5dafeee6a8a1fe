pub mod jwt;
pub mod oauth_state;
