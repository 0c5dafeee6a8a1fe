pub mod prelude;

pub mod email;
pub mod email_account;
pub mod email_analysis;
pub mod user_preferences;
