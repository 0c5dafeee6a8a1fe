pub mod client;
pub mod oauth;
pub mod parsed_message;
