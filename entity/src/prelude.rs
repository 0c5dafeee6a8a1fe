pub use super::email::Entity as Email;
pub use super::email_account::Entity as EmailAccount;
pub use super::email_analysis::Entity as EmailAnalysis;
pub use super::user_preferences::Entity as UserPreferences;
