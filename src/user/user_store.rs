use super::auth::{AuthToken, AuthTokenValue};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A local user record, keyed by the identity provider's subject claim.
///
/// The application reads only the email-like display string; everything else
/// about the identity stays with the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: usize,
    pub subject: String,
    pub email: Option<String>,
}

pub trait UserAuthTokenStore: Send + Sync {
    /// Returns a user's authentication token given an AuthTokenValue.
    /// Returns Ok(None) if the token does not exist.
    /// Returns Err if there is a database error.
    fn get_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Deletes an auth token given the token value.
    /// Returns Ok(None) if the token does not exist.
    /// Returns Err if there is a database error.
    fn delete_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Updates an auth token with the latest timestamp.
    fn update_user_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()>;

    /// Adds a new auth token.
    fn add_user_auth_token(&self, token: AuthToken) -> Result<()>;
}

pub trait UserStore: UserAuthTokenStore + Send + Sync {
    /// Creates the user for an identity provider subject if it does not
    /// exist yet, refreshing the stored email either way, and returns it.
    fn upsert_user_by_subject(&self, subject: &str, email: Option<&str>) -> Result<User>;

    /// Returns a user given the user id.
    /// Returns Ok(None) if the user does not exist.
    fn get_user(&self, user_id: usize) -> Result<Option<User>>;

    /// Returns a user given the identity provider subject.
    /// Returns Ok(None) if the user does not exist.
    fn get_user_by_subject(&self, subject: &str) -> Result<Option<User>>;
}
