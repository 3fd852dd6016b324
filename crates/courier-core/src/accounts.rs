use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use courier_types::api::AuthResponse;
use courier_types::models::User;

use crate::credentials::{self, CredentialService};
use crate::error::{ChatError, Result};
use crate::store::{Store, UserRecord};

const SEARCH_LIMIT: u32 = 20;

/// Registration, login and user lookup.
#[derive(Clone)]
pub struct Accounts {
    store: Arc<dyn Store>,
    credentials: Arc<dyn CredentialService>,
}

impl Accounts {
    pub fn new(store: Arc<dyn Store>, credentials: Arc<dyn CredentialService>) -> Self {
        Self { store, credentials }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<AuthResponse> {
        validate_username(username)?;
        if password.chars().count() < 8 {
            return Err(ChatError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }

        if self.store.user_by_username(username).await?.is_some() {
            return Err(ChatError::UsernameTaken);
        }

        let record = UserRecord {
            user: User {
                id: Uuid::new_v4(),
                username: username.to_string(),
                online: false,
                last_seen: None,
                created_at: Utc::now(),
            },
            password_hash: credentials::hash_password(password)?,
        };
        self.store.insert_user(&record).await?;
        info!("registered {} ({})", record.user.username, record.user.id);

        self.session_for(&record.user)
    }

    /// Unknown user and wrong password fail identically.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse> {
        let record = self
            .store
            .user_by_username(username)
            .await?
            .ok_or(ChatError::Unauthorized)?;

        if !credentials::verify_password(password, &record.password_hash)? {
            return Err(ChatError::Unauthorized);
        }

        self.session_for(&record.user)
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<User> {
        self.store
            .user_by_id(user_id)
            .await?
            .map(|r| r.user)
            .ok_or(ChatError::NotFound("user"))
    }

    pub async fn search(&self, requester: Uuid, query: &str) -> Result<Vec<User>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::Validation("search query must not be empty".into()));
        }
        Ok(self.store.search_users(query, requester, SEARCH_LIMIT).await?)
    }

    fn session_for(&self, user: &User) -> Result<AuthResponse> {
        let token = self.credentials.issue_token(user.id, &user.username)?;
        Ok(AuthResponse {
            user_id: user.id,
            username: user.username.clone(),
            token,
        })
    }
}

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ChatError::Validation(
            "username must be 3 to 32 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ChatError::Validation(
            "username may only contain letters, digits, '_', '.' and '-'".into(),
        ));
    }
    Ok(())
}
