use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth;
use crate::common::error::{CoreError, Result};
use crate::domain::*;
use crate::storage::Storage;

const SESSION_TTL_DAYS: i64 = 30;
const VERIFICATION_TTL_HOURS: i64 = 48;

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub facebook_url: Option<String>,
    pub twitter_url: Option<String>,
    pub instagram_url: Option<String>,
    pub language: Option<String>,
    pub notify_follow: Option<bool>,
    pub notify_review_like: Option<bool>,
    pub notify_comment: Option<bool>,
    pub notify_mention: Option<bool>,
}

/// Public view of a user, with profile and social counts.
#[derive(Debug, Clone, Serialize)]
pub struct UserDetail {
    pub user: User,
    pub profile: Profile,
    pub review_count: u32,
    pub follower_count: u32,
}

#[derive(Clone)]
pub struct AccountService {
    storage: Arc<dyn Storage>,
}

impl AccountService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Register a new account: the user row, its default profile, the three
    /// system shelves, and an email verification token.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(User, VerificationToken)> {
        auth::validate_credentials(username, email, password)?;

        if self.storage.get_user_by_username(username).await?.is_some() {
            return Err(CoreError::Conflict(format!(
                "username '{username}' is already taken"
            )));
        }
        if self.storage.get_user_by_email(email).await?.is_some() {
            return Err(CoreError::Conflict(format!(
                "email '{email}' is already registered"
            )));
        }

        let now = Utc::now();
        let mut user = User {
            id: None,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: auth::hash_password(password),
            role: Role::Member,
            is_verified: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_user(&mut user).await?;
        let user_id = user.id.expect("storage assigns user id");

        let mut profile = Profile::new_default(user_id, now);
        self.storage.create_profile(&mut profile).await?;

        for kind in ShelfKind::ALL {
            let mut shelf = Shelf {
                id: None,
                user_id,
                name: kind.display_name().to_string(),
                system_kind: Some(kind),
                description: String::new(),
                visibility: Visibility::Public,
                book_count: 0,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            self.storage.create_shelf(&mut shelf).await?;
        }

        let mut token = VerificationToken {
            id: None,
            user_id,
            token: auth::generate_token(),
            expires_at: now + Duration::hours(VERIFICATION_TTL_HOURS),
            is_used: false,
            created_at: now,
        };
        self.storage.create_verification_token(&mut token).await?;

        info!("Registered user {} ({})", user.username, user_id);
        Ok((user, token))
    }

    /// Redeem an email verification token. Single use, must not be expired.
    pub async fn verify_email(&self, token: &str) -> Result<User> {
        let mut record = self
            .storage
            .get_verification_token(token)
            .await?
            .ok_or_else(|| CoreError::NotFound("verification token".to_string()))?;
        if record.is_used {
            return Err(CoreError::Validation(
                "verification token already used".to_string(),
            ));
        }
        if record.expires_at < Utc::now() {
            return Err(CoreError::Validation(
                "verification token expired".to_string(),
            ));
        }

        let mut user = self
            .storage
            .get_user_by_id(record.user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("user".to_string()))?;
        user.is_verified = true;
        user.updated_at = Utc::now();
        self.storage.update_user(&user).await?;

        record.is_used = true;
        self.storage.update_verification_token(&record).await?;

        info!("Verified email for user {}", user.username);
        Ok(user)
    }

    /// Authenticate by username or email and open a session.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<(User, Session)> {
        let user = if identifier.contains('@') {
            self.storage.get_user_by_email(identifier).await?
        } else {
            self.storage.get_user_by_username(identifier).await?
        };
        let user = user
            .filter(|u| u.is_active)
            .ok_or_else(|| CoreError::Unauthorized("invalid credentials".to_string()))?;

        if !auth::verify_password(password, &user.password_hash) {
            return Err(CoreError::Unauthorized("invalid credentials".to_string()));
        }

        let now = Utc::now();
        let mut session = Session {
            id: None,
            user_id: user.id.expect("stored user has id"),
            token: auth::generate_token(),
            expires_at: now + Duration::days(SESSION_TTL_DAYS),
            created_at: now,
        };
        self.storage.create_session(&mut session).await?;

        info!("User {} logged in", user.username);
        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        self.storage.delete_session(token).await
    }

    /// Resolve a bearer token to its user, if the session is still valid.
    pub async fn current_user(&self, token: &str) -> Result<Option<User>> {
        let session = match self.storage.get_session_by_token(token).await? {
            Some(s) if s.expires_at > Utc::now() => s,
            _ => return Ok(None),
        };
        Ok(self
            .storage
            .get_user_by_id(session.user_id)
            .await?
            .filter(|u| u.is_active))
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<Profile> {
        self.storage
            .get_profile_by_user(user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("profile".to_string()))
    }

    pub async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<Profile> {
        let mut profile = self.get_profile(user_id).await?;
        if let Some(bio) = update.bio {
            profile.bio = bio;
        }
        if let Some(location) = update.location {
            profile.location = location;
        }
        if let Some(website) = update.website {
            profile.website = website;
        }
        if let Some(url) = update.facebook_url {
            profile.facebook_url = url;
        }
        if let Some(url) = update.twitter_url {
            profile.twitter_url = url;
        }
        if let Some(url) = update.instagram_url {
            profile.instagram_url = url;
        }
        if let Some(language) = update.language {
            profile.language = language;
        }
        if let Some(v) = update.notify_follow {
            profile.notify_follow = v;
        }
        if let Some(v) = update.notify_review_like {
            profile.notify_review_like = v;
        }
        if let Some(v) = update.notify_comment {
            profile.notify_comment = v;
        }
        if let Some(v) = update.notify_mention {
            profile.notify_mention = v;
        }
        profile.updated_at = Utc::now();
        self.storage.update_profile(&profile).await?;
        Ok(profile)
    }

    /// Public user page data: profile plus review and follower counts.
    pub async fn user_detail(&self, username: &str) -> Result<UserDetail> {
        let user = self
            .storage
            .get_user_by_username(username)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| CoreError::NotFound(format!("user '{username}'")))?;
        let user_id = user.id.expect("stored user has id");
        let profile = self.get_profile(user_id).await?;
        let review_count = self.storage.count_public_reviews_by_user(user_id).await?;
        let follower_count = self
            .storage
            .count_followers(crate::content::ContentRef::new(
                crate::content::ContentKind::User,
                user_id,
            ))
            .await?;
        Ok(UserDetail {
            user,
            profile,
            review_count,
            follower_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn service() -> AccountService {
        AccountService::new(Arc::new(InMemoryStorage::new()))
    }

    #[tokio::test]
    async fn register_creates_profile_and_system_shelves() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let accounts = AccountService::new(storage.clone());

        let (user, _token) = accounts
            .register("reader", "reader@example.com", "correcthorse")
            .await
            .unwrap();
        let user_id = user.id.unwrap();

        assert!(storage.get_profile_by_user(user_id).await.unwrap().is_some());
        let shelves = storage.list_shelves_by_user(user_id).await.unwrap();
        assert_eq!(shelves.len(), 3);
        assert!(shelves.iter().all(|s| s.is_system()));
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let accounts = service();
        accounts
            .register("reader", "first@example.com", "correcthorse")
            .await
            .unwrap();
        let err = accounts
            .register("reader", "second@example.com", "correcthorse")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_and_session_round_trip() {
        let accounts = service();
        accounts
            .register("reader", "reader@example.com", "correcthorse")
            .await
            .unwrap();

        let (user, session) = accounts.login("reader", "correcthorse").await.unwrap();
        assert_eq!(user.username, "reader");

        let resolved = accounts.current_user(&session.token).await.unwrap();
        assert_eq!(resolved.unwrap().id, user.id);

        accounts.logout(&session.token).await.unwrap();
        assert!(accounts.current_user(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn login_rejects_bad_password() {
        let accounts = service();
        accounts
            .register("reader", "reader@example.com", "correcthorse")
            .await
            .unwrap();
        let err = accounts.login("reader", "wrong-password").await.unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn email_verification_is_single_use() {
        let accounts = service();
        let (_, token) = accounts
            .register("reader", "reader@example.com", "correcthorse")
            .await
            .unwrap();

        let user = accounts.verify_email(&token.token).await.unwrap();
        assert!(user.is_verified);
        assert!(accounts.verify_email(&token.token).await.is_err());
    }
}
