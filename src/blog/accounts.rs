use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use sha1::{Digest, Sha1};

use crate::blog::error::{ApiError, ApiResult};
use crate::blog::models::{next_id, now, User};
use crate::{Database, FindAll, Model};

/// Name of the session cookie.
pub const COOKIE_NAME: &str = "awesession";
/// Session lifetime in seconds (24h).
pub const COOKIE_MAX_AGE: u64 = 86400;

const MASKED_PASSWORD: &str = "******";

static RE_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9\.\-_]+@[a-z0-9\-_]+(\.[a-z0-9\-_]+){1,4}$").expect("valid email regex")
});
static RE_SHA1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{40}$").expect("valid sha1 regex"));

/// A signed-in user (password masked) and the cookie that keeps them signed in.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: User,
    pub cookie: String,
}

/// Registration, sign-in and session cookies.
#[derive(Clone)]
pub struct Accounts {
    db: Database,
    cookie_secret: String,
}

fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn unix_secs() -> u64 {
    now() as u64
}

impl Accounts {
    pub fn new(db: Database, cookie_secret: impl Into<String>) -> Self {
        Self {
            db,
            cookie_secret: cookie_secret.into(),
        }
    }

    /// Creates a user. `passwd` is the client-side sha1 of the password; the
    /// stored value is `sha1("<id>:<passwd>")`.
    pub async fn register_user(&self, email: &str, name: &str, passwd: &str) -> ApiResult<SignedIn> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::value("name", "Name cannot be empty."));
        }
        if !RE_EMAIL.is_match(email) {
            return Err(ApiError::value("email", "Invalid email."));
        }
        if !RE_SHA1.is_match(passwd) {
            return Err(ApiError::value("passwd", "Invalid password."));
        }

        let existing = User::find_all(&self.db, FindAll::new().filter("email=?", vec![json!(email)])).await?;
        if !existing.is_empty() {
            return Err(ApiError::Conflict {
                error: "register:failed".to_string(),
                field: "email".to_string(),
                message: "Email is already in use.".to_string(),
            });
        }

        let uid = next_id();
        let mut user = User {
            passwd: Some(sha1_hex(&format!("{uid}:{passwd}"))),
            id: Some(uid),
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            image: Some(format!(
                "http://www.gravatar.com/avatar/{:x}?d=mm&s=120",
                md5::compute(email.as_bytes())
            )),
            ..Default::default()
        };
        user.save(&self.db).await?;
        tracing::info!("registered user {}", email);

        Ok(self.sign_in(user))
    }

    /// Checks an email/password pair.
    pub async fn authenticate(&self, email: &str, passwd: &str) -> ApiResult<SignedIn> {
        if email.is_empty() {
            return Err(ApiError::value("email", "Invalid email."));
        }
        if passwd.is_empty() {
            return Err(ApiError::value("passwd", "Invalid password."));
        }
        let users = User::find_all(&self.db, FindAll::new().filter("email=?", vec![json!(email)])).await?;
        let Some(user) = users.into_iter().next() else {
            return Err(ApiError::value("email", "Email not exist."));
        };

        let expected = sha1_hex(&format!("{}:{}", user.id.as_deref().unwrap_or_default(), passwd));
        if user.passwd.as_deref() != Some(expected.as_str()) {
            return Err(ApiError::value("passwd", "Invalid password."));
        }
        Ok(self.sign_in(user))
    }

    fn sign_in(&self, mut user: User) -> SignedIn {
        let cookie = self.user_to_cookie(&user, COOKIE_MAX_AGE);
        user.passwd = Some(MASKED_PASSWORD.to_string());
        SignedIn { user, cookie }
    }

    fn cookie_signature(&self, id: &str, passwd: &str, expires: &str) -> String {
        sha1_hex(&format!("{id}-{passwd}-{expires}-{}", self.cookie_secret))
    }

    /// `id-expires-sha1(id-passwd-expires-secret)`
    pub fn user_to_cookie(&self, user: &User, max_age: u64) -> String {
        let id = user.id.as_deref().unwrap_or_default();
        let expires = (unix_secs() + max_age).to_string();
        let signature = self.cookie_signature(id, user.passwd.as_deref().unwrap_or_default(), &expires);
        format!("{id}-{expires}-{signature}")
    }

    /// The signed-in user for a session cookie. Malformed, expired and
    /// tampered cookies give `None`.
    pub async fn cookie_to_user(&self, cookie: &str) -> ApiResult<Option<User>> {
        let parts: Vec<&str> = cookie.split('-').collect();
        let [uid, expires, signature] = parts.as_slice() else {
            return Ok(None);
        };
        let Ok(expires_at) = expires.parse::<u64>() else {
            return Ok(None);
        };
        if expires_at < unix_secs() {
            return Ok(None);
        }

        let Some(mut user) = User::find(&self.db, *uid).await? else {
            return Ok(None);
        };
        let expected = self.cookie_signature(uid, user.passwd.as_deref().unwrap_or_default(), expires);
        if *signature != expected {
            tracing::info!("invalid sha1");
            return Ok(None);
        }
        user.passwd = Some(MASKED_PASSWORD.to_string());
        Ok(Some(user))
    }
}
