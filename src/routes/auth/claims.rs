use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::user::UserRole;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Claims {
    pub sub: String, // user UUID
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub exp: usize,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub aud: String,
}

impl Claims {
    /// `ttl_seconds` may be negative to mint an already-expired token.
    pub fn new(sub: String, email: String, name: String, role: UserRole, ttl_seconds: i64) -> Self {
        let exp = (OffsetDateTime::now_utc().unix_timestamp() + ttl_seconds).max(0) as usize;
        Claims {
            sub,
            email,
            name,
            role,
            exp,
            iss: String::new(),
            aud: String::new(),
        }
    }
}
