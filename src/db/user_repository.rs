use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::{User, UserRole};

#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub company_name: String,
    pub role: UserRole,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Emails are unique case-insensitively; a duplicate is `Conflict`.
    async fn create_user(&self, new: NewUserRecord) -> Result<User, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
}
