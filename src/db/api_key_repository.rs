use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::api_key::PlatformApiKey;

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn create_api_key(&self, name: &str, key: &str) -> Result<PlatformApiKey, AppError>;

    /// Newest first.
    async fn list_api_keys(&self) -> Result<Vec<PlatformApiKey>, AppError>;

    async fn delete_api_key(&self, id: Uuid) -> Result<bool, AppError>;
}
