use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::integration_event::{EventDeadLetter, IntegrationEvent};

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert_event(&self, event: IntegrationEvent) -> Result<IntegrationEvent, AppError>;

    async fn save_event(&self, event: &IntegrationEvent) -> Result<(), AppError>;

    async fn find_event(&self, id: Uuid) -> Result<Option<IntegrationEvent>, AppError>;

    /// Newest first.
    async fn list_events(&self) -> Result<Vec<IntegrationEvent>, AppError>;

    async fn insert_dead_letter(&self, dead: EventDeadLetter) -> Result<(), AppError>;

    async fn list_dead_letters(&self) -> Result<Vec<EventDeadLetter>, AppError>;

    /// Removes and returns the dead letter so it can be published again.
    async fn take_dead_letter(&self, id: Uuid) -> Result<EventDeadLetter, AppError>;
}
