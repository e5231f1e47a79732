pub mod api_key_repository;
pub mod event_repository;
pub mod memory;
pub mod postgres_platform_repository;
pub mod rule_repository;
pub mod seed;
pub mod user_repository;
pub mod webhook_repository;
pub mod workflow_repository;
