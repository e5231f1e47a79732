use std::sync::Arc;

use reqwest::Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::db::{
    api_key_repository::ApiKeyRepository,
    event_repository::EventRepository,
    memory::{
        InMemoryApiKeyRepository, InMemoryEventRepository, InMemoryRuleRepository,
        InMemoryUserRepository, InMemoryWebhookRepository, InMemoryWorkflowRepository,
    },
    postgres_platform_repository::{PostgresApiKeyRepository, PostgresWebhookRepository},
    rule_repository::RuleRepository,
    user_repository::UserRepository,
    webhook_repository::WebhookRepository,
    workflow_repository::WorkflowRepository,
};
use crate::engine::{RuleEngine, ServiceActionExecutor, WorkflowEngine, WorkflowLimits};
use crate::services::event_bus::IntegrationBus;
use crate::services::mailer::Mailer;
use crate::services::platform::PlatformService;
use crate::services::webhook_sender::{HttpWebhookSender, WebhookSender};
use crate::services::Collaborators;
use crate::utils::jwt::JwtKeys;

/// Storage backends. Only the platform tables have a Postgres implementation.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub events: Arc<dyn EventRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Repositories {
            users: Arc::new(InMemoryUserRepository::default()),
            rules: Arc::new(InMemoryRuleRepository::default()),
            workflows: Arc::new(InMemoryWorkflowRepository::default()),
            events: Arc::new(InMemoryEventRepository::default()),
            webhooks: Arc::new(InMemoryWebhookRepository::default()),
            api_keys: Arc::new(InMemoryApiKeyRepository::default()),
        }
    }

    pub fn with_postgres(pool: PgPool) -> Self {
        Repositories {
            webhooks: Arc::new(PostgresWebhookRepository { pool: pool.clone() }),
            api_keys: Arc::new(PostgresApiKeyRepository { pool }),
            ..Self::in_memory()
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt: Arc<JwtKeys>,
    pub users: Arc<dyn UserRepository>,
    pub services: Collaborators,
    pub rules: Arc<RuleEngine>,
    pub workflows: Arc<WorkflowEngine>,
    pub bus: Arc<IntegrationBus>,
    pub platform: PlatformService,
}

impl AppState {
    /// Wires every service explicitly; nothing here is global.
    pub fn build(
        config: Config,
        jwt: JwtKeys,
        mailer: Arc<dyn Mailer>,
        repos: Repositories,
        http: Client,
    ) -> Self {
        let config = Arc::new(config);
        let app = Arc::new(config.app.clone());
        let services = Collaborators::new(mailer);

        let actions = Arc::new(ServiceActionExecutor::new(
            services.clone(),
            http.clone(),
            config.webhook_timeout,
            app.services.email.enabled,
        ));
        let rules = Arc::new(RuleEngine::new(repos.rules.clone(), actions.clone()));
        let workflows = Arc::new(WorkflowEngine::new(
            repos.workflows.clone(),
            actions,
            WorkflowLimits {
                max_step_transitions: config.max_step_transitions,
                max_concurrent: app.performance.max_concurrent_workflows as usize,
                verbose_logs: app.is_feature_enabled("verboseWorkflowLogs"),
            },
        ));

        let sender: Arc<dyn WebhookSender> =
            Arc::new(HttpWebhookSender::new(http, config.webhook_timeout));
        let bus = Arc::new(IntegrationBus {
            events: repos.events.clone(),
            webhooks: repos.webhooks.clone(),
            sender: sender.clone(),
            rules: rules.clone(),
            workflows: workflows.clone(),
            services: services.clone(),
            config: app.clone(),
            retry_base: config.event_retry_base,
        });
        let platform = PlatformService::new(
            repos.api_keys.clone(),
            repos.webhooks.clone(),
            sender,
            app.integrations.clone(),
        );

        AppState {
            config,
            jwt: Arc::new(jwt),
            users: repos.users,
            services,
            rules,
            workflows,
            bus,
            platform,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::user::UserRole;
    use crate::routes::auth::claims::Claims;
    use crate::services::mailer::MockMailer;

    pub const TEST_SECRET: &str = "siteflow-test-secret-0123456789abcdef";

    pub fn test_state() -> AppState {
        let config = Config::default();
        let jwt = JwtKeys::from_secret(TEST_SECRET, &config.jwt_issuer, &config.jwt_audience)
            .unwrap();
        AppState::build(
            config,
            jwt,
            Arc::new(MockMailer::default()),
            Repositories::in_memory(),
            Client::new(),
        )
    }

    pub fn bearer(state: &AppState, user_id: &str) -> String {
        let claims = Claims::new(
            user_id.to_string(),
            format!("{user_id}@site.test"),
            "Test User".to_string(),
            UserRole::ProjectManager,
            3600,
        );
        format!("Bearer {}", state.jwt.create(claims).unwrap())
    }
}
