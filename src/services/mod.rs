pub mod event_bus;
pub mod insights;
pub mod mailer;
pub mod notifications;
pub mod platform;
pub mod rfis;
pub mod scheduling;
pub mod tasks;
pub mod team;
pub mod webhook_sender;

use std::sync::Arc;

use insights::InsightsService;
use mailer::Mailer;
use notifications::NotificationService;
use rfis::RfiService;
use scheduling::SchedulingService;
use tasks::TaskService;
use team::TeamService;

/// The domain services that rule actions, workflow steps and event handlers
/// delegate to.
#[derive(Clone)]
pub struct Collaborators {
    pub notifications: Arc<NotificationService>,
    pub team: Arc<TeamService>,
    pub tasks: Arc<TaskService>,
    pub rfis: Arc<RfiService>,
    pub scheduling: Arc<SchedulingService>,
    pub insights: Arc<InsightsService>,
    pub mailer: Arc<dyn Mailer>,
}

impl Collaborators {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Collaborators {
            notifications: Arc::new(NotificationService::new()),
            team: Arc::new(TeamService::new()),
            tasks: Arc::new(TaskService::new()),
            rfis: Arc::new(RfiService::new()),
            scheduling: Arc::new(SchedulingService::new()),
            insights: Arc::new(InsightsService::new()),
            mailer,
        }
    }
}
