use dashmap::DashMap;
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::construction::Rfi;
use crate::services::tasks::parse_priority;
use crate::utils::validation::validate_rfi;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRfi {
    #[serde(default)]
    pub project_id: Option<String>,
    pub subject: String,
    pub question: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

#[derive(Default)]
pub struct RfiService {
    rfis: DashMap<String, Rfi>,
}

impl RfiService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, new: NewRfi) -> Result<Rfi, AppError> {
        let check = validate_rfi(&new.subject, &new.question);
        if !check.is_valid {
            return Err(AppError::Validation(check.errors));
        }
        let rfi = Rfi {
            id: Uuid::new_v4().to_string(),
            project_id: new.project_id,
            subject: new.subject.trim().to_string(),
            question: new.question.trim().to_string(),
            status: "open".to_string(),
            priority: parse_priority(new.priority.as_deref())?,
            assigned_to: new.assigned_to,
            created_at: OffsetDateTime::now_utc(),
        };
        self.rfis.insert(rfi.id.clone(), rfi.clone());
        Ok(rfi)
    }

    pub fn get(&self, id: &str) -> Option<Rfi> {
        self.rfis.get(id).map(|r| r.clone())
    }

    pub fn update_status(&self, id: &str, status: &str) -> Result<Rfi, AppError> {
        let mut rfi = self
            .rfis
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("rfi", id))?;
        rfi.status = status.to_string();
        Ok(rfi.clone())
    }
}
