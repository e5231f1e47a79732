use dashmap::DashMap;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::construction::{Inspection, ProjectSchedule};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProjectSchedule {
    pub name: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub buffer_time: Option<u32>,
    #[serde(default)]
    pub risk_level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInspection {
    #[serde(default)]
    pub project_id: Option<String>,
    pub inspection_type: String,
    #[serde(default)]
    pub inspector: Option<String>,
    /// Days from now; defaults to the next day.
    #[serde(default)]
    pub scheduled_in_days: Option<i64>,
}

#[derive(Default)]
pub struct SchedulingService {
    schedules: DashMap<String, ProjectSchedule>,
    inspections: DashMap<String, Inspection>,
}

impl SchedulingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_project_schedule(
        &self,
        project_id: &str,
        new: NewProjectSchedule,
    ) -> Result<ProjectSchedule, AppError> {
        if project_id.trim().is_empty() {
            return Err(AppError::validation("Project id is required for a schedule"));
        }
        let schedule = ProjectSchedule {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: new.name,
            start_date: new.start_date,
            end_date: new.end_date,
            buffer_time: new.buffer_time.unwrap_or(14),
            risk_level: new.risk_level.unwrap_or_else(|| "medium".to_string()),
            created_at: OffsetDateTime::now_utc(),
        };
        self.schedules.insert(schedule.id.clone(), schedule.clone());
        Ok(schedule)
    }

    pub fn schedules_for_project(&self, project_id: &str) -> Vec<ProjectSchedule> {
        self.schedules
            .iter()
            .filter(|s| s.project_id == project_id)
            .map(|s| s.clone())
            .collect()
    }

    pub fn schedule_inspection(&self, new: NewInspection) -> Result<Inspection, AppError> {
        if new.inspection_type.trim().is_empty() {
            return Err(AppError::validation("Inspection type is required"));
        }
        let days = new.scheduled_in_days.unwrap_or(1).max(0);
        let inspection = Inspection {
            id: Uuid::new_v4().to_string(),
            project_id: new.project_id,
            inspection_type: new.inspection_type.trim().to_string(),
            inspector: new.inspector,
            scheduled_for: OffsetDateTime::now_utc() + Duration::days(days),
            status: "scheduled".to_string(),
            overall_score: None,
        };
        self.inspections
            .insert(inspection.id.clone(), inspection.clone());
        Ok(inspection)
    }

    pub fn get_inspection(&self, id: &str) -> Option<Inspection> {
        self.inspections.get(id).map(|i| i.clone())
    }

    pub fn update_inspection_status(&self, id: &str, status: &str) -> Result<Inspection, AppError> {
        let mut inspection = self
            .inspections
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("inspection", id))?;
        inspection.status = status.to_string();
        Ok(inspection.clone())
    }
}
