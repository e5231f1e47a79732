use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::construction::{Kpi, KpiPoint, KpiStatus, Recommendation, Trend};
use crate::models::notification::Priority;

pub const QUALITY_SCORE_KPI: &str = "kpi-quality-score";
const KPI_HISTORY_LIMIT: usize = 30;

/// KPIs and generated recommendations.
pub struct InsightsService {
    kpis: DashMap<String, Kpi>,
    recommendations: DashMap<String, Recommendation>,
}

impl Default for InsightsService {
    fn default() -> Self {
        Self::new()
    }
}

impl InsightsService {
    /// Registers the KPI definitions the event handlers update.
    pub fn new() -> Self {
        let service = InsightsService {
            kpis: DashMap::new(),
            recommendations: DashMap::new(),
        };
        service.upsert_kpi(Kpi {
            id: QUALITY_SCORE_KPI.to_string(),
            name: "Quality Score".to_string(),
            value: 0.0,
            target: 90.0,
            unit: "%".to_string(),
            status: KpiStatus::Critical,
            trend: Trend::Stable,
            trend_percentage: 0.0,
            history: Vec::new(),
            updated_at: OffsetDateTime::now_utc(),
        });
        service
    }

    pub fn upsert_kpi(&self, kpi: Kpi) {
        self.kpis.insert(kpi.id.clone(), kpi);
    }

    pub fn get_kpi(&self, id: &str) -> Option<Kpi> {
        self.kpis.get(id).map(|k| k.clone())
    }

    pub fn update_kpi(&self, id: &str, value: f64) -> Result<Kpi, AppError> {
        let mut kpi = self
            .kpis
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("kpi", id))?;
        let previous = kpi.value;
        let now = OffsetDateTime::now_utc();

        kpi.value = value;
        kpi.updated_at = now;
        kpi.trend = if value > previous {
            Trend::Up
        } else if value < previous {
            Trend::Down
        } else {
            Trend::Stable
        };
        kpi.trend_percentage = if previous == 0.0 || value == previous {
            0.0
        } else {
            ((value - previous).abs() / previous.abs()) * 100.0
        };
        kpi.status = status_for(value, kpi.target);
        kpi.history.push(KpiPoint {
            date: now.date().to_string(),
            value,
        });
        if kpi.history.len() > KPI_HISTORY_LIMIT {
            let excess = kpi.history.len() - KPI_HISTORY_LIMIT;
            kpi.history.drain(..excess);
        }
        Ok(kpi.clone())
    }

    pub fn generate_recommendations(
        &self,
        project_id: Option<&str>,
        kind: &str,
    ) -> Vec<Recommendation> {
        let (title, description) = match kind {
            "quality_improvement" => (
                "Improve inspection outcomes",
                "Recent inspection scores fell below 80. Schedule a quality walkthrough and review rework items with the site team.",
            ),
            "schedule_optimization" => (
                "Recover schedule float",
                "Critical path activities are slipping. Consider resequencing non-critical work.",
            ),
            _ => ("Review project health", "Automated review suggested by recent activity."),
        };
        let recommendation = Recommendation {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.map(str::to_string),
            kind: kind.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            priority: Priority::High,
            created_at: OffsetDateTime::now_utc(),
        };
        info!(kind, project_id = ?project_id, "recommendation generated");
        self.recommendations
            .insert(recommendation.id.clone(), recommendation.clone());

        self.recommendations
            .iter()
            .filter(|r| r.kind == kind)
            .filter(|r| project_id.is_none() || r.project_id.as_deref() == project_id)
            .map(|r| r.clone())
            .collect()
    }

    pub fn list_recommendations(&self) -> Vec<Recommendation> {
        let mut all: Vec<Recommendation> = self.recommendations.iter().map(|r| r.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }
}

fn status_for(value: f64, target: f64) -> KpiStatus {
    if target <= 0.0 {
        return KpiStatus::Excellent;
    }
    let pct = value / target * 100.0;
    if pct >= 100.0 {
        KpiStatus::Excellent
    } else if pct >= 90.0 {
        KpiStatus::Good
    } else if pct >= 75.0 {
        KpiStatus::Warning
    } else {
        KpiStatus::Critical
    }
}
