use dashmap::DashMap;

use crate::errors::AppError;
use crate::models::construction::{Availability, TeamMember, WorkloadEntry};

#[derive(Default)]
pub struct TeamService {
    members: DashMap<String, TeamMember>,
}

impl TeamService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_member(&self, member: TeamMember) {
        self.members.insert(member.id.clone(), member);
    }

    pub fn get_member(&self, id: &str) -> Option<TeamMember> {
        self.members.get(id).map(|m| m.clone())
    }

    pub fn list_members(&self) -> Vec<TeamMember> {
        let mut members: Vec<TeamMember> = self.members.iter().map(|m| m.clone()).collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members
    }

    /// Least-loaded available member. When `skills` is non-empty, members
    /// holding at least one of them are preferred.
    pub fn auto_assign(&self, skills: &[String]) -> Result<TeamMember, AppError> {
        let available: Vec<TeamMember> = self
            .list_members()
            .into_iter()
            .filter(|m| m.availability == Availability::Available)
            .collect();

        let skilled: Vec<&TeamMember> = available
            .iter()
            .filter(|m| skills.iter().any(|s| m.skills.contains(s)))
            .collect();
        let pool: Vec<&TeamMember> = if skilled.is_empty() {
            available.iter().collect()
        } else {
            skilled
        };

        pool.into_iter()
            .min_by(|a, b| a.workload_hours.total_cmp(&b.workload_hours))
            .cloned()
            .ok_or_else(|| AppError::Conflict("No available team member to assign".to_string()))
    }

    pub fn update_member_workload(
        &self,
        member_id: &str,
        entry: WorkloadEntry,
    ) -> Result<TeamMember, AppError> {
        let mut member = self
            .members
            .get_mut(member_id)
            .ok_or_else(|| AppError::not_found("team member", member_id))?;
        member.workload_hours += entry.estimated_hours;
        member.assignments.push(entry);
        Ok(member.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, hours: f64, skills: &[&str], availability: Availability) -> TeamMember {
        TeamMember {
            id: id.into(),
            name: id.to_uppercase(),
            role: "operative".into(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            availability,
            workload_hours: hours,
            assignments: vec![],
        }
    }

    #[test]
    fn picks_least_loaded_available_member() {
        let team = TeamService::new();
        team.upsert_member(member("a", 30.0, &[], Availability::Available));
        team.upsert_member(member("b", 10.0, &[], Availability::Available));
        team.upsert_member(member("c", 0.0, &[], Availability::Unavailable));

        assert_eq!(team.auto_assign(&[]).unwrap().id, "b");
    }

    #[test]
    fn prefers_matching_skills() {
        let team = TeamService::new();
        team.upsert_member(member("welder", 40.0, &["welding"], Availability::Available));
        team.upsert_member(member("idle", 0.0, &["painting"], Availability::Available));

        let chosen = team.auto_assign(&["welding".to_string()]).unwrap();
        assert_eq!(chosen.id, "welder");
    }

    #[test]
    fn nobody_available_is_conflict() {
        let team = TeamService::new();
        team.upsert_member(member("x", 0.0, &[], Availability::Busy));
        assert!(matches!(team.auto_assign(&[]), Err(AppError::Conflict(_))));
    }

    #[test]
    fn workload_accumulates() {
        let team = TeamService::new();
        team.upsert_member(member("a", 4.0, &[], Availability::Available));
        let updated = team
            .update_member_workload(
                "a",
                WorkloadEntry {
                    task_id: Some("task-1".into()),
                    estimated_hours: 8.0,
                    priority: Some("high".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.workload_hours, 12.0);
        assert_eq!(updated.assignments.len(), 1);
        assert!(matches!(
            team.update_member_workload(
                "ghost",
                WorkloadEntry {
                    task_id: None,
                    estimated_hours: 1.0,
                    priority: None
                }
            ),
            Err(AppError::NotFound(_))
        ));
    }
}
