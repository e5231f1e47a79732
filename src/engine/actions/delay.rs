use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WaitFor {
    #[serde(default)]
    pub seconds: Option<u64>,
    #[serde(default)]
    pub minutes: Option<u64>,
    #[serde(default)]
    pub hours: Option<u64>,
    #[serde(default)]
    pub days: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DelayConfig {
    /// `duration`, `datetime`, or absent for whichever is longer.
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub wait_for: Option<WaitFor>,
    /// Shorthand for `waitFor.seconds`.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub wait_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub jitter_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayPlan {
    pub base_delay: Duration,
    pub jitter_applied: Duration,
    pub total_delay: Duration,
    pub resume_at: DateTime<Utc>,
}

pub fn parse_delay_config(value: &Value) -> Result<DelayConfig, AppError> {
    serde_json::from_value::<DelayConfig>(value.clone())
        .map_err(|e| AppError::validation(format!("Invalid delay configuration: {e}")))
}

/// A zero total delay is a valid plan; the step simply continues.
pub fn compute_delay_plan(
    config: &DelayConfig,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<DelayPlan, AppError> {
    let wait_for = match (&config.wait_for, config.duration) {
        (Some(w), _) => Some(wait_for_duration(w)?),
        (None, Some(secs)) => Some(Duration::from_secs(secs)),
        (None, None) => None,
    };
    let until = config
        .wait_until
        .map(|target| (target - now).to_std().unwrap_or(Duration::ZERO));

    let base_delay = match config.mode.as_deref() {
        Some("duration") => wait_for
            .filter(|d| !d.is_zero())
            .ok_or_else(|| AppError::validation("Configure a duration for the delay step"))?,
        Some("datetime") => until
            .ok_or_else(|| AppError::validation("Configure a target datetime for the delay step"))?,
        _ => match (wait_for, until) {
            (None, None) => {
                return Err(AppError::validation(
                    "Configure either a wait duration or an absolute datetime",
                ))
            }
            (a, b) => a.unwrap_or(Duration::ZERO).max(b.unwrap_or(Duration::ZERO)),
        },
    };

    let jitter_range = config.jitter_seconds.unwrap_or(0);
    let jitter_applied = if jitter_range == 0 || base_delay.is_zero() {
        Duration::ZERO
    } else {
        Duration::from_secs(rng.random_range(0..=jitter_range))
    };
    let total_delay = base_delay
        .checked_add(jitter_applied)
        .ok_or_else(|| AppError::validation("Delay duration is too large"))?;
    let resume_at = ChronoDuration::from_std(total_delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now);

    Ok(DelayPlan {
        base_delay,
        jitter_applied,
        total_delay,
        resume_at,
    })
}

fn wait_for_duration(config: &WaitFor) -> Result<Duration, AppError> {
    let parts = [
        (config.seconds, 1u64),
        (config.minutes, 60),
        (config.hours, 3_600),
        (config.days, 86_400),
    ];
    let mut total: u64 = 0;
    for (value, unit) in parts {
        if let Some(v) = value {
            total = v
                .checked_mul(unit)
                .and_then(|secs| total.checked_add(secs))
                .ok_or_else(|| AppError::validation("Delay duration is too large"))?;
        }
    }
    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    #[test]
    fn wait_for_sums_components() {
        let config = parse_delay_config(&json!({
            "waitFor": {"seconds": 5, "minutes": 30, "hours": 2, "days": 1}
        }))
        .unwrap();
        let plan = compute_delay_plan(&config, Utc::now(), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(plan.base_delay.as_secs(), 86_400 + 2 * 3_600 + 1_800 + 5);
        assert_eq!(plan.total_delay, plan.base_delay);
    }

    #[test]
    fn duration_shorthand_and_jitter() {
        let config = parse_delay_config(&json!({"duration": 60, "jitterSeconds": 5})).unwrap();
        let plan = compute_delay_plan(&config, Utc::now(), &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(plan.base_delay.as_secs(), 60);
        assert!(plan.jitter_applied.as_secs() <= 5);
        assert_eq!(
            plan.total_delay.as_secs(),
            plan.base_delay.as_secs() + plan.jitter_applied.as_secs()
        );
    }

    #[test]
    fn past_datetime_continues_immediately() {
        let now = Utc::now();
        let config = DelayConfig {
            mode: Some("datetime".into()),
            wait_until: Some(now - ChronoDuration::minutes(5)),
            ..Default::default()
        };
        let plan = compute_delay_plan(&config, now, &mut StdRng::seed_from_u64(2)).unwrap();
        assert!(plan.total_delay.is_zero());
        assert_eq!(plan.resume_at, now);
    }

    #[test]
    fn missing_wait_is_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            compute_delay_plan(&DelayConfig::default(), Utc::now(), &mut rng),
            Err(AppError::Validation(_))
        ));
        let zero = DelayConfig {
            mode: Some("duration".into()),
            duration: Some(0),
            ..Default::default()
        };
        assert!(compute_delay_plan(&zero, Utc::now(), &mut rng).is_err());
    }
}
