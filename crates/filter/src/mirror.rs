//! Reflection of BuildRun status onto the owning Run or CustomRun.

use chrono::{DateTime, Utc};
use tether_core::condition::{self, Condition};
use tether_core::tekton::RunStatus;
use tether_core::BuildRun;
use tracing::debug;

/// Copies the BuildRun completion time and conditions onto `status`.
/// Failed conditions are marked with error severity. A run left without any
/// condition gets `Succeeded=Unknown`.
pub fn reflect_build_run(status: &mut RunStatus, br: &BuildRun, now: DateTime<Utc>) {
    if let Some(done) = br.status.as_ref().and_then(|s| s.completion_time.clone()) {
        status.completion_time = Some(done);
    }
    for c in br.conditions() {
        debug!(
            condition_type = %c.type_,
            condition_status = %c.status,
            reason = ?c.reason,
            "mirror: reflecting buildrun condition"
        );
        let severity = if c.is_false() { condition::SEVERITY_ERROR } else { condition::SEVERITY_INFO };
        condition::set(
            &mut status.conditions,
            Condition {
                type_: c.type_.clone(),
                status: c.status.clone(),
                severity: Some(severity.to_string()),
                last_transition_time: c.last_transition_time.clone(),
                reason: c.reason.clone(),
                message: c.message.clone(),
            },
        );
    }
    if status.conditions.is_empty() {
        status.conditions.push(Condition::new(condition::SUCCEEDED, condition::STATUS_UNKNOWN, now));
    }
}

/// Merge patch body for the status fields owned by the mirror.
pub fn status_patch(status: &RunStatus) -> serde_json::Value {
    let mut body = serde_json::json!({ "conditions": status.conditions });
    if let Some(done) = &status.completion_time {
        body["completionTime"] = serde_json::json!(done);
    }
    serde_json::json!({ "status": body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use tether_core::shipwright::BuildRunStatus;

    fn at(h: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2023, 5, 1, h, 0, 0).unwrap() }

    #[test]
    fn seeds_unknown_when_buildrun_has_no_conditions() {
        let mut status = RunStatus::default();
        reflect_build_run(&mut status, &BuildRun::default(), at(1));
        assert_eq!(status.conditions.len(), 1);
        assert!(status.conditions[0].is_unknown());
        assert_eq!(status.conditions[0].type_, condition::SUCCEEDED);
    }

    #[test]
    fn mirrors_conditions_and_completion_time() {
        let mut failed = Condition::new(condition::SUCCEEDED, condition::STATUS_FALSE, at(2));
        failed.reason = Some("BuildRunTimeout".into());
        let br = BuildRun {
            status: Some(BuildRunStatus { conditions: vec![failed], completion_time: Some(Time(at(3))), ..Default::default() }),
            ..Default::default()
        };
        let mut status = RunStatus { conditions: vec![Condition::new(condition::SUCCEEDED, condition::STATUS_UNKNOWN, at(1))], ..Default::default() };
        reflect_build_run(&mut status, &br, at(4));

        assert_eq!(status.completion_time, Some(Time(at(3))));
        assert_eq!(status.conditions.len(), 1);
        let c = &status.conditions[0];
        assert!(c.is_false());
        assert_eq!(c.severity.as_deref(), Some(condition::SEVERITY_ERROR));
        assert_eq!(c.reason.as_deref(), Some("BuildRunTimeout"));

        let patch = status_patch(&status);
        assert_eq!(patch["status"]["conditions"][0]["status"], "False");
        assert_eq!(patch["status"]["completionTime"], "2023-05-01T03:00:00Z");
    }
}
