//! PipelineRun status parsing and the inventory query derived from it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tether_core::shipwright::WhenObjectRef;
use tether_core::{duration, PipelineRun, SHIPWRIGHT_API_VERSION};
use tracing::warn;

use crate::{labels, FilterError};

pub const STATUS_SUCCEEDED: &str = "Succeeded";
pub const STATUS_FAILED: &str = "Failed";
pub const STATUS_CANCELLED: &str = "Cancelled";
pub const STATUS_TIMED_OUT: &str = "TimedOut";
pub const STATUS_STARTED: &str = "Started";

/// PipelineRuns running Shipwright custom tasks belong to the custom task
/// controller.
pub fn references_shipwright(pr: &PipelineRun) -> bool {
    pr.status
        .as_ref()
        .and_then(|s| s.pipeline_spec.as_ref())
        .map(|spec| spec.tasks.iter().filter_map(|t| t.task_ref.as_ref()).any(|r| r.api_version == SHIPWRIGHT_API_VERSION))
        .unwrap_or(false)
}

/// Effective timeout: the object's own setting, else `default`. Zero
/// disables the timeout; an unparseable value falls back to `default`.
pub fn timeout(pr: &PipelineRun, default: Duration) -> Duration {
    match pr.timeout_spec() {
        None => default,
        Some(raw) => duration::parse(raw).unwrap_or_else(|e| {
            warn!(error = %e, "pipelinerun: ignoring unparseable timeout");
            default
        }),
    }
}

pub fn has_timed_out(pr: &PipelineRun, now: DateTime<Utc>, default: Duration) -> bool {
    let limit = timeout(pr, default);
    if limit.is_zero() {
        return false;
    }
    let Some(start) = pr.start_time() else { return false };
    match (now - start.0).to_std() {
        Ok(elapsed) => elapsed > limit,
        Err(_) => false,
    }
}

/// Current status: `Succeeded`/`Failed` once done, then `Cancelled`,
/// `TimedOut` and `Started`. A PipelineRun in none of these states is an
/// error.
pub fn parse_status(pr: &PipelineRun, now: DateTime<Utc>, default_timeout: Duration) -> Result<&'static str, FilterError> {
    if pr.is_done() {
        return Ok(if pr.is_succeeded() { STATUS_SUCCEEDED } else { STATUS_FAILED });
    }
    if pr.is_cancelled() {
        return Ok(STATUS_CANCELLED);
    }
    if has_timed_out(pr, now, default_timeout) {
        return Ok(STATUS_TIMED_OUT);
    }
    if pr.start_time().is_some() {
        return Ok(STATUS_STARTED);
    }
    let key = format!(
        "{}/{}",
        pr.metadata.namespace.as_deref().unwrap_or_default(),
        pr.metadata.name.as_deref().unwrap_or_default()
    );
    Err(FilterError::UnknownStatus(key))
}

/// Inventory query for a PipelineRun: referenced pipeline name, current
/// status and the object's labels minus the ones written here.
pub fn to_object_ref(pr: &PipelineRun, now: DateTime<Utc>, default_timeout: Duration) -> Result<WhenObjectRef, FilterError> {
    let status = parse_status(pr, now, default_timeout)?;
    Ok(WhenObjectRef {
        name: pr.spec.pipeline_ref.as_ref().map(|r| r.name.clone()).unwrap_or_default(),
        status: vec![status.to_string()],
        selector: labels::without_owned(&pr.metadata),
    })
}
