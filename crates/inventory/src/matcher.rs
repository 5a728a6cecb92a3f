//! Criteria evaluation for a single trigger element.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tether_core::shipwright::WhenObjectRef;

use crate::url;

static LABEL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("label name regex"));
static LABEL_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$").expect("label value regex"));
static DNS_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").expect("dns subdomain regex")
});

const NAME_MAX: usize = 63;
const PREFIX_MAX: usize = 253;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("invalid label key {0:?}")]
    Key(String),
    #[error("invalid label value {value:?} for key {key:?}")]
    Value { key: String, value: String },
}

fn valid_key(key: &str) -> bool {
    let (prefix, name) = match key.rsplit_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, key),
    };
    let prefix_ok = prefix.map(|p| !p.is_empty() && p.len() <= PREFIX_MAX && DNS_SUBDOMAIN.is_match(p)).unwrap_or(true);
    prefix_ok && name.len() <= NAME_MAX && LABEL_NAME.is_match(name)
}

fn valid_value(value: &str) -> bool { value.len() <= NAME_MAX && LABEL_VALUE.is_match(value) }

/// Validates `selector` as equality-based label requirements.
pub fn validate_selector(selector: &BTreeMap<String, String>) -> Result<(), SelectorError> {
    for (k, v) in selector {
        if !valid_key(k) {
            return Err(SelectorError::Key(k.clone()));
        }
        if !valid_value(v) {
            return Err(SelectorError::Value { key: k.clone(), value: v.clone() });
        }
    }
    Ok(())
}

/// Evaluates one object-reference criteria element against a runtime query:
/// status gate first (only when both sides carry statuses), then exact name
/// when the criteria names an object, otherwise a label-subset match that
/// requires both selectors to be non-empty.
pub fn matches_object_ref(criteria: &WhenObjectRef, query: &WhenObjectRef) -> Result<bool, SelectorError> {
    if !criteria.status.is_empty() {
        if let Some(current) = query.status.first() {
            if !criteria.status.contains(current) {
                return Ok(false);
            }
        }
    }
    if !criteria.name.is_empty() {
        return Ok(criteria.name == query.name);
    }
    if criteria.selector.is_empty() || query.selector.is_empty() {
        return Ok(false);
    }
    validate_selector(&criteria.selector)?;
    Ok(criteria.selector.iter().all(|(k, v)| query.selector.get(k) == Some(v)))
}

/// Repository must be equivalent, then the branch must be listed verbatim.
pub fn matches_git(repository_url: Option<&str>, branches: &[String], repo_url: &str, branch: &str) -> bool {
    match repository_url {
        Some(rule_url) if url::equivalent(rule_url, repo_url) => branches.iter().any(|b| b == branch),
        _ => false,
    }
}
