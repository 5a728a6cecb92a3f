//! Tether inventory: in-RAM index of Build trigger rules.
//! Linear scans over a single map; cardinality is bounded by the number of
//! Builds in scope, not by event volume.

#![forbid(unsafe_code)]

pub mod matcher;
pub mod url;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::FxHashMap;
use serde::Serialize;
use tether_core::shipwright::{Build, BuildTriggerWhen, TriggerType, WhenObjectRef};
use tether_core::ObjectKey;
use tracing::{debug, info, warn};

pub use matcher::SelectorError;
pub use url::UrlError;

/// Payload of one trigger element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerWhen {
    ObjectRef(WhenObjectRef),
    Git { branches: Vec<String> },
    Image { names: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerCondition {
    pub trigger_type: TriggerType,
    pub when: TriggerWhen,
}

impl TriggerCondition {
    /// Elements without any payload carry no criteria and are dropped.
    fn from_when(w: &BuildTriggerWhen) -> Option<Self> {
        let when = if let Some(o) = &w.object_ref {
            TriggerWhen::ObjectRef(o.clone())
        } else if let Some(g) = &w.github {
            TriggerWhen::Git { branches: g.branches.clone() }
        } else if let Some(i) = &w.image {
            TriggerWhen::Image { names: i.names.clone() }
        } else {
            return None;
        };
        Some(Self { trigger_type: w.type_, when })
    }
}

/// Trigger rules of one Build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerRule {
    pub repository_url: Option<String>,
    pub secret_ref: Option<String>,
    pub conditions: Vec<TriggerCondition>,
}

impl TriggerRule {
    /// A Build without a trigger section yields an empty rule.
    pub fn from_build(build: &Build) -> Self {
        let trigger = build.spec.trigger.as_ref();
        Self {
            repository_url: build.spec.source.url.clone(),
            secret_ref: trigger.and_then(|t| t.secret_ref.as_ref()).map(|s| s.name.clone()),
            conditions: trigger.map(|t| t.when.iter().filter_map(TriggerCondition::from_when).collect()).unwrap_or_default(),
        }
    }

    fn of_type(&self, trigger_type: TriggerType) -> impl Iterator<Item = &TriggerWhen> {
        self.conditions.iter().filter(move |c| c.trigger_type == trigger_type).map(|c| &c.when)
    }

    /// True when any object-reference element of `trigger_type` matches.
    /// Elements with an invalid selector are skipped.
    pub fn matches_object_ref(&self, trigger_type: TriggerType, query: &WhenObjectRef) -> bool {
        self.of_type(trigger_type).any(|w| match w {
            TriggerWhen::ObjectRef(criteria) => match matcher::matches_object_ref(criteria, query) {
                Ok(hit) => hit,
                Err(e) => {
                    warn!(error = %e, selector = ?criteria.selector, "inventory: skipping trigger with invalid selector");
                    false
                }
            },
            _ => false,
        })
    }

    /// True when the repository is equivalent and any git element of
    /// `trigger_type` lists `branch`.
    pub fn matches_git(&self, trigger_type: TriggerType, repo_url: &str, branch: &str) -> bool {
        self.of_type(trigger_type).any(|w| match w {
            TriggerWhen::Git { branches } => matcher::matches_git(self.repository_url.as_deref(), branches, repo_url, branch),
            _ => false,
        })
    }
}

/// A Build matching a query, plus its webhook secret when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub build: ObjectKey,
    pub secret: Option<ObjectKey>,
}

impl SearchResult {
    pub fn has_secret(&self) -> bool { self.secret.is_some() }
}

pub fn extract_build_names(results: &[SearchResult]) -> Vec<String> {
    results.iter().map(|r| r.build.name.clone()).collect()
}

/// Index of trigger rules keyed by Build identity.
#[derive(Debug, Default)]
pub struct Inventory {
    cache: RwLock<FxHashMap<ObjectKey, TriggerRule>>,
}

impl Inventory {
    pub fn new() -> Self { Self::default() }

    fn read(&self) -> RwLockReadGuard<'_, FxHashMap<ObjectKey, TriggerRule>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, FxHashMap<ObjectKey, TriggerRule>> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize { self.read().len() }
    pub fn is_empty(&self) -> bool { self.read().is_empty() }
    pub fn contains(&self, key: &ObjectKey) -> bool { self.read().contains_key(key) }

    /// Upserts the rule for `key`.
    pub fn add(&self, key: ObjectKey, rule: TriggerRule) {
        debug!(build = %key, conditions = rule.conditions.len(), "inventory: storing build");
        let mut cache = self.write();
        cache.insert(key, rule);
        metrics::gauge!("inventory_builds", cache.len() as f64);
    }

    /// Indexes a Build; objects without namespace or name are ignored.
    pub fn add_build(&self, build: &Build) {
        match ObjectKey::from_meta(&build.metadata) {
            Some(key) => self.add(key, TriggerRule::from_build(build)),
            None => warn!(name = ?build.metadata.name, "inventory: build without namespace/name, skipping"),
        }
    }

    /// Evicts `key`; absent keys are a no-op.
    pub fn remove(&self, key: &ObjectKey) {
        let mut cache = self.write();
        if cache.remove(key).is_none() {
            debug!(build = %key, "inventory: entry not found, skipping removal");
            return;
        }
        info!(build = %key, "inventory: removed build");
        metrics::gauge!("inventory_builds", cache.len() as f64);
    }

    /// Swaps the whole index for `entries`, used after a watch restart.
    pub fn replace(&self, entries: impl IntoIterator<Item = (ObjectKey, TriggerRule)>) {
        let fresh: FxHashMap<ObjectKey, TriggerRule> = entries.into_iter().collect();
        let mut cache = self.write();
        info!(before = cache.len(), after = fresh.len(), "inventory: rebuilt");
        *cache = fresh;
        metrics::gauge!("inventory_builds", cache.len() as f64);
    }

    fn search(&self, mode: &'static str, matches: impl Fn(&TriggerRule) -> bool) -> Vec<SearchResult> {
        let cache = self.read();
        let mut found: Vec<SearchResult> = cache
            .iter()
            .filter(|(_, rule)| matches(rule))
            .map(|(key, rule)| SearchResult {
                build: key.clone(),
                secret: rule.secret_ref.as_ref().map(|s| ObjectKey::new(key.namespace.clone(), s.clone())),
            })
            .collect();
        drop(cache);
        // map iteration order is arbitrary; keep results stable
        found.sort_by(|a, b| a.build.cmp(&b.build));
        metrics::counter!("inventory_search_total", 1u64, "mode" => mode);
        debug!(mode, amount = found.len(), "inventory: search results");
        found
    }

    /// Builds with an element of `trigger_type` matching the object query,
    /// at most once per Build.
    pub fn search_by_object_ref(&self, trigger_type: TriggerType, query: &WhenObjectRef) -> Vec<SearchResult> {
        self.search("object_ref", |rule| rule.matches_object_ref(trigger_type, query))
    }

    /// Builds whose repository is equivalent to `repo_url` and that list
    /// `branch` in a git element of `trigger_type`.
    pub fn search_by_git(&self, trigger_type: TriggerType, repo_url: &str, branch: &str) -> Vec<SearchResult> {
        self.search("git", |rule| rule.matches_git(trigger_type, repo_url, branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_rule(name: &str, status: &[&str]) -> TriggerRule {
        TriggerRule {
            conditions: vec![TriggerCondition {
                trigger_type: TriggerType::Pipeline,
                when: TriggerWhen::ObjectRef(WhenObjectRef {
                    name: name.into(),
                    status: status.iter().map(|s| s.to_string()).collect(),
                    ..Default::default()
                }),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn add_replaces_and_remove_is_idempotent() {
        let inv = Inventory::new();
        let key = ObjectKey::new("default", "build");
        inv.add(key.clone(), pipeline_rule("a", &[]));
        inv.add(key.clone(), pipeline_rule("b", &[]));
        assert_eq!(inv.len(), 1);
        let q = WhenObjectRef { name: "b".into(), ..Default::default() };
        assert_eq!(inv.search_by_object_ref(TriggerType::Pipeline, &q).len(), 1);
        inv.remove(&key);
        inv.remove(&key);
        assert!(inv.is_empty());
    }

    #[test]
    fn elements_of_other_types_are_ignored() {
        let inv = Inventory::new();
        inv.add(ObjectKey::new("default", "build"), pipeline_rule("p", &[]));
        let q = WhenObjectRef { name: "p".into(), ..Default::default() };
        assert!(inv.search_by_object_ref(TriggerType::GitHub, &q).is_empty());
    }

    #[test]
    fn one_result_per_build_even_with_several_matching_elements() {
        let inv = Inventory::new();
        let mut rule = pipeline_rule("p", &["Succeeded"]);
        rule.conditions.extend(pipeline_rule("p", &[]).conditions);
        inv.add(ObjectKey::new("default", "build"), rule);
        let q = WhenObjectRef { name: "p".into(), status: vec!["Succeeded".into()], ..Default::default() };
        assert_eq!(inv.search_by_object_ref(TriggerType::Pipeline, &q).len(), 1);
    }

    #[test]
    fn secret_is_resolved_in_build_namespace() {
        let inv = Inventory::new();
        let mut rule = pipeline_rule("p", &[]);
        rule.secret_ref = Some("webhook".into());
        inv.add(ObjectKey::new("ns1", "with-secret"), rule);
        inv.add(ObjectKey::new("ns1", "without-secret"), pipeline_rule("p", &[]));
        let q = WhenObjectRef { name: "p".into(), ..Default::default() };
        let found = inv.search_by_object_ref(TriggerType::Pipeline, &q);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].secret, Some(ObjectKey::new("ns1", "webhook")));
        assert!(!found[1].has_secret());
        assert_eq!(extract_build_names(&found), vec!["with-secret", "without-secret"]);
    }

    #[test]
    fn replace_drops_missing_entries() {
        let inv = Inventory::new();
        inv.add(ObjectKey::new("default", "stale"), TriggerRule::default());
        inv.replace([(ObjectKey::new("default", "fresh"), TriggerRule::default())]);
        assert!(!inv.contains(&ObjectKey::new("default", "stale")));
        assert!(inv.contains(&ObjectKey::new("default", "fresh")));
    }
}
