//! Tether kubehub – kube client, discovery checks, watcher wiring and the
//! object store seam shared by the controllers.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use futures::StreamExt;
use kube::{
    api::Api,
    discovery::{Discovery, Scope},
    runtime::{
        watcher::{self, Event},
        WatchStreamExt,
    },
    Client, Resource,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

pub mod kube_store;
pub mod memory;
pub mod store;

pub use kube_store::KubeStore;
pub use memory::{MemoryStore, Verb};
pub use store::{ObjectStore, StoreError, StoredObject};

/// Group, version and kind of a resource the controllers depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredResource {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl RequiredResource {
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self { group: K::group(&()).into_owned(), version: K::version(&()).into_owned(), kind: K::kind(&()).into_owned() }
    }

    pub fn gvk_key(&self) -> String { format!("{}/{}/{}", self.group, self.version, self.kind) }
}

pub async fn client() -> Result<Client> { Client::try_default().await.context("building kube client") }

/// Api handle for `K`, scoped to `namespace` when given.
pub fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Returns the entries of `required` the API server does not serve as
/// namespaced resources at the exact version.
pub async fn missing_resources(client: Client, required: &[RequiredResource]) -> Result<Vec<RequiredResource>> {
    let mut groups: Vec<&str> = required.iter().map(|r| r.group.as_str()).collect();
    groups.sort_unstable();
    groups.dedup();
    let discovery = Discovery::new(client).filter(&groups).run().await.context("running api discovery")?;
    let mut missing = Vec::new();
    for want in required {
        let served = discovery.groups().filter(|g| g.name() == want.group).any(|g| {
            g.versioned_resources(&want.version)
                .iter()
                .any(|(ar, caps)| ar.kind == want.kind && matches!(caps.scope, Scope::Namespaced))
        });
        if served {
            debug!(gvk = %want.gvk_key(), "discovery: resource served");
        } else {
            warn!(gvk = %want.gvk_key(), "discovery: resource not served");
            missing.push(want.clone());
        }
    }
    Ok(missing)
}

/// Runs list+watch over `api`, handing every event to `on_event`. Watch
/// errors are logged and retried with backoff; returns when the stream ends.
pub async fn start_watcher<K, F>(api: Api<K>, mut on_event: F) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + std::fmt::Debug + DeserializeOwned + Send + 'static,
    F: FnMut(Event<K>),
{
    let kind = K::kind(&()).into_owned();
    let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
    futures::pin_mut!(stream);
    info!(kind = %kind, "watcher started");
    while let Some(ev) = stream.next().await {
        match ev {
            Ok(ev) => {
                if let Event::Restarted(list) = &ev {
                    debug!(kind = %kind, count = list.len(), "watch restart");
                }
                on_event(ev);
            }
            Err(e) => warn!(kind = %kind, error = %e, "watch error"),
        }
    }
    warn!(kind = %kind, "watcher stream ended");
    Ok(())
}
