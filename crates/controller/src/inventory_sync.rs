//! Keeps the trigger inventory in step with the Build population.

use std::sync::Arc;

use kube::runtime::watcher::Event;
use kube::Client;
use tether_core::{Build, ObjectKey};
use tether_inventory::{Inventory, TriggerRule};
use tracing::{debug, info};

/// Indexes `build`, or evicts it once it is marked for deletion.
pub fn observe_build(inventory: &Inventory, build: &Build) {
    let Some(key) = ObjectKey::from_meta(&build.metadata) else {
        debug!(name = ?build.metadata.name, "inventory-sync: build without namespace/name");
        return;
    };
    if build.is_deleting() {
        info!(build = %key, "inventory-sync: build marked for deletion");
        inventory.remove(&key);
    } else {
        debug!(build = %key, "inventory-sync: build observed");
        inventory.add_build(build);
    }
}

pub fn apply_event(inventory: &Inventory, event: Event<Build>) {
    match event {
        Event::Applied(build) => observe_build(inventory, &build),
        Event::Deleted(build) => {
            if let Some(key) = ObjectKey::from_meta(&build.metadata) {
                inventory.remove(&key);
            }
        }
        Event::Restarted(builds) => {
            let live = builds
                .iter()
                .filter(|b| !b.is_deleting())
                .filter_map(|b| ObjectKey::from_meta(&b.metadata).map(|key| (key, TriggerRule::from_build(b))));
            inventory.replace(live);
        }
    }
}

/// Watches Builds until the stream fails; the caller decides on restarts.
pub async fn run(client: Client, namespace: Option<String>, inventory: Arc<Inventory>) -> anyhow::Result<()> {
    let api = tether_kubehub::scoped_api::<Build>(client, namespace.as_deref());
    tether_kubehub::start_watcher(api, |event| apply_event(&inventory, event)).await
}
