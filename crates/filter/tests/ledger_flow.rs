use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tether_core::shipwright::{TriggerType, WhenObjectRef};
use tether_core::{ObjectKey, ANNOTATION_PIPELINERUN_NAME, ANNOTATION_TRIGGERED_BUILDS};
use tether_filter::ledger;
use tether_inventory::{extract_build_names, Inventory, TriggerCondition, TriggerRule, TriggerWhen};

fn inventory() -> Inventory {
    let inv = Inventory::new();
    inv.add(
        ObjectKey::new("default", "build"),
        TriggerRule {
            conditions: vec![TriggerCondition {
                trigger_type: TriggerType::Pipeline,
                when: TriggerWhen::ObjectRef(WhenObjectRef {
                    name: "pipeline".into(),
                    status: vec!["Succeeded".into()],
                    ..Default::default()
                }),
            }],
            ..Default::default()
        },
    );
    inv
}

fn query() -> WhenObjectRef {
    WhenObjectRef { name: "pipeline".into(), status: vec!["Succeeded".into()], selector: BTreeMap::new() }
}

/// Mirrors one reconciliation: returns how many builds would be issued and
/// applies the resulting annotations to `meta`.
fn reconcile_once(inv: &Inventory, meta: &mut ObjectMeta) -> usize {
    let q = query();
    let found = inv.search_by_object_ref(TriggerType::Pipeline, &q);
    if found.is_empty() {
        return 0;
    }
    let names = extract_build_names(&found);
    let prior = if ledger::name_matches_annotation(meta) { ledger::extract_entries(meta).unwrap_or_default() } else { Vec::new() };
    if ledger::contains(&prior, &names, &q) {
        return 0;
    }
    let encoded = ledger::append_and_encode(&prior, &names, &q).unwrap();
    let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
    annotations.insert(ANNOTATION_TRIGGERED_BUILDS.to_string(), encoded);
    annotations.insert(ANNOTATION_PIPELINERUN_NAME.to_string(), meta.name.clone().unwrap_or_default());
    names.len()
}

#[test]
fn repeated_reconciliation_issues_once() {
    let inv = inventory();
    let mut meta = ObjectMeta { name: Some("pipelinerun".into()), namespace: Some("default".into()), ..Default::default() };
    assert_eq!(inv.search_by_object_ref(TriggerType::Pipeline, &query()).len(), 1);
    assert_eq!(reconcile_once(&inv, &mut meta), 1);
    assert_eq!(reconcile_once(&inv, &mut meta), 0);
    assert_eq!(reconcile_once(&inv, &mut meta), 0);
    assert_eq!(ledger::extract_entries(&meta).unwrap().len(), 1);
}

#[test]
fn copied_annotations_do_not_suppress_a_rerun() {
    let inv = inventory();
    let mut original = ObjectMeta { name: Some("pipelinerun".into()), ..Default::default() };
    assert_eq!(reconcile_once(&inv, &mut original), 1);

    let mut rerun = ObjectMeta { name: Some("pipelinerun-r-xyz".into()), annotations: original.annotations.clone(), ..Default::default() };
    assert_eq!(reconcile_once(&inv, &mut rerun), 1);
    // the re-run ledger starts over instead of extending the copied one
    assert_eq!(ledger::extract_entries(&rerun).unwrap().len(), 1);
    assert_eq!(reconcile_once(&inv, &mut rerun), 0);
}

#[test]
fn corrupt_ledger_is_treated_as_empty() {
    let inv = inventory();
    let mut meta = ObjectMeta {
        name: Some("pipelinerun".into()),
        annotations: Some(
            [
                (ANNOTATION_PIPELINERUN_NAME.to_string(), "pipelinerun".to_string()),
                (ANNOTATION_TRIGGERED_BUILDS.to_string(), "{broken".to_string()),
            ]
            .into(),
        ),
        ..Default::default()
    };
    assert!(ledger::extract_entries(&meta).is_err());
    assert_eq!(reconcile_once(&inv, &mut meta), 1);
    assert_eq!(reconcile_once(&inv, &mut meta), 0);
}
