//! Tekton params to Shipwright `paramValues`.

use tether_core::shipwright::{ParamValue, SingleValue};
use tether_core::tekton::{Param, ParamInput};

/// Arrays become `values`; strings become `value`. Object params have no
/// Shipwright counterpart and are passed as an empty string.
pub fn to_param_values(params: &[Param]) -> Vec<ParamValue> {
    params
        .iter()
        .map(|p| match &p.value {
            ParamInput::Array(items) => ParamValue {
                name: p.name.clone(),
                value: None,
                values: Some(items.iter().map(|v| SingleValue { value: Some(v.clone()) }).collect()),
            },
            ParamInput::String(s) => ParamValue { name: p.name.clone(), value: Some(s.clone()), values: None },
            ParamInput::Object(_) => ParamValue { name: p.name.clone(), value: Some(String::new()), values: None },
        })
        .collect()
}
