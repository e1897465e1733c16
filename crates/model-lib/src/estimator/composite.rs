use super::{PowerEstimator, PowerRequest, PowerResponse, PowerValues};
use std::collections::BTreeMap;
use std::fmt;

/// Per-component children; any failing child fails the whole estimate
pub struct CompositeEstimator {
    model_name: String,
    children: BTreeMap<String, Box<dyn PowerEstimator>>,
}

impl CompositeEstimator {
    pub fn new(model_name: impl Into<String>, children: BTreeMap<String, Box<dyn PowerEstimator>>) -> Self {
        Self {
            model_name: model_name.into(),
            children,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn components(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }
}

impl PowerEstimator for CompositeEstimator {
    fn get_power(&self, request: &PowerRequest) -> PowerResponse {
        let mut powers = BTreeMap::new();
        for (component, child) in &self.children {
            let response = child.get_power(request);
            if !response.is_ok() {
                return PowerResponse::failed(response.msg);
            }
            match response.powers {
                PowerValues::Scalar(value) => {
                    powers.insert(component.clone(), vec![value]);
                }
                PowerValues::Series(values) => {
                    powers.insert(component.clone(), values);
                }
                // nested breakdowns are flattened as <component>/<sub component>
                PowerValues::Components(nested) => {
                    for (sub, values) in nested {
                        powers.insert(format!("{}/{}", component, sub), values);
                    }
                }
            }
        }
        PowerResponse::ok(PowerValues::Components(powers))
    }
}

impl fmt::Debug for CompositeEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeEstimator")
            .field("model_name", &self.model_name)
            .field("components", &self.components())
            .finish()
    }
}
