//! Exposes the registry to application code as a virtual module:
//!
//! ```js
//! import bundles from "virtual:locale-bundles";
//! fetch(bundles["messages.en"]).then((r) => r.json());
//! ```

use crate::state::SharedState;
use std::collections::BTreeMap;

pub const VIRTUAL_MODULE_ID: &str = "virtual:locale-bundles";
/// Id handed back from `resolve_id`; the NUL prefix keeps other resolvers away from it.
pub const RESOLVED_VIRTUAL_MODULE_ID: &str = "\0virtual:locale-bundles";
/// URL the dev server serves the module at.
pub const VIRTUAL_MODULE_URL: &str = "/@id/virtual:locale-bundles";

#[derive(Debug, Clone)]
pub struct VirtualModuleResolver {
    state: SharedState,
}

impl VirtualModuleResolver {
    pub fn new(state: SharedState) -> Self {
        VirtualModuleResolver { state }
    }

    pub fn resolve_id(&self, id: &str) -> Option<&'static str> {
        (id == VIRTUAL_MODULE_ID).then_some(RESOLVED_VIRTUAL_MODULE_ID)
    }

    /// Module source for the resolved id; `None` for every other id.
    pub fn load(&self, id: &str) -> Option<String> {
        if id != RESOLVED_VIRTUAL_MODULE_ID {
            return None;
        }
        let table = serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string());
        Some(format!("export default {table};\n"))
    }

    /// `identifier.language → request path`, as of the last completed build.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.state.registry().snapshot()
    }
}
