use serde::{Deserialize, Serialize};

use crate::domain::services::placeholders;

/// Channel-provider approved template. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedTemplate {
    pub agent_id: i64,
    pub name: String,
    pub language: String,
    pub category: String,
    /// Body text with numbered placeholders `{{1}}`, `{{2}}`, ...
    pub body: String,
}

impl ApprovedTemplate {
    pub fn placeholder_count(&self) -> usize {
        placeholders::numbered_count(&self.body)
    }
}
