use std::collections::HashMap;

/// Action name -> resource type, supplied at construction (spec's
/// `{RECORD: "RECORD", AFFECTED_ENTITY: "ENTITY", ...}`). Resource types are
/// looked up by action when registering a `TaskHandler`; actions are looked
/// up by resource type when [`DefaultScheduleTasks`](crate::DefaultScheduleTasks)
/// decides what to schedule for a derived key.
#[derive(Debug, Clone)]
pub struct ActionResourceMap {
    by_action: HashMap<String, String>,
}

impl ActionResourceMap {
    pub fn new() -> Self {
        Self { by_action: HashMap::new() }
    }

    pub fn with(mut self, action: impl Into<String>, resource_type: impl Into<String>) -> Self {
        self.by_action.insert(action.into(), resource_type.into());
        self
    }

    pub fn resource_type_for(&self, action: &str) -> Option<&str> {
        self.by_action.get(action).map(String::as_str)
    }

    pub fn action_for_resource_type(&self, resource_type: &str) -> Option<&str> {
        self.by_action.iter().find(|(_, v)| v.as_str() == resource_type).map(|(k, _)| k.as_str())
    }

    /// The Senzing-style default: `RECORD` tasks act on the record key,
    /// `AFFECTED_ENTITY` tasks act on each affected entity's key.
    pub fn default_senzing() -> Self {
        Self::new().with("RECORD", "RECORD").with("AFFECTED_ENTITY", "ENTITY")
    }
}

impl Default for ActionResourceMap {
    fn default() -> Self {
        Self::default_senzing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_round_trips_both_directions() {
        let map = ActionResourceMap::default();
        assert_eq!(map.resource_type_for("RECORD"), Some("RECORD"));
        assert_eq!(map.resource_type_for("AFFECTED_ENTITY"), Some("ENTITY"));
        assert_eq!(map.action_for_resource_type("ENTITY"), Some("AFFECTED_ENTITY"));
    }

    #[test]
    fn unknown_action_or_resource_type_is_none() {
        let map = ActionResourceMap::default();
        assert_eq!(map.resource_type_for("NOPE"), None);
        assert_eq!(map.action_for_resource_type("NOPE"), None);
    }
}
