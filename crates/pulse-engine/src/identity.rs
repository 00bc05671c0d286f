//! Distinct id, super-properties, and user properties, with their
//! persistence.

use pulse_store::{keys, ScopedStore, StoreScope};
use pulse_types::Properties;

/// Who events are attributed to and what is merged into them.
///
/// The three parts are persisted under separate keys, independently of
/// each other and of consent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
    distinct_id: Option<String>,
    super_properties: Properties,
    user_properties: Properties,
}

impl Identity {
    /// Restores persisted state. Malformed maps read as empty.
    pub fn load(store: &ScopedStore) -> Self {
        Self {
            distinct_id: store.get(StoreScope::Local, keys::DISTINCT_ID),
            super_properties: store
                .get_json(StoreScope::Local, keys::SUPER_PROPS)
                .unwrap_or_default(),
            user_properties: store
                .get_json(StoreScope::Local, keys::USER_PROPS)
                .unwrap_or_default(),
        }
    }

    pub fn distinct_id(&self) -> Option<&str> {
        self.distinct_id.as_deref()
    }

    pub fn super_properties(&self) -> &Properties {
        &self.super_properties
    }

    pub fn user_properties(&self) -> &Properties {
        &self.user_properties
    }

    /// Sets and persists the distinct id.
    pub fn identify(&mut self, store: &ScopedStore, distinct_id: String) {
        store.set(StoreScope::Local, keys::DISTINCT_ID, &distinct_id);
        self.distinct_id = Some(distinct_id);
    }

    /// Merges `props` into the super-properties; new keys win.
    pub fn merge_super_properties(&mut self, store: &ScopedStore, props: Properties) {
        self.super_properties.extend(props);
        store.set_json(StoreScope::Local, keys::SUPER_PROPS, &self.super_properties);
    }

    /// Merges `props` into the user properties; new keys win.
    pub fn merge_user_properties(&mut self, store: &ScopedStore, props: Properties) {
        self.user_properties.extend(props);
        store.set_json(StoreScope::Local, keys::USER_PROPS, &self.user_properties);
    }

    /// Clears all three parts, in memory and in storage.
    pub fn reset(&mut self, store: &ScopedStore) {
        *self = Self::default();
        store.remove(StoreScope::Local, keys::DISTINCT_ID);
        store.remove(StoreScope::Local, keys::SUPER_PROPS);
        store.remove(StoreScope::Local, keys::USER_PROPS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn super_properties_merge_rather_than_replace() {
        let store = ScopedStore::in_memory("t_");
        let mut identity = Identity::load(&store);

        identity.merge_super_properties(&store, props(json!({"a": 1})));
        identity.merge_super_properties(&store, props(json!({"b": 2})));

        assert_eq!(identity.super_properties()["a"], 1);
        assert_eq!(identity.super_properties()["b"], 2);
    }

    #[test]
    fn state_survives_reload() {
        let store = ScopedStore::in_memory("t_");
        let mut identity = Identity::load(&store);
        identity.identify(&store, "user-7".to_string());
        identity.merge_super_properties(&store, props(json!({"plan": "pro"})));
        identity.merge_user_properties(&store, props(json!({"email": "a@example.com"})));

        let restored = Identity::load(&store);

        assert_eq!(restored, identity);
    }

    #[test]
    fn reset_clears_everything() {
        let store = ScopedStore::in_memory("t_");
        let mut identity = Identity::load(&store);
        identity.identify(&store, "user-7".to_string());
        identity.merge_user_properties(&store, props(json!({"email": "a@example.com"})));

        identity.reset(&store);

        assert_eq!(identity, Identity::default());
        assert_eq!(Identity::load(&store), Identity::default());
    }

    #[test]
    fn malformed_maps_read_as_empty() {
        let store = ScopedStore::in_memory("t_");
        store.set(StoreScope::Local, keys::SUPER_PROPS, "[1, 2");
        store.set(StoreScope::Local, keys::USER_PROPS, "\"not a map\"");

        let identity = Identity::load(&store);

        assert!(identity.super_properties().is_empty());
        assert!(identity.user_properties().is_empty());
    }
}
