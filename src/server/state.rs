use std::collections::HashMap;

use crate::common::data::{RecordedInteraction, ResponseRecord};
use crate::server::keys::{KeyError, KeyProviderRegistry, KeySource};

/// The responses recorded for one identity, in recording order, together
/// with the cursor of the next response to serve.
///
/// Invariant: `cursor <= responses.len()`; the queue is removed from the
/// store the moment the cursor reaches the end.
#[derive(Debug)]
pub struct ResponseQueue {
    responses: Vec<ResponseRecord>,
    cursor: usize,
}

impl ResponseQueue {
    fn new() -> Self {
        ResponseQueue {
            responses: Vec::new(),
            cursor: 0,
        }
    }
}

/// Recorded interactions grouped by identity.
///
/// Populated once at startup, then mutated only from the request handling
/// path: peek, advance, retire on exhaustion. The server keeps the store
/// behind a mutex so that each request's lookup/peek/advance/emptiness
/// check runs as one atomic unit.
#[derive(Debug, Default)]
pub struct TripStore {
    trips: HashMap<String, ResponseQueue>,
}

impl TripStore {
    /// Groups `interactions` by the identity of their recorded request,
    /// computed with the same registry and key list applied to live
    /// requests at serve time. Responses sharing an identity are appended
    /// in load order.
    pub fn index(
        interactions: Vec<RecordedInteraction>,
        registry: &KeyProviderRegistry,
        index_keys: &[String],
    ) -> Result<Self, KeyError> {
        let mut store = TripStore::default();
        for interaction in interactions {
            let identity =
                registry.build_identity(index_keys, &KeySource::Recorded(&interaction.request))?;
            store
                .trips
                .entry(identity)
                .or_insert_with(ResponseQueue::new)
                .responses
                .push(interaction.response);
        }
        Ok(store)
    }

    /// Peeks at the next unconsumed response for `identity` without
    /// advancing the cursor.
    pub fn next(&self, identity: &str) -> Option<&ResponseRecord> {
        self.trips
            .get(identity)
            .and_then(|queue| queue.responses.get(queue.cursor))
    }

    /// Advances the cursor for `identity`. If the queue is now exhausted
    /// the identity is retired from the store; returns true in that case.
    pub fn advance(&mut self, identity: &str) -> bool {
        let Some(queue) = self.trips.get_mut(identity) else {
            return false;
        };
        queue.cursor += 1;
        if queue.cursor >= queue.responses.len() {
            self.trips.remove(identity);
            return true;
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    /// The identities still holding unconsumed responses, sorted for
    /// deterministic diagnostics.
    pub fn identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self.trips.keys().cloned().collect();
        identities.sort();
        identities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::data::RequestRecord;

    fn interaction(method: &str, url: &str, status: u16, body: &str) -> RecordedInteraction {
        RecordedInteraction {
            request: RequestRecord {
                method: method.to_string(),
                url: url.to_string(),
                headers: Default::default(),
                body: String::new(),
            },
            response: ResponseRecord {
                status,
                headers: Default::default(),
                body: body.to_string(),
            },
        }
    }

    fn url_method_keys() -> Vec<String> {
        vec!["URL".to_string(), "Method".to_string()]
    }

    #[test]
    fn groups_interactions_by_identity_in_load_order() {
        let registry = KeyProviderRegistry::new();
        let store = TripStore::index(
            vec![
                interaction("GET", "/a", 200, "one"),
                interaction("GET", "/b", 200, "other"),
                interaction("GET", "/a", 200, "two"),
            ],
            &registry,
            &url_method_keys(),
        )
        .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.identities(), vec!["/a,GET", "/b,GET"]);
        assert_eq!(store.next("/a,GET").unwrap().body, "one");
    }

    #[test]
    fn next_peeks_without_consuming() {
        let registry = KeyProviderRegistry::new();
        let store = TripStore::index(
            vec![interaction("GET", "/a", 200, "one")],
            &registry,
            &url_method_keys(),
        )
        .unwrap();

        assert_eq!(store.next("/a,GET").unwrap().body, "one");
        assert_eq!(store.next("/a,GET").unwrap().body, "one");
    }

    #[test]
    fn advance_walks_responses_in_recording_order_and_retires_on_exhaustion() {
        let registry = KeyProviderRegistry::new();
        let mut store = TripStore::index(
            vec![
                interaction("GET", "/a", 200, "one"),
                interaction("GET", "/a", 200, "two"),
            ],
            &registry,
            &url_method_keys(),
        )
        .unwrap();

        assert_eq!(store.next("/a,GET").unwrap().body, "one");
        assert!(!store.advance("/a,GET"));

        assert_eq!(store.next("/a,GET").unwrap().body, "two");
        assert!(store.advance("/a,GET"));

        assert!(store.next("/a,GET").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_identity_is_a_miss_and_leaves_state_alone() {
        let registry = KeyProviderRegistry::new();
        let mut store = TripStore::index(
            vec![interaction("GET", "/a", 200, "one")],
            &registry,
            &url_method_keys(),
        )
        .unwrap();

        assert!(store.next("/missing,GET").is_none());
        assert!(!store.advance("/missing,GET"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.next("/a,GET").unwrap().body, "one");
    }

    #[test]
    fn indexing_with_unknown_key_fails() {
        let registry = KeyProviderRegistry::new();
        let result = TripStore::index(
            vec![interaction("GET", "/a", 200, "one")],
            &registry,
            &["Nope".to_string()],
        );
        assert!(matches!(
            result,
            Err(KeyError::UnknownKey { key, .. }) if key == "Nope"
        ));
    }

}
