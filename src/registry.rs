//! In-memory schema registry.
//!
//! spec.md §1 places "the schema registry (persistent storage of blueprints
//! by content hash)" out of scope for the core, and §6 lists its admin
//! surface (`PUT /schemas`, `GET /schemas`, `GET /schemas/{hex}`, `DELETE
//! /schemas/{hex}`) only "for completeness". SPEC_FULL.md §10.5 still wires
//! a minimal in-process registry behind those four operations so the CLI
//! and the `/graphql/{digest}` route have something real to exercise —
//! no on-disk store, no replication, process-local only.

use crate::blueprint::{Blueprint, Digest};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Process-wide, content-addressed store of published [`Blueprint`]s.
/// Cheap to clone: the map itself lives behind an `Arc`.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<BTreeMap<String, Arc<Blueprint>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `PUT /schemas`: compute the blueprint's digest and store it,
    /// overwriting any prior entry for the same digest (compiling the same
    /// config twice is idempotent).
    pub fn publish(&self, blueprint: Blueprint) -> Digest {
        let digest = blueprint.digest();
        self.inner
            .write()
            .unwrap()
            .insert(digest.0.clone(), Arc::new(blueprint));
        digest
    }

    /// `GET /schemas/{hex}`.
    pub fn get(&self, hex: &str) -> Option<Arc<Blueprint>> {
        self.inner.read().unwrap().get(hex).cloned()
    }

    /// `DELETE /schemas/{hex}`. Returns whether an entry was actually removed.
    pub fn drop_digest(&self, hex: &str) -> bool {
        self.inner.write().unwrap().remove(hex).is_some()
    }

    /// `GET /schemas?index=&max=`: digests in ascending lexicographic order,
    /// paginated by `offset`/`limit`.
    pub fn list(&self, offset: usize, limit: usize) -> Vec<String> {
        self.inner
            .read()
            .unwrap()
            .keys()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{ObjectType, SchemaRoots, ServerConfig, TypeDef, UpstreamConfig};
    use indexmap::IndexMap;

    fn blueprint(query_name: &str) -> Blueprint {
        let mut types = IndexMap::new();
        types.insert(
            query_name.to_string(),
            TypeDef::Object(ObjectType { name: query_name.to_string(), fields: vec![] }),
        );
        Blueprint {
            schema: SchemaRoots { query: query_name.to_string(), mutation: None },
            types,
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }

    #[test]
    fn publish_then_get_round_trips() {
        let registry = Registry::new();
        let digest = registry.publish(blueprint("Query"));
        let fetched = registry.get(&digest.0).expect("published blueprint should be retrievable");
        assert_eq!(fetched.schema.query, "Query");
    }

    #[test]
    fn drop_removes_entry_and_reports_whether_it_existed() {
        let registry = Registry::new();
        let digest = registry.publish(blueprint("Query"));
        assert!(registry.drop_digest(&digest.0));
        assert!(registry.get(&digest.0).is_none());
        assert!(!registry.drop_digest(&digest.0));
    }

    #[test]
    fn list_paginates_in_lexicographic_digest_order() {
        let registry = Registry::new();
        registry.publish(blueprint("Query"));
        registry.publish(blueprint("OtherQuery"));
        let all = registry.list(0, 10);
        assert_eq!(all.len(), 2);
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);
    }
}
