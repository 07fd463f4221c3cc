//! Collection Reconciler - finds stored related rows that a new collection
//! no longer contains.

use std::collections::HashSet;

use crate::backends::Transaction;
use crate::error::ModelResult;
use crate::model::{PrimaryKey, Record};

/// Stored records of `relation` whose key is absent from `incoming`.
///
/// Results keep the order in which storage returned them.
pub async fn reconcile(
    parent: &Record,
    tx: &mut dyn Transaction,
    relation: &str,
    incoming: &[Record],
) -> ModelResult<Vec<Record>> {
    let kept: HashSet<PrimaryKey> = incoming.iter().map(Record::primary_key).collect();
    let stored = parent.find_related(tx, relation).await?;

    Ok(stored
        .into_iter()
        .filter(|record| !kept.contains(&record.primary_key()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Connection, MemoryDatabase};
    use crate::model::{Attributes, ModelSchema};
    use crate::relationships::ModelRegistry;
    use serde_json::{json, Value};

    fn row(value: Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    fn setup() -> (ModelRegistry, MemoryDatabase) {
        let registry = ModelRegistry::new();
        registry.register(
            ModelSchema::new("Order", "orders").has_many("items", "Item", [("order_id", "id")]),
        );
        registry.register(ModelSchema::new("Item", "items").attributes(&["order_id"]));

        let db = MemoryDatabase::new();
        for id in 1..=3 {
            db.insert_row("items", row(json!({"id": id, "order_id": 1})));
        }
        db.insert_row("items", row(json!({"id": 9, "order_id": 2})));
        (registry, db)
    }

    fn item(registry: &ModelRegistry, id: i64) -> Record {
        let mut item = registry.create("Item").unwrap();
        item.set("id", id).unwrap();
        item.set_is_new_record(false);
        item
    }

    #[tokio::test]
    async fn test_reconcile_returns_removed_rows() {
        let (registry, db) = setup();
        let mut order = registry.create("Order").unwrap();
        order.set("id", 1).unwrap();

        let incoming = vec![item(&registry, 2), item(&registry, 3), registry.create("Item").unwrap()];
        let mut tx = db.begin().await.unwrap();
        let removed = reconcile(&order, tx.as_mut(), "items", &incoming).await.unwrap();

        let ids: Vec<Value> = removed.iter().map(|r| r.attribute("id")).collect();
        assert_eq!(ids, vec![json!(1)]);
    }

    #[tokio::test]
    async fn test_reconcile_matches_string_keys() {
        let (registry, db) = setup();
        let mut order = registry.create("Order").unwrap();
        order.set("id", 1).unwrap();

        let mut first = registry.create("Item").unwrap();
        first.set("id", "1").unwrap();
        let mut tx = db.begin().await.unwrap();
        let removed = reconcile(&order, tx.as_mut(), "items", &[first]).await.unwrap();

        assert_eq!(removed.len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_empty_collection_removes_everything() {
        let (registry, db) = setup();
        let mut order = registry.create("Order").unwrap();
        order.set("id", 1).unwrap();

        let mut tx = db.begin().await.unwrap();
        let removed = reconcile(&order, tx.as_mut(), "items", &[]).await.unwrap();
        assert_eq!(removed.len(), 3);
    }
}
