//! Linker - decides which side of a relation owns the foreign key and
//! copies key values across.

use serde_json::Value;

use super::metadata::RelationDescriptor;
use crate::error::{ModelError, ModelResult};
use crate::model::{ModelSchema, Record};

/// Which record receives key values when two records are linked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    /// The related record holds the foreign key (has-one / has-many)
    RelatedOwnsKey,
    /// The declaring record holds the foreign key (belongs-to)
    ParentOwnsKey,
}

impl LinkDirection {
    /// Infer the direction from which side's link columns form its primary key.
    ///
    /// Exactly one side must match; otherwise linking is ambiguous.
    pub fn resolve(
        parent: &ModelSchema,
        related: &ModelSchema,
        relation: &RelationDescriptor,
    ) -> ModelResult<Self> {
        let related_is_key = related.is_primary_key(&relation.link.related_columns());
        let parent_is_key = parent.is_primary_key(&relation.link.local_columns());

        match (related_is_key, parent_is_key) {
            (true, false) => Ok(LinkDirection::ParentOwnsKey),
            (false, true) => Ok(LinkDirection::RelatedOwnsKey),
            (true, true) => Err(ModelError::Link(format!(
                "both '{}' and '{}' key the link of relation '{}'",
                parent.name(),
                related.name(),
                relation.name
            ))),
            (false, false) => Err(ModelError::Link(format!(
                "neither '{}' nor '{}' keys the link of relation '{}'",
                parent.name(),
                related.name(),
                relation.name
            ))),
        }
    }
}

/// Copy key values so the foreign-key side points at the key side
pub fn link(
    parent: &mut Record,
    related: &mut Record,
    relation: &RelationDescriptor,
) -> ModelResult<LinkDirection> {
    let direction = LinkDirection::resolve(parent.schema(), related.schema(), relation)?;

    for (related_column, local_column) in relation.link.pairs() {
        match direction {
            LinkDirection::ParentOwnsKey => {
                let value = related.attribute(related_column);
                parent.set(local_column, value)?;
            }
            LinkDirection::RelatedOwnsKey => {
                let value = parent.attribute(local_column);
                related.set(related_column, value)?;
            }
        }
    }
    Ok(direction)
}

/// Null the parent's foreign-key columns of a parent-owned relation
pub fn unlink(parent: &mut Record, relation: &RelationDescriptor) -> ModelResult<()> {
    for local_column in relation.link.local_columns() {
        parent.set(local_column, Value::Null)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::ModelRegistry;
    use serde_json::json;

    fn registry() -> ModelRegistry {
        let registry = ModelRegistry::new();
        registry.register(
            ModelSchema::new("Order", "orders")
                .attributes(&["customer_id", "total"])
                .has_one("customer", "Customer", [("id", "customer_id")])
                .has_many("items", "Item", [("order_id", "id")]),
        );
        registry.register(ModelSchema::new("Customer", "customers").attributes(&["name"]));
        registry.register(ModelSchema::new("Item", "items").attributes(&["order_id", "sku"]));
        registry.register(
            ModelSchema::new("Receipt", "receipts")
                .primary_key(&["order_id"])
                .has_one("order", "Order", [("id", "order_id")]),
        );
        registry
    }

    #[test]
    fn test_related_owns_key() {
        let registry = registry();
        let relation = registry.relation("Order", "items").unwrap();
        let mut order = registry.create("Order").unwrap();
        order.set("id", 10).unwrap();
        let mut item = registry.create("Item").unwrap();

        let direction = link(&mut order, &mut item, &relation).unwrap();

        assert_eq!(direction, LinkDirection::RelatedOwnsKey);
        assert_eq!(item.get("order_id"), Some(&json!(10)));
    }

    #[test]
    fn test_parent_owns_key() {
        let registry = registry();
        let relation = registry.relation("Order", "customer").unwrap();
        let mut order = registry.create("Order").unwrap();
        let mut customer = registry.create("Customer").unwrap();
        customer.set("id", 3).unwrap();

        let direction = link(&mut order, &mut customer, &relation).unwrap();

        assert_eq!(direction, LinkDirection::ParentOwnsKey);
        assert_eq!(order.get("customer_id"), Some(&json!(3)));
    }

    #[test]
    fn test_ambiguous_link_fails() {
        let registry = registry();
        let relation = registry.relation("Receipt", "order").unwrap();
        let mut receipt = registry.create("Receipt").unwrap();
        let mut order = registry.create("Order").unwrap();

        let err = link(&mut receipt, &mut order, &relation).unwrap_err();
        assert!(matches!(err, ModelError::Link(msg) if msg.contains("both")));
    }

    #[test]
    fn test_unlink_clears_foreign_key() {
        let registry = registry();
        let relation = registry.relation("Order", "customer").unwrap();
        let mut order = registry.create("Order").unwrap();
        order.set("customer_id", 3).unwrap();

        unlink(&mut order, &relation).unwrap();
        assert_eq!(order.get("customer_id"), Some(&Value::Null));
    }
}
