use serde_json::{Map, Value};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::database_ops::db;
use crate::error::DataError;
use crate::schema::{coerce_id, EntityType, ATTRIBUTES_IDS, PRODUCTS_IDS};

/// Replacement id lists pulled out of an import record.
///
/// `None` means the key was absent (or null) and the set must stay untouched;
/// `Some(vec![])` clears it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelationLists {
    pub attributes: Option<Vec<i64>>,
    pub products: Option<Vec<i64>>,
}

impl RelationLists {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_none() && self.products.is_none()
    }
}

fn take_ids(record: &mut Map<String, Value>, key: &str) -> Result<Option<Vec<i64>>, DataError> {
    let invalid = |reason: String| DataError::InvalidValue {
        field: key.to_string(),
        reason,
    };
    match record.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                coerce_id(item).ok_or_else(|| invalid(format!("expected a list of ids but got {item}")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(invalid(format!("expected a list of ids but got {other}"))),
    }
}

/// Remove `attributes_ids` / `products_ids` from the record.
pub fn extract_relation_lists(record: &mut Map<String, Value>) -> Result<RelationLists, DataError> {
    Ok(RelationLists {
        attributes: take_ids(record, ATTRIBUTES_IDS)?,
        products: take_ids(record, PRODUCTS_IDS)?,
    })
}

/// Set-replace each supplied association set of `id`.
pub async fn reconcile(
    conn: &mut SqliteConnection,
    entity: &EntityType,
    id: i64,
    lists: &RelationLists,
) -> Result<(), DataError> {
    for (key, ids) in [
        (ATTRIBUTES_IDS, &lists.attributes),
        (PRODUCTS_IDS, &lists.products),
    ] {
        let Some(ids) = ids else {
            continue;
        };
        let relation = entity
            .relation_for_input(key)
            .ok_or_else(|| DataError::UnsupportedRelation {
                type_name: entity.name,
                relation: key.trim_end_matches("_ids").to_string(),
            })?;
        db::set_association(conn, relation, id, ids).await?;
        debug!(
            entity = entity.name,
            id,
            relation = relation.name,
            count = ids.len(),
            "association set replaced"
        );
    }
    Ok(())
}
