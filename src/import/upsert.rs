use serde_json::{Map, Value};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::database_ops::db;
use crate::error::DataError;
use crate::schema::{coerce, EntityType, FieldDef, SqlValue, ATTRIBUTES_IDS, PRODUCTS_IDS};

/// A record validated against its entity type and ready to write.
#[derive(Debug)]
pub struct PreparedRecord<'a> {
    pub id: i64,
    pub fields: Vec<(&'a FieldDef, SqlValue)>,
}

/// Truthiness check on `id`: absent, null, false, 0, "" and empty containers
/// all count as missing.
pub fn has_identifier(record: &Map<String, Value>) -> bool {
    match record.get("id") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Bool(true)) => true,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

fn is_relation_list(key: &str) -> bool {
    key == ATTRIBUTES_IDS || key == PRODUCTS_IDS
}

/// Validate field names and coerce values. Relationship lists are skipped; they
/// belong to the reconciler.
pub fn prepare<'a>(
    entity: &'a EntityType,
    record: &Map<String, Value>,
) -> Result<PreparedRecord<'a>, DataError> {
    if !has_identifier(record) {
        return Err(DataError::MissingId);
    }

    let mut unknown: Vec<String> = record
        .keys()
        .filter(|key| !is_relation_list(key) && entity.field(key).is_none())
        .map(|key| format!("'{key}'"))
        .collect();
    if !unknown.is_empty() {
        unknown.sort();
        return Err(DataError::UnknownFields {
            type_name: entity.name,
            fields: unknown,
        });
    }

    let id_field = entity.id_field();
    let id = match coerce(id_field, &record[id_field.name])? {
        SqlValue::Integer(id) => id,
        _ => return Err(DataError::MissingId),
    };

    let mut fields: Vec<(&FieldDef, SqlValue)> = Vec::with_capacity(record.len());
    for (key, value) in record {
        if is_relation_list(key) || key == id_field.name {
            continue;
        }
        let Some(field) = entity.field(key) else {
            continue;
        };
        if fields.iter().any(|(seen, _)| seen.column == field.column) {
            return Err(DataError::DuplicateField { field: field.name });
        }
        fields.push((field, coerce(field, value)?));
    }

    Ok(PreparedRecord { id, fields })
}

/// Create the row or overwrite the named fields of the existing one.
///
/// Returns the row id and whether it was created. Runs on the caller's
/// connection so the write shares the record's transaction.
pub async fn upsert(
    conn: &mut SqliteConnection,
    entity: &EntityType,
    record: &Map<String, Value>,
) -> Result<(i64, bool), DataError> {
    let prepared = prepare(entity, record)?;
    let created = db::upsert_row(conn, entity, prepared.id, &prepared.fields).await?;
    debug!(
        entity = entity.name,
        id = prepared.id,
        fields = prepared.fields.len(),
        created,
        "upserted"
    );
    Ok((prepared.id, created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::db::test_db;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn identifier_presence_follows_truthiness() {
        assert!(has_identifier(&as_map(json!({"id": 1}))));
        assert!(has_identifier(&as_map(json!({"id": "invalid_id"}))));
        assert!(!has_identifier(&as_map(json!({"name": "x"}))));
        assert!(!has_identifier(&as_map(json!({"id": null}))));
        assert!(!has_identifier(&as_map(json!({"id": 0}))));
        assert!(!has_identifier(&as_map(json!({"id": ""}))));
    }

    #[test]
    fn unknown_fields_are_reported_together() {
        let registry = crate::schema::SchemaRegistry::catalog();
        let entity = registry.resolve("AttributeName").unwrap();
        let err = prepare(
            entity,
            &as_map(json!({"id": 3, "nazev": "x", "hodnota": "y", "display": true})),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid field name(s) for model AttributeName: 'hodnota', 'nazev'"
        );
    }

    #[test]
    fn reference_given_twice_is_rejected() {
        let registry = crate::schema::SchemaRegistry::catalog();
        let entity = registry.resolve("Attribute").unwrap();
        let err = prepare(entity, &as_map(json!({"id": 1, "name": 1, "name_id": 2}))).unwrap_err();
        assert!(matches!(err, DataError::DuplicateField { field: "name" }));
    }

    #[test]
    fn relation_lists_are_left_for_the_reconciler() {
        let registry = crate::schema::SchemaRegistry::catalog();
        let entity = registry.resolve("Catalog").unwrap();
        let prepared = prepare(
            entity,
            &as_map(json!({"id": "4", "name": "Spring", "attributes_ids": [1], "products_ids": []})),
        )
        .unwrap();
        assert_eq!(prepared.id, 4);
        assert_eq!(prepared.fields.len(), 1);
        assert_eq!(prepared.fields[0].0.name, "name");
    }

    #[tokio::test]
    async fn second_upsert_updates_in_place() {
        let (db, registry) = test_db().await;
        let entity = registry.resolve("AttributeValue").unwrap();
        let record = as_map(json!({"id": 2, "value": "Red"}));

        let mut tx = db.begin().await.unwrap();
        assert_eq!(upsert(&mut tx, entity, &record).await.unwrap(), (2, true));
        assert_eq!(upsert(&mut tx, entity, &record).await.unwrap(), (2, false));
        tx.commit().await.unwrap();

        let row = db.get_by_id(entity, 2).await.unwrap().unwrap();
        assert_eq!(row["value"], json!("Red"));
    }

    #[tokio::test]
    async fn missing_required_column_is_a_constraint_error() {
        let (db, registry) = test_db().await;
        let entity = registry.resolve("Product").unwrap();
        let mut tx = db.begin().await.unwrap();
        let err = upsert(&mut tx, entity, &as_map(json!({"id": 1, "name": "No price"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Constraint(_)), "{err:?}");
    }
}
