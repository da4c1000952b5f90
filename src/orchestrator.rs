//! Batch import: resolve, normalize, upsert and reconcile each record in order.
//!
//! The batch is fail-fast but not atomic. Each record commits in its own
//! transaction; the first failing record stops the batch and everything before
//! it stays committed.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::database_ops::db::Db;
use crate::error::{DataError, ImportError};
use crate::import::{extract_relation_lists, has_identifier, reconcile, upsert};
use crate::normalization::{normalize, normalize_type_tag};
use crate::schema::{EntityType, SchemaRegistry};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub records: usize,
    pub created: usize,
    pub updated: usize,
}

/// Parse a request body into the list of tagged records.
pub fn parse_batch(body: &[u8]) -> Result<Vec<Value>, ImportError> {
    match serde_json::from_slice::<Value>(body).map_err(ImportError::InvalidJson)? {
        Value::Array(records) => Ok(records),
        _ => Err(ImportError::NotAnArray),
    }
}

/// Split `{"<Type>": {...}}` into its tag and field record.
fn split_record(index: usize, record: &Value) -> Result<(&str, &Map<String, Value>), ImportError> {
    let malformed = |reason: &str| ImportError::MalformedRecord {
        index,
        reason: reason.to_string(),
    };
    let object = record
        .as_object()
        .ok_or_else(|| malformed("expected an object keyed by type name"))?;
    let mut entries = object.iter();
    let (tag, fields) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        (None, _) => return Err(malformed("empty object")),
        (Some(_), Some(_)) => return Err(malformed("expected exactly one type key")),
    };
    let fields = fields
        .as_object()
        .ok_or_else(|| malformed("record fields must be an object"))?;
    Ok((tag.as_str(), fields))
}

fn data_error(index: usize, entity: &EntityType, err: DataError) -> ImportError {
    match err {
        DataError::MissingId => ImportError::MissingId {
            index,
            type_name: entity.name.to_string(),
        },
        DataError::Storage(e) => ImportError::Storage(e),
        source => ImportError::InvalidData {
            index,
            type_name: entity.name,
            source,
        },
    }
}

/// Import one record in its own transaction. Returns `true` when created.
async fn import_record(
    db: &Db,
    registry: &SchemaRegistry,
    index: usize,
    record: &Value,
) -> Result<bool, ImportError> {
    let (tag, fields) = split_record(index, record)?;
    let type_name = normalize_type_tag(tag);
    let entity = registry
        .resolve(type_name)
        .ok_or_else(|| ImportError::UnknownType {
            index,
            name: type_name.to_string(),
        })?;

    let mut fields = normalize(fields.clone());
    if !has_identifier(&fields) {
        return Err(ImportError::MissingId {
            index,
            type_name: entity.name.to_string(),
        });
    }
    let lists = extract_relation_lists(&mut fields).map_err(|e| data_error(index, entity, e))?;

    let mut tx = db.begin().await.map_err(ImportError::Storage)?;
    let (id, created) = upsert(&mut tx, entity, &fields)
        .await
        .map_err(|e| data_error(index, entity, e))?;
    reconcile(&mut tx, entity, id, &lists)
        .await
        .map_err(|e| data_error(index, entity, e))?;
    tx.commit().await.map_err(ImportError::Storage)?;

    debug!(index, entity = entity.name, id, created, "record imported");
    Ok(created)
}

/// Import `records` strictly in order, stopping at the first failure.
pub async fn import_batch(
    db: &Db,
    registry: &SchemaRegistry,
    records: &[Value],
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();
    for (index, record) in records.iter().enumerate() {
        match import_record(db, registry, index, record).await {
            Ok(created) => {
                summary.records += 1;
                if created {
                    summary.created += 1;
                } else {
                    summary.updated += 1;
                }
            }
            Err(err) => {
                warn!(
                    index,
                    committed = summary.records,
                    remaining = records.len() - index - 1,
                    error = %err,
                    "import batch stopped"
                );
                return Err(err);
            }
        }
    }
    info!(
        records = summary.records,
        created = summary.created,
        updated = summary.updated,
        "import batch complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::db::test_db;
    use serde_json::json;

    fn batch(value: Value) -> Vec<Value> {
        value.as_array().cloned().unwrap()
    }

    async fn seeded() -> (Db, SchemaRegistry) {
        let (db, registry) = test_db().await;
        let seed = batch(json!([
            {"AttributeName": {"id": 1, "name": "Attribute Name 1", "code": "attributename1"}},
            {"AttributeName": {"id": 2, "name": "Attribute Name 2", "code": "attributename2"}},
            {"AttributeValue": {"id": 1, "value": "Attribute Value 1"}},
            {"AttributeValue": {"id": 2, "value": "Attribute Value 2"}},
            {"Product": {"id": 1, "name": "CZK Product Published", "price": 100, "currency": "CZK", "is_published": true}},
            {"Product": {"id": 2, "name": "USD Product Published", "price": 100, "currency": "USD", "is_published": true}},
            {"Product": {"id": 3, "name": "EUR Product Not Published", "price": 100, "currency": "EUR", "is_published": false}},
            {"Attribute": {"id": 1, "name_id": 1, "value_id": 1}},
            {"Attribute": {"id": 2, "name_id": 2, "value_id": 2}},
        ]));
        import_batch(&db, &registry, &seed).await.unwrap();
        (db, registry)
    }

    #[test]
    fn parse_rejects_bad_bodies() {
        assert!(matches!(parse_batch(b"{not json"), Err(ImportError::InvalidJson(_))));
        assert!(matches!(parse_batch(br#"{"Product": {}}"#), Err(ImportError::NotAnArray)));
        assert_eq!(parse_batch(b"[]").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn same_record_twice_creates_then_updates() {
        let (db, registry) = test_db().await;
        let records = batch(json!([
            {"AttributeName": {"id": 9, "name": "Material", "code": "material", "display": false}}
        ]));

        let first = import_batch(&db, &registry, &records).await.unwrap();
        let second = import_batch(&db, &registry, &records).await.unwrap();
        assert_eq!((first.created, first.updated), (1, 0));
        assert_eq!((second.created, second.updated), (0, 1));

        let entity = registry.resolve("AttributeName").unwrap();
        let row = db.get_by_id(entity, 9).await.unwrap().unwrap();
        assert_eq!(row["name"], json!("Material"));
        assert_eq!(row["display"], json!(false));
    }

    #[tokio::test]
    async fn legacy_and_canonical_names_persist_the_same_entity() {
        let (db, registry) = seeded().await;
        let attribute = registry.resolve("Attribute").unwrap();

        let legacy = batch(json!([
            {"Attribute": {"id": 5, "nazev_atributu_id": 2, "hodnota_atributu_id": 1}}
        ]));
        let canonical = batch(json!([
            {"Attribute": {"id": 6, "name_id": 2, "value_id": 1}}
        ]));
        import_batch(&db, &registry, &legacy).await.unwrap();
        import_batch(&db, &registry, &canonical).await.unwrap();

        let mut a = db.get_by_id(attribute, 5).await.unwrap().unwrap();
        let mut b = db.get_by_id(attribute, 6).await.unwrap().unwrap();
        a.remove("id");
        b.remove("id");
        assert_eq!(a, b);
        assert_eq!(a["name"], json!(2));
    }

    #[tokio::test]
    async fn catalog_relations_are_set_replaced() {
        let (db, registry) = seeded().await;
        let catalog = registry.resolve("Catalog").unwrap();
        let attributes = catalog.relation("attributes").unwrap();
        let products = catalog.relation("products").unwrap();

        let records = batch(json!([
            {"Catalog": {"id": 1, "name": "Test Object", "attributes_ids": [1, 2], "products_ids": [2, 3]}}
        ]));
        import_batch(&db, &registry, &records).await.unwrap();
        assert_eq!(db.association_ids(attributes, 1).await.unwrap(), vec![1, 2]);
        assert_eq!(db.association_ids(products, 1).await.unwrap(), vec![2, 3]);

        let records = batch(json!([
            {"Catalog": {"id": 1, "name": "Test Object", "attributes_ids": [2]}}
        ]));
        import_batch(&db, &registry, &records).await.unwrap();
        assert_eq!(db.association_ids(attributes, 1).await.unwrap(), vec![2]);
        assert_eq!(db.association_ids(products, 1).await.unwrap(), vec![2, 3]);

        let records = batch(json!([{"Catalog": {"id": 1, "name": "Renamed"}}]));
        import_batch(&db, &registry, &records).await.unwrap();
        assert_eq!(db.association_ids(attributes, 1).await.unwrap(), vec![2]);

        let detail = db.get_by_id(catalog, 1).await.unwrap().unwrap();
        assert_eq!(detail["name"], json!("Renamed"));
        assert_eq!(detail["attributes"], json!([2]));
        assert_eq!(detail["products"], json!([2, 3]));
    }

    #[tokio::test]
    async fn stops_at_first_failure_without_rollback() {
        let (db, registry) = test_db().await;
        let records = batch(json!([
            {"AttributeValue": {"id": 1, "value": "first"}},
            {"AttributeValue": {"id": "invalid_id", "value": "second"}},
            {"AttributeValue": {"id": 3, "value": "third"}},
        ]));

        let err = import_batch(&db, &registry, &records).await.unwrap_err();
        assert_eq!(err.record_index(), Some(1));
        assert!(err.is_client_error());
        assert!(err.to_string().starts_with("Invalid data for AttributeValue (record 1)"));

        let entity = registry.resolve("AttributeValue").unwrap();
        let rows = db.list_all(entity).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["value"], json!("first"));
    }

    #[tokio::test]
    async fn failed_reconcile_leaves_the_record_unapplied() {
        let (db, registry) = seeded().await;
        let records = batch(json!([
            {"Catalog": {"id": 7, "name": "Broken", "products_ids": [999]}}
        ]));
        let err = import_batch(&db, &registry, &records).await.unwrap_err();
        assert!(matches!(err, ImportError::InvalidData { index: 0, .. }), "{err:?}");

        let catalog = registry.resolve("Catalog").unwrap();
        assert!(db.get_by_id(catalog, 7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reports_unknown_type_missing_id_and_bad_fields() {
        let (db, registry) = test_db().await;

        let err = import_batch(
            &db,
            &registry,
            &batch(json!([{"NotARealType": {"id": 1, "name": "x"}}])),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid model name: NotARealType (record 0)");

        let err = import_batch(&db, &registry, &batch(json!([{"Image": {"url": "https://x.io/a.png"}}])))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing ID for Image (record 0)");

        let err = import_batch(
            &db,
            &registry,
            &batch(json!([{"AttributeName": {"id": 3, "name": "n", "display": "Invalid Display Value"}}])),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ImportError::InvalidData { type_name: "AttributeName", .. }));

        let err = import_batch(
            &db,
            &registry,
            &batch(json!([{"AttributeName": {"id": 3}, "Image": {"id": 1}}])),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ImportError::MalformedRecord { index: 0, .. }));
    }

    #[tokio::test]
    async fn legacy_type_tags_resolve() {
        let (db, registry) = test_db().await;
        let records = batch(json!([
            {"Obrazek": {"id": 1, "nazev": "Front", "url": "https://cdn.example.com/front.jpg"}}
        ]));
        import_batch(&db, &registry, &records).await.unwrap();
        let image = registry.resolve("Image").unwrap();
        let row = db.get_by_id(image, 1).await.unwrap().unwrap();
        assert_eq!(row["name"], json!("Front"));
    }

    #[tokio::test]
    async fn product_images_link_through_their_own_entity() {
        let (db, registry) = test_db().await;
        let records = batch(json!([
            {"Image": {"id": 10, "name": "Front", "url": "https://cdn.example.com/front.jpg"}},
            {"Image": {"id": 11, "url": "https://cdn.example.com/back.jpg"}},
            {"Product": {"id": 4, "name": "Lamp", "price": "19.90", "currency": "EUR", "is_published": true}},
            {"ProductImage": {"id": 1, "product": 4, "image_id": 10, "name": "hero"}},
            {"ProduktObrazek": {"id": 2, "produkt_id": 4, "obrazek_id": 11, "nazev": "detail"}},
        ]));
        let summary = import_batch(&db, &registry, &records).await.unwrap();
        assert_eq!(summary.created, 5);

        let product = registry.resolve("Product").unwrap();
        let detail = db.get_by_id(product, 4).await.unwrap().unwrap();
        assert_eq!(detail["images"], json!([10, 11]));

        let product_image = registry.resolve("ProductImage").unwrap();
        let link = db.get_by_id(product_image, 1).await.unwrap().unwrap();
        assert_eq!(link["name"], json!("hero"));
        assert_eq!(link["product"], json!(4));
        assert_eq!(link["image"], json!(10));
        let legacy = db.get_by_id(product_image, 2).await.unwrap().unwrap();
        assert_eq!(legacy["name"], json!("detail"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_batches_wait_for_the_writer() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "catalog_import_concurrent_{}_{nanos}.db",
            std::process::id()
        ));
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let registry = SchemaRegistry::catalog();
        let db = Db::connect(&url, 4).await.unwrap();
        db.ensure_schema(&registry).await.unwrap();

        let records: Vec<Value> = (1..=200)
            .map(|id| json!({"AttributeValue": {"id": id, "value": format!("value {id}")}}))
            .collect();
        let (a, b) = tokio::join!(
            import_batch(&db, &registry, &records),
            import_batch(&db, &registry, &records)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.records, 200);
        assert_eq!(b.records, 200);
        assert_eq!(a.created + b.created, 200);

        let entity = registry.resolve("AttributeValue").unwrap();
        assert_eq!(db.list_all(entity).await.unwrap().len(), 200);

        db.pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }
}
