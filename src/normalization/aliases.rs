use serde_json::{Map, Value};

/// Legacy export field names and their canonical counterparts.
pub const FIELD_ALIASES: [(&str, &str); 16] = [
    ("nazev_atributu_id", "name_id"),
    ("hodnota_atributu_id", "value_id"),
    ("nazev", "name"),
    ("hodnota", "value"),
    ("kod", "code"),
    ("zobrazit", "display"),
    ("popis", "description"),
    ("cena", "price"),
    ("mena", "currency"),
    ("publikovano", "is_published"),
    ("datum_publikace", "published_on"),
    ("obrazek_id", "image_id"),
    ("produkt_id", "product_id"),
    ("atribut_id", "attribute_id"),
    ("atributy_ids", "attributes_ids"),
    ("produkty_ids", "products_ids"),
];

/// Legacy type tags and the entity type names they stand for.
pub const TYPE_ALIASES: [(&str, &str); 7] = [
    ("NazevAtributu", "AttributeName"),
    ("HodnotaAtributu", "AttributeValue"),
    ("Atribut", "Attribute"),
    ("Produkt", "Product"),
    ("Obrazek", "Image"),
    ("ProduktObrazek", "ProductImage"),
    ("Katalog", "Catalog"),
];

fn lookup<'a>(table: &[(&'static str, &'static str)], key: &'a str) -> &'a str {
    table
        .iter()
        .find(|(legacy, _)| *legacy == key)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(key)
}

/// Canonical name for a single field key; unknown keys come back unchanged.
pub fn canonical_field(key: &str) -> &str {
    lookup(&FIELD_ALIASES, key)
}

/// Canonical entity type name for an import tag; unknown tags come back unchanged.
pub fn normalize_type_tag(tag: &str) -> &str {
    lookup(&TYPE_ALIASES, tag)
}

/// Rename aliased keys of a record, keeping key order and values untouched.
///
/// Keys outside the alias table pass through verbatim so that unknown fields
/// reach the upsert and are reported there. If a legacy key and its canonical
/// key both appear, the one later in the record wins.
pub fn normalize(record: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(record.len());
    for (key, value) in record {
        let canonical = canonical_field(&key);
        if canonical == key {
            out.insert(key, value);
        } else {
            out.insert(canonical.to_string(), value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn renames_legacy_keys_and_keeps_order() {
        let record = as_map(json!({
            "id": 1,
            "nazev_atributu_id": 1,
            "hodnota_atributu_id": 2,
        }));
        let normalized = normalize(record);
        let keys: Vec<&str> = normalized.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "name_id", "value_id"]);
        assert_eq!(normalized["value_id"], json!(2));
    }

    #[test]
    fn unknown_keys_pass_through() {
        let record = as_map(json!({"id": 3, "nazvev": "typo", "display": true}));
        let normalized = normalize(record.clone());
        assert_eq!(normalized, record);
    }

    #[test]
    fn type_tags_resolve_through_aliases() {
        assert_eq!(normalize_type_tag("Katalog"), "Catalog");
        assert_eq!(normalize_type_tag("Product"), "Product");
        assert_eq!(normalize_type_tag("NotARealType"), "NotARealType");
    }

    #[test]
    fn later_duplicate_wins() {
        let record = as_map(json!({"nazev": "old", "name": "new"}));
        let normalized = normalize(record);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized["name"], json!("new"));
    }
}
