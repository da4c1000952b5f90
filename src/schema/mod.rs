//! Static schema registry for the catalog entity types.
//!
//! The registry is built once at startup (`SchemaRegistry::catalog()`) and shared
//! by reference with the importer and the read endpoints. Nothing in here touches
//! the database; table DDL lives in `database_ops::db`.

pub mod value;

pub use value::{coerce, coerce_id, SqlValue};

/// What happens to a referencing row when its target is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
}

/// Declared storage kind of a field; drives both value coercion and DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Id,
    Char { max_len: usize },
    Text,
    Bool,
    Decimal { max_digits: u32, decimal_places: u32 },
    DateTime,
    Url { max_len: usize },
    ForeignKey { table: &'static str, on_delete: OnDelete },
}

/// Column default applied by the store when a field is absent on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    None,
    EmptyString,
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Attribute name as used in detail output (`name` for a reference).
    pub name: &'static str,
    /// Physical column (`name_id` for a reference).
    pub column: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub default: ColumnDefault,
}

impl FieldDef {
    pub fn id() -> Self {
        Self {
            name: "id",
            column: "id",
            kind: FieldKind::Id,
            nullable: false,
            default: ColumnDefault::None,
        }
    }

    pub fn char(name: &'static str, max_len: usize) -> Self {
        Self {
            name,
            column: name,
            kind: FieldKind::Char { max_len },
            nullable: false,
            default: ColumnDefault::EmptyString,
        }
    }

    pub fn text(name: &'static str) -> Self {
        Self {
            name,
            column: name,
            kind: FieldKind::Text,
            nullable: false,
            default: ColumnDefault::EmptyString,
        }
    }

    pub fn boolean(name: &'static str) -> Self {
        Self {
            name,
            column: name,
            kind: FieldKind::Bool,
            nullable: false,
            default: ColumnDefault::None,
        }
    }

    pub fn decimal(name: &'static str, max_digits: u32, decimal_places: u32) -> Self {
        Self {
            name,
            column: name,
            kind: FieldKind::Decimal {
                max_digits,
                decimal_places,
            },
            nullable: false,
            default: ColumnDefault::None,
        }
    }

    pub fn datetime(name: &'static str) -> Self {
        Self {
            name,
            column: name,
            kind: FieldKind::DateTime,
            nullable: false,
            default: ColumnDefault::None,
        }
    }

    pub fn url(name: &'static str, max_len: usize) -> Self {
        Self {
            name,
            column: name,
            kind: FieldKind::Url { max_len },
            nullable: false,
            default: ColumnDefault::EmptyString,
        }
    }

    pub fn foreign_key(
        name: &'static str,
        column: &'static str,
        table: &'static str,
        on_delete: OnDelete,
    ) -> Self {
        Self {
            name,
            column,
            kind: FieldKind::ForeignKey { table, on_delete },
            nullable: false,
            default: ColumnDefault::None,
        }
    }

    /// Allow NULL; nullable fields never carry a column default.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self.default = ColumnDefault::None;
        self
    }

    pub fn default_bool(mut self, value: bool) -> Self {
        self.default = ColumnDefault::Bool(value);
        self
    }

    /// True when `key` addresses this field, either by attribute or column name.
    pub fn matches(&self, key: &str) -> bool {
        self.name == key || self.column == key
    }
}

/// How a many-to-many link is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Through {
    /// Plain join table: composite key, no identity, no extra columns.
    Join,
    /// Association entity with its own id (and possibly extra fields).
    Entity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub name: &'static str,
    /// Import key carrying the replacement id list; `None` when the relation is
    /// only written through its association entity.
    pub input_key: Option<&'static str>,
    pub table: &'static str,
    pub owner_table: &'static str,
    pub owner_column: &'static str,
    pub target_table: &'static str,
    pub target_column: &'static str,
    pub through: Through,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    pub name: &'static str,
    pub table: &'static str,
    /// Human readable name used in not-found messages ("Attribute name").
    pub verbose_name: &'static str,
    /// Declared fields, `id` first.
    pub fields: Vec<FieldDef>,
    pub relations: Vec<RelationDef>,
}

impl EntityType {
    pub fn id_field(&self) -> &FieldDef {
        &self.fields[0]
    }

    pub fn field(&self, key: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.matches(key))
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Relation written by the given import list key (`attributes_ids`, ...).
    pub fn relation_for_input(&self, key: &str) -> Option<&RelationDef> {
        self.relations
            .iter()
            .find(|r| r.input_key == Some(key))
    }
}

pub const ATTRIBUTES_IDS: &str = "attributes_ids";
pub const PRODUCTS_IDS: &str = "products_ids";

/// Immutable set of importable entity types.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    types: Vec<EntityType>,
}

impl SchemaRegistry {
    pub fn new(types: Vec<EntityType>) -> Self {
        Self { types }
    }

    /// The product catalog: attributes, products, images, catalogs and the
    /// product/image association entity.
    pub fn catalog() -> Self {
        let attribute_name = EntityType {
            name: "AttributeName",
            table: "attribute_name",
            verbose_name: "Attribute name",
            fields: vec![
                FieldDef::id(),
                FieldDef::char("name", 125),
                FieldDef::char("code", 125),
                FieldDef::boolean("display").default_bool(true),
            ],
            relations: vec![],
        };

        let attribute_value = EntityType {
            name: "AttributeValue",
            table: "attribute_value",
            verbose_name: "Attribute value",
            fields: vec![FieldDef::id(), FieldDef::char("value", 125)],
            relations: vec![],
        };

        let attribute = EntityType {
            name: "Attribute",
            table: "attribute",
            verbose_name: "Attribute",
            fields: vec![
                FieldDef::id(),
                FieldDef::foreign_key("name", "name_id", "attribute_name", OnDelete::Cascade),
                FieldDef::foreign_key("value", "value_id", "attribute_value", OnDelete::SetNull)
                    .nullable(),
            ],
            relations: vec![],
        };

        let product = EntityType {
            name: "Product",
            table: "product",
            verbose_name: "Product",
            fields: vec![
                FieldDef::id(),
                FieldDef::char("name", 125),
                FieldDef::text("description"),
                FieldDef::decimal("price", 10, 2),
                FieldDef::char("currency", 3),
                FieldDef::datetime("published_on").nullable(),
                FieldDef::boolean("is_published"),
            ],
            relations: vec![
                RelationDef {
                    name: "images",
                    input_key: None,
                    table: "product_image",
                    owner_table: "product",
                    owner_column: "product_id",
                    target_table: "image",
                    target_column: "image_id",
                    through: Through::Entity,
                },
                RelationDef {
                    name: "attributes",
                    input_key: Some(ATTRIBUTES_IDS),
                    table: "product_attribute",
                    owner_table: "product",
                    owner_column: "product_id",
                    target_table: "attribute",
                    target_column: "attribute_id",
                    through: Through::Join,
                },
            ],
        };

        let image = EntityType {
            name: "Image",
            table: "image",
            verbose_name: "Image",
            fields: vec![
                FieldDef::id(),
                FieldDef::char("name", 125).nullable(),
                FieldDef::url("url", 200),
            ],
            relations: vec![],
        };

        let product_image = EntityType {
            name: "ProductImage",
            table: "product_image",
            verbose_name: "Product image",
            fields: vec![
                FieldDef::id(),
                FieldDef::foreign_key("product", "product_id", "product", OnDelete::Cascade),
                FieldDef::foreign_key("image", "image_id", "image", OnDelete::Cascade),
                FieldDef::char("name", 125),
            ],
            relations: vec![],
        };

        let catalog = EntityType {
            name: "Catalog",
            table: "catalog",
            verbose_name: "Catalog",
            fields: vec![
                FieldDef::id(),
                FieldDef::char("name", 125),
                FieldDef::foreign_key("image", "image_id", "image", OnDelete::SetNull).nullable(),
            ],
            relations: vec![
                RelationDef {
                    name: "products",
                    input_key: Some(PRODUCTS_IDS),
                    table: "catalog_products",
                    owner_table: "catalog",
                    owner_column: "catalog_id",
                    target_table: "product",
                    target_column: "product_id",
                    through: Through::Join,
                },
                RelationDef {
                    name: "attributes",
                    input_key: Some(ATTRIBUTES_IDS),
                    table: "catalog_attributes",
                    owner_table: "catalog",
                    owner_column: "catalog_id",
                    target_table: "attribute",
                    target_column: "attribute_id",
                    through: Through::Join,
                },
            ],
        };

        Self::new(vec![
            attribute_name,
            attribute_value,
            attribute,
            product,
            image,
            product_image,
            catalog,
        ])
    }

    /// Resolve a (normalized) type name. ASCII case-insensitive; never fails.
    pub fn resolve(&self, type_name: &str) -> Option<&EntityType> {
        self.types
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(type_name))
    }

    pub fn types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.iter()
    }

    /// Plain join tables declared by any entity, each reported once.
    pub fn join_relations(&self) -> Vec<&RelationDef> {
        let mut out: Vec<&RelationDef> = Vec::new();
        for rel in self.types.iter().flat_map(|t| t.relations.iter()) {
            if rel.through == Through::Join && !out.iter().any(|r| r.table == rel.table) {
                out.push(rel);
            }
        }
        out
    }
}
