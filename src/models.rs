use indexmap::IndexMap;
use serde::Serialize;

/// Column layout of a node import file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSchema {
    /// `id:ID,label,:LABEL`
    Simple,
    /// `id:ID,uri,name,label,description,:LABEL`
    Ontology,
    /// Ontology layout plus a `property_type` column
    OntologyProperty,
}

impl NodeSchema {
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            NodeSchema::Simple => &["id:ID", "label", ":LABEL"],
            NodeSchema::Ontology => &["id:ID", "uri", "name", "label", "description", ":LABEL"],
            NodeSchema::OntologyProperty => &[
                "id:ID",
                "uri",
                "name",
                "label",
                "description",
                "property_type",
                ":LABEL",
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    User,
    Product,
    Category,
    Brand,
    Scene,
    Crowd,
    Time,
    Theme,
    Market,
    PlaceOfOrigin,
    Class,
    Concept,
    Property,
}

impl EntityKind {
    /// Declaration order; also the order used for cross-kind lookups and output.
    pub const ALL: [EntityKind; 13] = [
        EntityKind::User,
        EntityKind::Product,
        EntityKind::Category,
        EntityKind::Brand,
        EntityKind::Scene,
        EntityKind::Crowd,
        EntityKind::Time,
        EntityKind::Theme,
        EntityKind::Market,
        EntityKind::PlaceOfOrigin,
        EntityKind::Class,
        EntityKind::Concept,
        EntityKind::Property,
    ];

    /// Neo4j node label.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::User => "User",
            EntityKind::Product => "Product",
            EntityKind::Category => "Category",
            EntityKind::Brand => "Brand",
            EntityKind::Scene => "Scene",
            EntityKind::Crowd => "Crowd",
            EntityKind::Time => "Time",
            EntityKind::Theme => "Theme",
            EntityKind::Market => "Market",
            EntityKind::PlaceOfOrigin => "PlaceOfOrigin",
            EntityKind::Class => "Class",
            EntityKind::Concept => "Concept",
            EntityKind::Property => "Property",
        }
    }

    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Product => "product",
            EntityKind::Category => "category",
            EntityKind::Brand => "brand",
            EntityKind::Scene => "scene",
            EntityKind::Crowd => "crowd",
            EntityKind::Time => "time",
            EntityKind::Theme => "theme",
            EntityKind::Market => "market",
            EntityKind::PlaceOfOrigin => "placeOfOrigin",
            EntityKind::Class => "class",
            EntityKind::Concept => "concept",
            EntityKind::Property => "property",
        }
    }

    /// Manifest key for this kind's node file.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Product => "products",
            EntityKind::Category => "categories",
            EntityKind::Brand => "brands",
            EntityKind::Scene => "scenes",
            EntityKind::Crowd => "crowds",
            EntityKind::Time => "times",
            EntityKind::Theme => "themes",
            EntityKind::Market => "markets",
            EntityKind::PlaceOfOrigin => "places_of_origin",
            EntityKind::Class => "classes",
            EntityKind::Concept => "concepts",
            EntityKind::Property => "properties",
        }
    }

    pub fn from_collection(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.collection() == name)
    }

    pub fn file_name(&self) -> String {
        match self.schema() {
            NodeSchema::Simple => format!("{}.csv", self.collection()),
            _ => format!("tbox_{}.csv", self.collection()),
        }
    }

    pub fn schema(&self) -> NodeSchema {
        match self {
            EntityKind::Class | EntityKind::Concept => NodeSchema::Ontology,
            EntityKind::Property => NodeSchema::OntologyProperty,
            _ => NodeSchema::Simple,
        }
    }
}

/// One resolved entity. `id` and `kind` never change after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub id: String,
    pub uri: String,
    pub kind: EntityKind,
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub property_type: Option<String>,
    pub properties: IndexMap<String, String>,
}

impl EntityRecord {
    pub fn new(id: String, uri: &str, kind: EntityKind) -> Self {
        Self {
            id,
            uri: uri.to_string(),
            kind,
            name: local_name(uri).to_string(),
            label: None,
            description: None,
            property_type: None,
            properties: IndexMap::new(),
        }
    }

    /// Label column for simple node files: explicit label, else the derived name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRecord {
    pub from_id: String,
    pub to_id: String,
    pub rel_type: String,
    pub source_uri: Option<String>,
}

/// Row of `properties.jsonl`.
#[derive(Serialize)]
pub struct PropertyBlob<'a> {
    pub id: &'a str,
    pub uri: &'a str,
    pub properties: &'a IndexMap<String, String>,
}

/// Last path segment of an IRI, then the part after any `#`.
pub fn local_name(uri: &str) -> &str {
    let segment = uri.rsplit('/').next().unwrap_or(uri);
    segment.rsplit('#').next().unwrap_or(segment)
}

/// Collapses line breaks into single spaces so a CSV field stays on one line.
pub fn single_line(s: &str) -> String {
    if s.contains(['\n', '\r']) {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        s.to_string()
    }
}
