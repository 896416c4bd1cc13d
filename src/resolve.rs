use crate::jsonld::GraphItem;
use crate::models::{local_name, single_line, EntityKind, EntityRecord};
use crate::ntriples::Triple;
use crate::relations;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde_json::Value;

type UriMap = IndexMap<String, EntityRecord, FxBuildHasher>;

/// Type keywords matched as substrings of a type object. First match wins, so
/// the order is significant.
pub const TYPE_KEYWORDS: [(&str, EntityKind); 10] = [
    ("User", EntityKind::User),
    ("Product", EntityKind::Product),
    ("Category", EntityKind::Category),
    ("Brand", EntityKind::Brand),
    ("Scene", EntityKind::Scene),
    ("Crowd", EntityKind::Crowd),
    ("Time", EntityKind::Time),
    ("Theme", EntityKind::Theme),
    ("Market", EntityKind::Market),
    ("PlaceOfOrigin", EntityKind::PlaceOfOrigin),
];

const CLASS_TYPES: &[&str] = &["owl:Class", "http://www.w3.org/2002/07/owl#Class"];

const CONCEPT_TYPES: &[&str] = &[
    "skos:Concept",
    "http://www.w3.org/2004/02/skos/core#Concept",
];

const PROPERTY_TYPES: &[&str] = &[
    "rdf:Property",
    "http://www.w3.org/1999/02/22-rdf-syntax-ns#Property",
    "owl:ObjectProperty",
    "http://www.w3.org/2002/07/owl#ObjectProperty",
    "owl:DatatypeProperty",
    "http://www.w3.org/2002/07/owl#DatatypeProperty",
];

pub const LABEL_KEYS: &[&str] = &[
    "rdfs:label",
    "http://www.w3.org/2000/01/rdf-schema#label",
    "skos:prefLabel",
    "http://www.w3.org/2004/02/skos/core#prefLabel",
];

pub const COMMENT_KEYS: &[&str] = &[
    "rdfs:comment",
    "http://www.w3.org/2000/01/rdf-schema#comment",
];

pub fn classify_type(object: &str) -> Option<EntityKind> {
    TYPE_KEYWORDS
        .iter()
        .find(|(keyword, _)| object.contains(keyword))
        .map(|(_, kind)| *kind)
}

/// Covers `rdf:type` and dataset-specific `.../type` predicates.
pub fn is_type_predicate(predicate: &str) -> bool {
    predicate.ends_with("type")
}

/// How a triple feeds the resolver and extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripleRole {
    Type,
    Relation,
    Attribute,
    Ignored,
}

pub fn triple_role(triple: &Triple) -> TripleRole {
    if is_type_predicate(&triple.predicate) {
        TripleRole::Type
    } else if triple.object.is_uri() {
        if relations::is_relation_predicate(&triple.predicate) {
            TripleRole::Relation
        } else {
            TripleRole::Ignored
        }
    } else {
        TripleRole::Attribute
    }
}

/// Outcome of resolving one JSON-LD graph item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResolution {
    Created { kind: EntityKind, uri: String },
    Merged { kind: EntityKind, uri: String },
    /// `@type` names none of the ontology kinds
    Untyped,
    /// No `@id`
    Anonymous,
}

/// Per-kind URI → entity maps. Grows monotonically; nothing is ever evicted,
/// so an entity's id is stable for the whole run.
#[derive(Debug, Default)]
pub struct EntityStore {
    maps: [UriMap; EntityKind::ALL.len()],
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: EntityKind) -> &UriMap {
        &self.maps[kind as usize]
    }

    fn map_mut(&mut self, kind: EntityKind) -> &mut UriMap {
        &mut self.maps[kind as usize]
    }

    /// Returns the record for `uri` under `kind`, creating it on first sight.
    pub fn resolve(&mut self, kind: EntityKind, uri: &str) -> (&mut EntityRecord, bool) {
        let map = self.map_mut(kind);
        let next = map.len();
        let created = !map.contains_key(uri);
        let record = map.entry(uri.to_string()).or_insert_with(|| {
            EntityRecord::new(format!("{}_{}", kind.id_prefix(), next), uri, kind)
        });
        (record, created)
    }

    pub fn get(&self, kind: EntityKind, uri: &str) -> Option<&EntityRecord> {
        self.map(kind).get(uri)
    }

    /// First record for `uri`, scanning kinds in declaration order.
    pub fn find(&self, uri: &str) -> Option<&EntityRecord> {
        EntityKind::ALL.iter().find_map(|k| self.map(*k).get(uri))
    }

    fn find_mut(&mut self, uri: &str) -> Option<&mut EntityRecord> {
        let kind = EntityKind::ALL
            .into_iter()
            .find(|k| self.map(*k).contains_key(uri))?;
        self.map_mut(kind).get_mut(uri)
    }

    pub fn lookup_id(&self, uri: &str) -> Option<&str> {
        self.find(uri).map(|r| r.id.as_str())
    }

    /// Records of one kind in insertion order.
    pub fn records(&self, kind: EntityKind) -> impl Iterator<Item = &EntityRecord> {
        self.map(kind).values()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.maps.iter().flat_map(|m| m.values())
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.map(kind).len()
    }

    pub fn total(&self) -> usize {
        self.maps.iter().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Handles a type triple. Returns the kind and whether the record is new,
    /// or `None` when the object matches no type keyword.
    pub fn apply_type(&mut self, subject: &str, object: &str) -> Option<(EntityKind, bool)> {
        let kind = classify_type(object)?;
        let (_, created) = self.resolve(kind, subject);
        Some((kind, created))
    }

    /// Records a literal attribute on the subject's existing entity. No-op when
    /// the subject has not been typed yet.
    pub fn set_property(&mut self, subject: &str, predicate: &str, value: &str) -> bool {
        match self.find_mut(subject) {
            Some(record) => {
                record
                    .properties
                    .insert(local_name(predicate).to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    /// Resolves one JSON-LD graph item into a Class, Concept or Property entity.
    pub fn apply_graph_item(&mut self, item: &GraphItem) -> ItemResolution {
        let Some(uri) = item.get("@id").and_then(Value::as_str) else {
            return ItemResolution::Anonymous;
        };
        let types = type_tags(item);
        let Some((kind, tag)) = classify_ontology_type(&types) else {
            return ItemResolution::Untyped;
        };

        let properties = scalar_properties(item);
        let (record, created) = self.resolve(kind, uri);
        if created {
            let label = first_text(item, LABEL_KEYS);
            if let Some(label) = &label {
                record.name = label.clone();
            }
            record.label = label;
            record.description = first_text(item, COMMENT_KEYS).map(|d| single_line(&d));
            if kind == EntityKind::Property {
                record.property_type = Some(compact_local(tag).to_string());
            }
        }
        record.properties.extend(properties);

        let uri = uri.to_string();
        if created {
            ItemResolution::Created { kind, uri }
        } else {
            ItemResolution::Merged { kind, uri }
        }
    }
}

fn type_tags(item: &GraphItem) -> Vec<&str> {
    match item.get("@type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Class beats Concept beats Property when an item carries several tags.
fn classify_ontology_type<'a>(types: &[&'a str]) -> Option<(EntityKind, &'a str)> {
    let groups = [
        (EntityKind::Class, CLASS_TYPES),
        (EntityKind::Concept, CONCEPT_TYPES),
        (EntityKind::Property, PROPERTY_TYPES),
    ];
    groups.into_iter().find_map(|(kind, accepted)| {
        types
            .iter()
            .find(|t| accepted.contains(*t))
            .map(|t| (kind, *t))
    })
}

/// `owl:ObjectProperty` and `http://…/owl#ObjectProperty` both become `ObjectProperty`.
fn compact_local(term: &str) -> &str {
    let local = local_name(term);
    local.rsplit(':').next().unwrap_or(local)
}

/// Text of a JSON-LD value: a string, a `{"@value": …}` object, or the first
/// usable element of a list.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => obj.get("@value").and_then(value_text),
        Value::Array(items) => items.iter().find_map(value_text),
        Value::Null => None,
    }
}

/// The first key present decides, even when its value is unusable.
fn first_text(item: &GraphItem, keys: &[&str]) -> Option<String> {
    let key = keys.iter().find(|k| item.contains_key(**k))?;
    item.get(*key).and_then(value_text)
}

/// Literal-valued keys outside labels, comments and hierarchy references.
/// Keys are shortened to their local name unless two of them would collide.
fn scalar_properties(item: &GraphItem) -> Vec<(String, String)> {
    let kept: Vec<(&str, String)> = item
        .iter()
        .filter(|(key, _)| {
            !key.starts_with('@')
                && !LABEL_KEYS.contains(&key.as_str())
                && !COMMENT_KEYS.contains(&key.as_str())
                && !relations::is_ontology_key(key)
        })
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => value_text(value),
                Value::Object(obj) if obj.contains_key("@value") => value_text(value),
                _ => None,
            }?;
            Some((key.as_str(), text))
        })
        .collect();

    kept.iter()
        .map(|(key, text)| {
            let short = compact_local(key);
            let clashes = kept
                .iter()
                .filter(|(other, _)| compact_local(other) == short)
                .count()
                > 1;
            let name = if clashes { *key } else { short };
            (name.to_string(), text.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> GraphItem {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn keyword_precedence_first_match_wins() {
        assert_eq!(classify_type("http://schema/User"), Some(EntityKind::User));
        // Contains both "Product" and "Category"; Product is listed first
        assert_eq!(
            classify_type("http://schema/ProductCategory"),
            Some(EntityKind::Product)
        );
        assert_eq!(
            classify_type("http://schema/CategoryBrand"),
            Some(EntityKind::Category)
        );
        assert_eq!(classify_type("http://schema/Thing"), None);
    }

    #[test]
    fn keyword_match_is_case_sensitive() {
        assert_eq!(classify_type("http://schema/user"), None);
    }

    #[test]
    fn place_of_origin_shadowed_only_by_earlier_keywords() {
        assert_eq!(
            classify_type("http://schema/PlaceOfOrigin"),
            Some(EntityKind::PlaceOfOrigin)
        );
    }

    #[test]
    fn ids_are_sequential_per_kind() {
        let mut store = EntityStore::new();
        assert_eq!(store.resolve(EntityKind::User, "u1").0.id, "user_0");
        assert_eq!(store.resolve(EntityKind::User, "u2").0.id, "user_1");
        assert_eq!(store.resolve(EntityKind::Brand, "b1").0.id, "brand_0");
        assert_eq!(
            store.resolve(EntityKind::PlaceOfOrigin, "p1").0.id,
            "placeOfOrigin_0"
        );
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut store = EntityStore::new();
        let (first, created) = store.resolve(EntityKind::Product, "http://ex/p1");
        let first_id = first.id.clone();
        assert!(created);
        let (again, created) = store.resolve(EntityKind::Product, "http://ex/p1");
        assert!(!created);
        assert_eq!(again.id, first_id);
        assert_eq!(store.total(), 1);
    }

    #[test]
    fn apply_type_unknown_keyword() {
        let mut store = EntityStore::new();
        assert_eq!(store.apply_type("http://ex/x", "http://schema/Widget"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn set_property_requires_existing_entity() {
        let mut store = EntityStore::new();
        assert!(!store.set_property("http://ex/u1", "http://ex/name", "Alice"));
        store.apply_type("http://ex/u1", "http://schema/User");
        assert!(store.set_property("http://ex/u1", "http://ex/name", "Alice"));
        let record = store.get(EntityKind::User, "http://ex/u1").unwrap();
        assert_eq!(record.properties.get("name").map(String::as_str), Some("Alice"));
    }

    #[test]
    fn property_update_keeps_id_and_kind() {
        let mut store = EntityStore::new();
        store.apply_type("http://ex/u1", "http://schema/User");
        store.set_property("http://ex/u1", "http://ex/name", "Alice");
        store.set_property("http://ex/u1", "http://ex/name", "Alicia");
        store.apply_type("http://ex/u1", "http://schema/User");
        let record = store.find("http://ex/u1").unwrap();
        assert_eq!(record.id, "user_0");
        assert_eq!(record.kind, EntityKind::User);
        assert_eq!(record.properties["name"], "Alicia");
    }

    #[test]
    fn same_uri_under_two_kinds() {
        let mut store = EntityStore::new();
        store.apply_type("http://ex/x", "http://schema/Brand");
        store.apply_type("http://ex/x", "http://schema/User");
        assert_eq!(store.total(), 2);
        // Lookup follows declaration order: User before Brand
        assert_eq!(store.lookup_id("http://ex/x"), Some("user_0"));
    }

    #[test]
    fn records_keep_insertion_order() {
        let mut store = EntityStore::new();
        for uri in ["http://ex/c", "http://ex/a", "http://ex/b"] {
            store.apply_type(uri, "http://schema/Scene");
        }
        let names: Vec<_> = store
            .records(EntityKind::Scene)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn graph_item_class_with_label() {
        let mut store = EntityStore::new();
        let resolution = store.apply_graph_item(&item(json!({
            "@id": "http://ex/b1",
            "@type": "owl:Class",
            "rdfs:label": "Nike"
        })));
        assert_eq!(
            resolution,
            ItemResolution::Created {
                kind: EntityKind::Class,
                uri: "http://ex/b1".into()
            }
        );
        let record = store.get(EntityKind::Class, "http://ex/b1").unwrap();
        assert_eq!(record.id, "class_0");
        assert_eq!(record.name, "Nike");
        assert_eq!(record.label.as_deref(), Some("Nike"));
    }

    #[test]
    fn graph_item_name_from_uri_fragment() {
        let mut store = EntityStore::new();
        store.apply_graph_item(&item(json!({
            "@id": "http://ex/onto#Crowd",
            "@type": ["http://www.w3.org/2004/02/skos/core#Concept"],
            "rdfs:comment": {"@value": "Target\ngroup", "@language": "en"}
        })));
        let record = store.get(EntityKind::Concept, "http://ex/onto#Crowd").unwrap();
        assert_eq!(record.name, "Crowd");
        assert_eq!(record.label, None);
        assert_eq!(record.description.as_deref(), Some("Target group"));
    }

    #[test]
    fn graph_item_label_value_object_and_list() {
        let mut store = EntityStore::new();
        store.apply_graph_item(&item(json!({
            "@id": "http://ex/c1",
            "@type": "owl:Class",
            "skos:prefLabel": [{"@value": "鞋", "@language": "zh"}, "Shoes"]
        })));
        assert_eq!(
            store.find("http://ex/c1").unwrap().label.as_deref(),
            Some("鞋")
        );
    }

    #[test]
    fn graph_item_first_label_key_wins() {
        let mut store = EntityStore::new();
        store.apply_graph_item(&item(json!({
            "@id": "http://ex/c1",
            "@type": "owl:Class",
            "skos:prefLabel": "Pref",
            "rdfs:label": "Primary"
        })));
        assert_eq!(
            store.find("http://ex/c1").unwrap().label.as_deref(),
            Some("Primary")
        );
    }

    #[test]
    fn graph_item_property_type() {
        let mut store = EntityStore::new();
        store.apply_graph_item(&item(json!({
            "@id": "http://ex/accessory",
            "@type": "http://www.w3.org/2002/07/owl#ObjectProperty"
        })));
        store.apply_graph_item(&item(json!({
            "@id": "http://ex/accessoryName",
            "@type": ["owl:DatatypeProperty"]
        })));
        let types: Vec<_> = store
            .records(EntityKind::Property)
            .map(|r| r.property_type.clone().unwrap())
            .collect();
        assert_eq!(types, vec!["ObjectProperty", "DatatypeProperty"]);
    }

    #[test]
    fn graph_item_class_wins_over_concept() {
        let mut store = EntityStore::new();
        store.apply_graph_item(&item(json!({
            "@id": "http://ex/x",
            "@type": ["skos:Concept", "owl:Class"]
        })));
        assert_eq!(store.count(EntityKind::Class), 1);
        assert_eq!(store.count(EntityKind::Concept), 0);
    }

    #[test]
    fn graph_item_untyped_and_anonymous() {
        let mut store = EntityStore::new();
        assert_eq!(
            store.apply_graph_item(&item(json!({"@id": "http://ex/x", "@type": "owl:Ontology"}))),
            ItemResolution::Untyped
        );
        assert_eq!(
            store.apply_graph_item(&item(json!({"@type": "owl:Class"}))),
            ItemResolution::Anonymous
        );
        assert!(store.is_empty());
    }

    #[test]
    fn graph_item_repeat_merges_properties_only() {
        let mut store = EntityStore::new();
        store.apply_graph_item(&item(json!({
            "@id": "http://ex/b1", "@type": "owl:Class", "rdfs:label": "Nike"
        })));
        let again = store.apply_graph_item(&item(json!({
            "@id": "http://ex/b1", "@type": "owl:Class", "rdfs:label": "Other",
            "http://ex/country": "US"
        })));
        assert!(matches!(again, ItemResolution::Merged { .. }));
        assert_eq!(store.total(), 1);
        let record = store.find("http://ex/b1").unwrap();
        assert_eq!(record.id, "class_0");
        assert_eq!(record.label.as_deref(), Some("Nike"));
        assert_eq!(record.properties["country"], "US");
    }

    #[test]
    fn scalar_properties_skip_references() {
        let props = scalar_properties(&item(json!({
            "@id": "http://ex/x",
            "rdfs:label": "X",
            "rdfs:subClassOf": {"@id": "http://ex/y"},
            "ex:rank": 3,
            "ex:active": true,
            "ex:note": {"@value": "hi"}
        })));
        assert_eq!(
            props,
            vec![
                ("rank".to_string(), "3".to_string()),
                ("active".to_string(), "true".to_string()),
                ("note".to_string(), "hi".to_string()),
            ]
        );
    }

    #[test]
    fn bare_iri_hierarchy_values_are_not_properties() {
        let props = scalar_properties(&item(json!({
            "@id": "http://ex/Sneaker",
            "rdfs:subClassOf": "http://ex/Footwear",
            "http://www.w3.org/2004/02/skos/core#broader": "http://ex/Leisure",
            "rdfs:range": "http://ex/Size",
            "ex:sku": "S-1"
        })));
        assert_eq!(props, vec![("sku".to_string(), "S-1".to_string())]);
    }

    #[test]
    fn colliding_local_names_keep_their_prefix() {
        let props = scalar_properties(&item(json!({
            "@id": "http://ex/x",
            "ex:note": "mine",
            "rdfs:note": "theirs",
            "ex:rank": 1
        })));
        assert_eq!(
            props,
            vec![
                ("ex:note".to_string(), "mine".to_string()),
                ("rdfs:note".to_string(), "theirs".to_string()),
                ("rank".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn triple_roles() {
        let parse = |l: &str| crate::ntriples::parse_line(l).unwrap();
        assert_eq!(
            triple_role(&parse("<http://ex/a> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://s/User> .")),
            TripleRole::Type
        );
        assert_eq!(
            triple_role(&parse("<http://ex/a> <http://ex/hasBrand> <http://ex/b> .")),
            TripleRole::Relation
        );
        assert_eq!(
            triple_role(&parse(r#"<http://ex/a> <http://ex/name> "A" ."#)),
            TripleRole::Attribute
        );
        assert_eq!(
            triple_role(&parse("<http://ex/a> <http://ex/sameAs> <http://ex/b> .")),
            TripleRole::Ignored
        );
    }
}
