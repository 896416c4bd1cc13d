use crate::jsonld::GraphItem;
use crate::models::{local_name, RelationshipRecord};
use crate::resolve::EntityStore;
use serde_json::Value;
use tracing::debug;

/// Predicate local names and the relationship types they map to. Keys are
/// case-sensitive and double as the keyword gate for relation predicates.
pub const RELATION_NAMES: [(&str, &str); 9] = [
    ("hasCategory", "BELONGS_TO_CATEGORY"),
    ("hasBrand", "HAS_BRAND"),
    ("belongsTo", "BELONGS_TO"),
    ("appliesTo", "APPLIES_TO"),
    ("suitable_for_crowd", "SUITABLE_FOR_CROWD"),
    ("suitable_for_scene", "SUITABLE_FOR_SCENE"),
    ("suitable_for_time", "SUITABLE_FOR_TIME"),
    ("hasTheme", "HAS_THEME"),
    ("inMarket", "IN_MARKET"),
];

/// Hierarchy references captured from JSON-LD ontology items.
pub struct OntologyRelation {
    pub keys: [&'static str; 2],
    /// Full predicate IRI written to the `uri` column
    pub iri: &'static str,
    pub rel_type: &'static str,
}

pub const ONTOLOGY_RELATIONS: [OntologyRelation; 5] = [
    OntologyRelation {
        keys: ["rdfs:subClassOf", "http://www.w3.org/2000/01/rdf-schema#subClassOf"],
        iri: "http://www.w3.org/2000/01/rdf-schema#subClassOf",
        rel_type: "SUBCLASS_OF",
    },
    OntologyRelation {
        keys: ["skos:broader", "http://www.w3.org/2004/02/skos/core#broader"],
        iri: "http://www.w3.org/2004/02/skos/core#broader",
        rel_type: "BROADER",
    },
    OntologyRelation {
        keys: ["rdfs:subPropertyOf", "http://www.w3.org/2000/01/rdf-schema#subPropertyOf"],
        iri: "http://www.w3.org/2000/01/rdf-schema#subPropertyOf",
        rel_type: "SUBPROPERTY_OF",
    },
    OntologyRelation {
        keys: ["rdfs:domain", "http://www.w3.org/2000/01/rdf-schema#domain"],
        iri: "http://www.w3.org/2000/01/rdf-schema#domain",
        rel_type: "HAS_DOMAIN",
    },
    OntologyRelation {
        keys: ["rdfs:range", "http://www.w3.org/2000/01/rdf-schema#range"],
        iri: "http://www.w3.org/2000/01/rdf-schema#range",
        rel_type: "HAS_RANGE",
    },
];

pub fn is_relation_predicate(predicate: &str) -> bool {
    RELATION_NAMES.iter().any(|(key, _)| predicate.contains(key))
}

/// Maps a predicate local name to its relationship type, upper-casing unknown names.
pub fn relation_type(local: &str) -> String {
    RELATION_NAMES
        .iter()
        .find(|(key, _)| *key == local)
        .map(|(_, rel)| rel.to_string())
        .unwrap_or_else(|| local.to_uppercase())
}

/// What to do with a candidate whose endpoints are not both known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgePolicy {
    /// Drop it for good
    #[default]
    Drop,
    /// Buffer it and retry once after the stream ends
    Deferred,
}

/// A relationship between two URIs, not yet resolved to entity ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub subject: String,
    pub object: String,
    pub rel_type: String,
    pub source_uri: Option<String>,
}

impl Candidate {
    /// Candidate for an N-Triples relation predicate.
    pub fn from_triple(subject: &str, predicate: &str, object: &str) -> Self {
        Self {
            subject: subject.to_string(),
            object: object.to_string(),
            rel_type: relation_type(local_name(predicate)),
            source_uri: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    Emitted,
    Deferred,
    Dropped,
}

/// Hierarchy candidates referenced by one JSON-LD item.
/// Whether `key` is one of the hierarchy keys in [`ONTOLOGY_RELATIONS`].
pub fn is_ontology_key(key: &str) -> bool {
    ONTOLOGY_RELATIONS.iter().any(|r| r.keys.contains(&key))
}

pub fn ontology_candidates(subject: &str, item: &GraphItem) -> Vec<Candidate> {
    let mut out = Vec::new();
    for relation in &ONTOLOGY_RELATIONS {
        let Some(value) = relation.keys.iter().find_map(|k| item.get(*k)) else {
            continue;
        };
        for target in references(value) {
            out.push(Candidate {
                subject: subject.to_string(),
                object: target.to_string(),
                rel_type: relation.rel_type.to_string(),
                source_uri: Some(relation.iri.to_string()),
            });
        }
    }
    out
}

fn references(value: &Value) -> Vec<&str> {
    match value {
        Value::String(iri) => vec![iri.as_str()],
        Value::Object(obj) => obj.get("@id").and_then(Value::as_str).into_iter().collect(),
        Value::Array(items) => items.iter().flat_map(references).collect(),
        _ => Vec::new(),
    }
}

/// Turns candidates into relationship records against an [`EntityStore`].
pub struct RelationshipExtractor {
    policy: EdgePolicy,
    records: Vec<RelationshipRecord>,
    pending: Vec<Candidate>,
    dropped: u64,
}

impl RelationshipExtractor {
    pub fn new(policy: EdgePolicy) -> Self {
        Self {
            policy,
            records: Vec::new(),
            pending: Vec::new(),
            dropped: 0,
        }
    }

    pub fn policy(&self) -> EdgePolicy {
        self.policy
    }

    fn resolve(store: &EntityStore, candidate: &Candidate) -> Option<RelationshipRecord> {
        let from_id = store.lookup_id(&candidate.subject)?;
        let to_id = store.lookup_id(&candidate.object)?;
        Some(RelationshipRecord {
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            rel_type: candidate.rel_type.clone(),
            source_uri: candidate.source_uri.clone(),
        })
    }

    pub fn offer(&mut self, store: &EntityStore, candidate: Candidate) -> EdgeOutcome {
        if let Some(record) = Self::resolve(store, &candidate) {
            self.records.push(record);
            return EdgeOutcome::Emitted;
        }
        match self.policy {
            EdgePolicy::Drop => {
                debug!(subject = %candidate.subject, object = %candidate.object, "Dropping unresolved relationship");
                self.dropped += 1;
                EdgeOutcome::Dropped
            }
            EdgePolicy::Deferred => {
                self.pending.push(candidate);
                EdgeOutcome::Deferred
            }
        }
    }

    /// Second pass over deferred candidates, in arrival order. Returns how many
    /// resolved; the rest are dropped.
    pub fn finish(&mut self, store: &EntityStore) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let mut resolved = 0;
        for candidate in pending {
            match Self::resolve(store, &candidate) {
                Some(record) => {
                    self.records.push(record);
                    resolved += 1;
                }
                None => self.dropped += 1,
            }
        }
        resolved
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn records(&self) -> &[RelationshipRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<RelationshipRecord> {
        self.records
    }
}
