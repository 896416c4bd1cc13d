//! kgsample: knowledge-graph dump sampling and Neo4j import pipeline
//!
//! This crate turns very large RDF dumps into a small, representative graph that
//! Neo4j can bulk load:
//!
//! 1. **Scan** -- Stream an N-Triples file (optionally `.bz2`) in line chunks, or the
//!    `@graph` items of a JSON-LD document, in a single forward pass
//! 2. **Sample** -- Gate each valid item through a bounded head or reservoir sampler;
//!    only admitted items reach the graph
//! 3. **Resolve** -- Give every newly seen subject a stable synthetic id, classify its
//!    type by keyword, and collect labels, descriptions and literal properties
//! 4. **Relate** -- Turn relation predicates into edges between already resolved ids
//! 5. **Write** -- Emit one CSV per populated entity kind, a relationships CSV, the raw
//!    sample, property blobs and a manifest
//! 6. **Load** (optional) -- Push the CSVs into Neo4j over Bolt with `LOAD CSV`
//!
//! # Architecture
//!
//! - **Bounded memory** -- Only the current chunk, the sample and the entity maps are
//!   held; the maps grow with the number of distinct URIs actually admitted
//! - **Insertion order** -- Entity maps are `IndexMap`s, so output rows follow first sight
//! - **Item-level fault isolation** -- Malformed lines and graph items are counted and
//!   skipped; only I/O failures abort a run
//! - **Lossy edges by default** -- A relationship whose endpoints are not both known
//!   when it is seen is dropped, unless deferred resolution is requested
//!
//! # Key Modules
//!
//! - [`scanner`] -- Chunked line reader with BZ2 decompression
//! - [`ntriples`] -- N-Triples line tokenizer
//! - [`jsonld`] -- Incremental `@graph` item reader and direct document parsing
//! - [`sampling`] -- Head and reservoir samplers
//! - [`resolve`] -- Entity store, type keywords and JSON-LD classification
//! - [`relations`] -- Relation taxonomy and edge extraction
//! - [`writer`] -- CSV, sample, property blob and manifest output
//! - [`extract`] -- The single-pass pipeline
//! - [`import`] -- Neo4j loading and verification over Bolt
//! - [`models`] -- Entity kinds, records and CSV layouts
//! - [`stats`] -- Atomic counters for extraction metrics
//! - [`config`] -- Constants and run configuration
//!
//! # Example Usage
//!
//! ```bash
//! # Keep the first 10 000 triples
//! kgsample extract -i dump.nt.bz2 -o output/
//!
//! # Uniform sample of 5 000 triples, reproducible
//! kgsample extract -i dump.nt -o output/ --sample 5000 --random-sample --seed 42
//!
//! # Ontology graph, then load into Neo4j
//! kgsample extract -i tbox.jsonld -o tbox/ --deferred-edges
//! kgsample load -o tbox/ --clean
//! ```

pub mod config;
pub mod extract;
pub mod import;
pub mod jsonld;
pub mod models;
pub mod ntriples;
pub mod relations;
pub mod resolve;
pub mod sampling;
pub mod scanner;
pub mod stats;
pub mod writer;
