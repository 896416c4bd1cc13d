use crate::config;
use crate::models::{EntityKind, NodeSchema};
use crate::scanner::make_spinner;
use crate::writer::ImportManifest;
use anyhow::{Context, Result};
use csv::Reader;
use indexmap::{IndexMap, IndexSet};
use neo4rs::{query, ConfigBuilder, Graph};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// The graph database never answered; only the load step fails.
#[derive(Debug, Error)]
#[error("cannot connect to Neo4j at {uri} after {attempts} attempts")]
pub struct UpstreamUnavailable {
    pub uri: String,
    pub attempts: u32,
    #[source]
    pub source: neo4rs::Error,
}

pub struct ImportConfig {
    pub output_dir: PathBuf,
    pub bolt_uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub import_prefix: String,
    pub clean: bool,
}

/// Rows present after each load step, keyed by collection name.
#[derive(Debug, Default)]
pub struct LoadCounts {
    pub nodes: IndexMap<String, i64>,
    pub relationships: i64,
}

/// Node counts by label and relationship counts by type.
#[derive(Debug, Default)]
pub struct Verification {
    pub nodes: IndexMap<String, i64>,
    pub relationships: IndexMap<String, i64>,
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn file_uri(import_prefix: &str, file: &str) -> String {
    format!("{import_prefix}/{file}")
}

pub fn index_cypher(kind: EntityKind) -> String {
    format!(
        "CREATE INDEX {}_id IF NOT EXISTS FOR (n:{}) ON (n.id);",
        kind.id_prefix().to_lowercase(),
        kind.label()
    )
}

/// LOAD CSV statement for one node file.
pub fn node_load_cypher(kind: EntityKind, file_uri: &str) -> String {
    let properties = match kind.schema() {
        NodeSchema::Simple => "id: row.`id:ID`, label: row.label",
        NodeSchema::Ontology => {
            "id: row.`id:ID`, uri: row.uri, name: row.name, label: row.label, description: row.description"
        }
        NodeSchema::OntologyProperty => {
            "id: row.`id:ID`, uri: row.uri, name: row.name, label: row.label, description: row.description, property_type: row.property_type"
        }
    };
    format!(
        "LOAD CSV WITH HEADERS FROM {file} AS row\n\
         CALL {{ WITH row\n    CREATE (:{label} {{{properties}}})\n}} IN TRANSACTIONS OF {batch} ROWS;",
        file = quote_string(file_uri),
        label = kind.label(),
        batch = config::IMPORT_BATCH_ROWS,
    )
}

/// LOAD CSV statement for the rows of one relationship type.
pub fn relationship_load_cypher(rel_type: &str, file_uri: &str) -> String {
    format!(
        "LOAD CSV WITH HEADERS FROM {file} AS row\n\
         WITH row WHERE row.`:TYPE` = {ty}\n\
         CALL {{ WITH row\n    MATCH (a {{id: row.`:START_ID`}}), (b {{id: row.`:END_ID`}})\n    \
         CREATE (a)-[r:{ident}]->(b)\n    SET r.uri = row.uri\n}} IN TRANSACTIONS OF {batch} ROWS;",
        file = quote_string(file_uri),
        ty = quote_string(rel_type),
        ident = quote_identifier(rel_type),
        batch = config::IMPORT_BATCH_ROWS,
    )
}

/// Distinct `:TYPE` values of a relationships file, in first-seen order.
pub fn relationship_types(path: &Path) -> Result<Vec<String>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    let column = reader
        .headers()?
        .iter()
        .position(|h| h == ":TYPE")
        .with_context(|| format!("No :TYPE column in {}", path.display()))?;

    let mut types = IndexSet::new();
    for record in reader.records() {
        let record = record?;
        if let Some(t) = record.get(column) {
            types.insert(t.to_string());
        }
    }
    Ok(types.into_iter().collect())
}

pub async fn connect_with_retry(config: &ImportConfig) -> Result<Graph, UpstreamUnavailable> {
    let max_retries = config::IMPORT_MAX_RETRIES;
    let delay = tokio::time::Duration::from_secs(config::IMPORT_RETRY_DELAY_SECS);
    let unavailable = |source: neo4rs::Error| UpstreamUnavailable {
        uri: config.bolt_uri.clone(),
        attempts: max_retries,
        source,
    };

    let mut attempt = 1;
    loop {
        let connected = match ConfigBuilder::default()
            .uri(config.bolt_uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .db(config.database.as_str())
            .build()
        {
            Ok(neo_config) => match Graph::connect(neo_config) {
                Ok(graph) => match graph.run(query("RETURN 1;")).await {
                    Ok(_) => Ok(graph),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            },
            // A malformed configuration will not fix itself
            Err(e) => return Err(unavailable(e)),
        };

        match connected {
            Ok(graph) => return Ok(graph),
            Err(e) if attempt < max_retries => {
                info!(attempt, "Cannot connect to Neo4j at {}, retrying: {e}", config.bolt_uri);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(unavailable(e)),
        }
    }
}

async fn run_cypher(graph: &Graph, cypher: &str) -> Result<()> {
    graph
        .run(query(cypher))
        .await
        .with_context(|| format!("Failed to execute: {cypher}"))?;
    Ok(())
}

async fn query_count(graph: &Graph, cypher: &str) -> Result<i64> {
    let mut result = graph
        .execute(query(cypher))
        .await
        .with_context(|| format!("Failed to execute count query: {cypher}"))?;

    if let Some(row) = result.next().await? {
        let count: i64 = row.get("cnt").context("Missing 'cnt' field in result")?;
        Ok(count)
    } else {
        Ok(0)
    }
}

async fn query_grouped_counts(graph: &Graph, cypher: &str, key: &str) -> Result<IndexMap<String, i64>> {
    let mut result = graph
        .execute(query(cypher))
        .await
        .with_context(|| format!("Failed to execute count query: {cypher}"))?;

    let mut counts = IndexMap::new();
    while let Some(row) = result.next().await? {
        let name: String = row
            .get(key)
            .with_context(|| format!("Missing '{key}' field in result"))?;
        let count: i64 = row.get("cnt").context("Missing 'cnt' field in result")?;
        counts.insert(name, count);
    }
    Ok(counts)
}

/// Loads every file named in `manifest`, nodes first, one statement at a time.
pub async fn load_graph_data(
    graph: &Graph,
    manifest: &ImportManifest,
    output_dir: &Path,
    import_prefix: &str,
) -> Result<LoadCounts> {
    let mut counts = LoadCounts::default();

    for (kind, file) in manifest.node_files() {
        let pb = make_spinner(&format!("Loading {} nodes from {file} ...", kind.label()));
        run_cypher(graph, &index_cypher(kind)).await?;
        run_cypher(graph, &node_load_cypher(kind, &file_uri(import_prefix, file))).await?;
        let count = query_count(
            graph,
            &format!("MATCH (n:{}) RETURN count(n) AS cnt", kind.label()),
        )
        .await?;
        pb.finish_with_message(format!("{}: {count} nodes", kind.label()));
        info!(label = kind.label(), count, "Loaded nodes");
        counts.nodes.insert(kind.collection().to_string(), count);
    }

    if let Some(file) = &manifest.relationships {
        let types = relationship_types(&output_dir.join(file))?;
        for rel_type in &types {
            let pb = make_spinner(&format!("Loading {rel_type} relationships ..."));
            run_cypher(
                graph,
                &relationship_load_cypher(rel_type, &file_uri(import_prefix, file)),
            )
            .await?;
            pb.finish_with_message(format!("{rel_type}: loaded"));
        }
        counts.relationships =
            query_count(graph, "MATCH ()-[r]->() RETURN count(r) AS cnt").await?;
        info!(count = counts.relationships, types = types.len(), "Loaded relationships");
    }

    Ok(counts)
}

pub async fn verify_data_loading(graph: &Graph) -> Result<Verification> {
    Ok(Verification {
        nodes: query_grouped_counts(
            graph,
            "MATCH (n) RETURN labels(n)[0] AS label, count(n) AS cnt ORDER BY cnt DESC",
            "label",
        )
        .await?,
        relationships: query_grouped_counts(
            graph,
            "MATCH ()-[r]->() RETURN type(r) AS rel_type, count(r) AS cnt ORDER BY cnt DESC",
            "rel_type",
        )
        .await?,
    })
}

pub async fn run_import(config: ImportConfig) -> Result<()> {
    let start = Instant::now();
    let manifest = ImportManifest::load(&config.output_dir)?;
    if manifest.nodes.is_empty() {
        warn!(dir = %config.output_dir.display(), "Manifest lists no node files");
    }

    println!();
    println!("==> Connecting to Neo4j at {} ...", config.bolt_uri);
    let graph = connect_with_retry(&config).await?;
    println!("    Connected.");

    if config.clean {
        let pb = make_spinner("Removing existing data ...");
        run_cypher(&graph, "MATCH (n) DETACH DELETE n").await?;
        pb.finish_with_message("Existing data removed.");
    }

    println!();
    println!("==> Loading graph data ...");
    let counts =
        load_graph_data(&graph, &manifest, &config.output_dir, &config.import_prefix).await?;
    let verification = verify_data_loading(&graph).await?;

    println!();
    println!("============================================");
    println!("  SUCCESS: Import complete!");
    println!("============================================");
    println!();
    println!("Total time:         {:.2}s", start.elapsed().as_secs_f64());
    for (collection, count) in &counts.nodes {
        println!("{:<20}{count}", format!("{collection}:"));
    }
    println!("{:<20}{}", "relationships:", counts.relationships);
    println!();
    println!("Nodes by label:");
    for (label, count) in &verification.nodes {
        println!("  {label:<18}{count}");
    }
    println!("Relationships by type:");
    for (rel_type, count) in &verification.relationships {
        println!("  {rel_type:<18}{count}");
    }

    Ok(())
}
