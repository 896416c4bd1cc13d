use crate::config::{CSV_BUFFER_SIZE, MANIFEST_FILE};
use crate::jsonld::GraphItem;
use crate::models::{single_line, EntityKind, EntityRecord, NodeSchema, PropertyBlob, RelationshipRecord};
use crate::resolve::EntityStore;
use crate::stats::StatsSnapshot;
use anyhow::{Context, Result};
use csv::Writer;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const RELATIONSHIPS_FILE: &str = "relationships.csv";
pub const PROPERTIES_FILE: &str = "properties.jsonl";
pub const NT_SAMPLE_FILE: &str = "sample.nt";
pub const JSONLD_SAMPLE_FILE: &str = "sample.jsonld";

/// The sampled raw items, kept verbatim as provenance.
#[derive(Debug, Clone)]
pub enum Sample {
    Lines(Vec<String>),
    Items(Vec<GraphItem>),
}

impl Sample {
    pub fn len(&self) -> usize {
        match self {
            Sample::Lines(lines) => lines.len(),
            Sample::Items(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Index of the files written by one run. Paths are relative to the output directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportManifest {
    /// Collection name → node file
    pub nodes: IndexMap<String, String>,
    pub relationships: Option<String>,
    pub sample: Option<String>,
    pub properties: Option<String>,
    pub stats: StatsSnapshot,
}

impl ImportManifest {
    pub fn load(output_dir: &Path) -> Result<Self> {
        let path = output_dir.join(MANIFEST_FILE);
        let file = File::open(&path)
            .with_context(|| format!("Failed to open manifest: {}", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))
    }

    pub fn save(&self, output_dir: &Path) -> Result<()> {
        let path = output_dir.join(MANIFEST_FILE);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create manifest: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Node files paired with their kind, skipping unknown collections.
    pub fn node_files(&self) -> impl Iterator<Item = (EntityKind, &str)> {
        self.nodes
            .iter()
            .filter_map(|(name, file)| Some((EntityKind::from_collection(name)?, file.as_str())))
    }

    /// Whether `file` is one of the outputs recorded here.
    pub fn lists(&self, file: &str) -> bool {
        self.nodes.values().any(|f| f == file)
            || [&self.relationships, &self.sample, &self.properties]
                .into_iter()
                .any(|f| f.as_deref() == Some(file))
    }
}

fn csv_writer(path: &Path) -> Result<Writer<BufWriter<File>>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(Writer::from_writer(BufWriter::with_capacity(
        CSV_BUFFER_SIZE,
        file,
    )))
}

/// One CSV row for `record` in its kind's layout.
pub fn node_row(record: &EntityRecord) -> Vec<String> {
    let label = record.kind.label().to_string();
    match record.kind.schema() {
        NodeSchema::Simple => vec![
            record.id.clone(),
            single_line(record.display_label()),
            label,
        ],
        schema => {
            let mut row = vec![
                record.id.clone(),
                record.uri.clone(),
                single_line(&record.name),
                record.label.as_deref().map(single_line).unwrap_or_default(),
                record.description.as_deref().map(single_line).unwrap_or_default(),
            ];
            if schema == NodeSchema::OntologyProperty {
                row.push(record.property_type.clone().unwrap_or_default());
            }
            row.push(label);
            row
        }
    }
}

/// Writes one node file. Returns the number of rows.
pub fn write_nodes<'a>(
    path: &Path,
    kind: EntityKind,
    records: impl Iterator<Item = &'a EntityRecord>,
) -> Result<usize> {
    let mut writer = csv_writer(path)?;
    writer.write_record(kind.schema().header())?;
    let mut rows = 0;
    for record in records {
        writer.write_record(node_row(record))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

/// The `uri` column is present only when some record carries a source IRI.
pub fn relationship_header(records: &[RelationshipRecord]) -> Vec<&'static str> {
    let mut header = vec![":START_ID", ":END_ID", ":TYPE"];
    if records.iter().any(|r| r.source_uri.is_some()) {
        header.push("uri");
    }
    header
}

pub fn write_relationships(path: &Path, records: &[RelationshipRecord]) -> Result<()> {
    let header = relationship_header(records);
    let with_uri = header.len() == 4;
    let mut writer = csv_writer(path)?;
    writer.write_record(&header)?;
    for r in records {
        if with_uri {
            writer.write_record([
                r.from_id.as_str(),
                r.to_id.as_str(),
                r.rel_type.as_str(),
                r.source_uri.as_deref().unwrap_or(""),
            ])?;
        } else {
            writer.write_record([r.from_id.as_str(), r.to_id.as_str(), r.rel_type.as_str()])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// One JSON line per entity that has properties. Returns the line count.
pub fn write_properties(path: &Path, store: &EntityStore) -> Result<usize> {
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
    );
    let mut lines = 0;
    for record in store.iter().filter(|r| !r.properties.is_empty()) {
        let blob = PropertyBlob {
            id: &record.id,
            uri: &record.uri,
            properties: &record.properties,
        };
        serde_json::to_writer(&mut writer, &blob)?;
        writer.write_all(b"\n")?;
        lines += 1;
    }
    writer.flush()?;
    Ok(lines)
}

/// Writes the sample file and returns its name.
pub fn write_sample(output_dir: &Path, sample: &Sample) -> Result<&'static str> {
    let name = match sample {
        Sample::Lines(_) => NT_SAMPLE_FILE,
        Sample::Items(_) => JSONLD_SAMPLE_FILE,
    };
    let path = output_dir.join(name);
    let mut writer = BufWriter::new(
        File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?,
    );
    match sample {
        Sample::Lines(lines) => {
            for line in lines {
                writeln!(writer, "{}", line)?;
            }
        }
        Sample::Items(items) => {
            let graph: Vec<Value> = items.iter().cloned().map(Value::Object).collect();
            serde_json::to_writer_pretty(&mut writer, &json!({ "@graph": graph }))?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;
    Ok(name)
}

/// Writes every output of a run into `output_dir` and records them in the manifest.
pub fn write_outputs(
    output_dir: &Path,
    store: &EntityStore,
    relationships: &[RelationshipRecord],
    sample: &Sample,
    stats: StatsSnapshot,
) -> Result<ImportManifest> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let mut manifest = ImportManifest {
        stats,
        ..Default::default()
    };

    for kind in EntityKind::ALL {
        if store.count(kind) == 0 {
            continue;
        }
        let file = kind.file_name();
        let rows = write_nodes(&output_dir.join(&file), kind, store.records(kind))?;
        info!(kind = kind.label(), rows, file = %file, "Wrote node file");
        manifest.nodes.insert(kind.collection().to_string(), file);
    }

    if !relationships.is_empty() {
        write_relationships(&output_dir.join(RELATIONSHIPS_FILE), relationships)?;
        info!(rows = relationships.len(), "Wrote relationships file");
        manifest.relationships = Some(RELATIONSHIPS_FILE.to_string());
    }

    if !sample.is_empty() {
        manifest.sample = Some(write_sample(output_dir, sample)?.to_string());
    }

    if store.iter().any(|r| !r.properties.is_empty()) {
        let lines = write_properties(&output_dir.join(PROPERTIES_FILE), store)?;
        info!(lines, "Wrote property blobs");
        manifest.properties = Some(PROPERTIES_FILE.to_string());
    }

    remove_stale_outputs(output_dir, &manifest)?;
    manifest.save(output_dir)?;
    Ok(manifest)
}

/// Every file name `write_outputs` can produce besides the manifest.
fn known_outputs() -> impl Iterator<Item = String> {
    EntityKind::ALL
        .iter()
        .map(EntityKind::file_name)
        .chain(
            [RELATIONSHIPS_FILE, PROPERTIES_FILE, NT_SAMPLE_FILE, JSONLD_SAMPLE_FILE]
                .map(str::to_string),
        )
}

/// Deletes output files left by an earlier run that this run did not write,
/// so the directory only holds files listed in `manifest`.
fn remove_stale_outputs(output_dir: &Path, manifest: &ImportManifest) -> Result<usize> {
    let mut removed = 0;
    for name in known_outputs() {
        if manifest.lists(&name) {
            continue;
        }
        let path = output_dir.join(&name);
        if path.is_file() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale {}", path.display()))?;
            info!(file = %name, "Removed stale output file");
            removed += 1;
        }
    }
    Ok(removed)
}
