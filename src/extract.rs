use crate::config::{ExtractConfig, DEFAULT_JSONLD_CHUNK_SIZE, RESERVOIR_EARLY_STOP_FACTOR};
use crate::jsonld::{open_graph_items, GraphItem};
use crate::models::RelationshipRecord;
use crate::ntriples::{parse_line, Triple};
use crate::relations::{ontology_candidates, Candidate, EdgePolicy, RelationshipExtractor};
use crate::resolve::{triple_role, EntityStore, ItemResolution, TripleRole};
use crate::sampling::{Admission, Sampler};
use crate::scanner::{make_spinner, LineScanner};
use crate::stats::ExtractionStats;
use crate::writer::{write_outputs, ImportManifest, Sample};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    NTriples,
    JsonLd,
}

impl InputFormat {
    /// `.nt` / `.nt.bz2` are N-Triples, `.jsonld` / `.json` are JSON-LD.
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".nt") || name.ends_with(".nt.bz2") {
            Ok(InputFormat::NTriples)
        } else if name.ends_with(".jsonld") || name.ends_with(".json") {
            Ok(InputFormat::JsonLd)
        } else {
            bail!(
                "Unsupported input file: {} (expected .nt, .nt.bz2, .jsonld or .json)",
                path.display()
            )
        }
    }
}

/// Everything one extraction pass produced.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub format: InputFormat,
    pub store: EntityStore,
    pub relationships: Vec<RelationshipRecord>,
    pub sample: Sample,
    pub stats: ExtractionStats,
    /// `None` on a dry run
    pub manifest: Option<ImportManifest>,
}

/// Shared mutable state of a pass: entity maps, edge extractor, counters.
struct Pipeline {
    store: EntityStore,
    extractor: RelationshipExtractor,
    stats: ExtractionStats,
}

impl Pipeline {
    fn new(policy: EdgePolicy) -> Self {
        Self {
            store: EntityStore::new(),
            extractor: RelationshipExtractor::new(policy),
            stats: ExtractionStats::new(),
        }
    }

    fn record_admission(&self, admission: Admission) -> bool {
        match admission {
            Admission::Rejected => false,
            Admission::Appended => {
                self.stats.inc_sampled();
                true
            }
            Admission::Replaced { .. } => {
                self.stats.inc_sampled();
                self.stats.add_replacements(1);
                true
            }
        }
    }

    fn apply_triple(&mut self, triple: &Triple) {
        match triple_role(triple) {
            TripleRole::Type => {
                if let Some((kind, true)) = self
                    .store
                    .apply_type(&triple.subject, triple.object.lexical())
                {
                    self.stats.inc_entities();
                    debug!(kind = kind.label(), uri = %triple.subject, "New entity");
                }
            }
            TripleRole::Relation => {
                let candidate = Candidate::from_triple(
                    &triple.subject,
                    &triple.predicate,
                    triple.object.lexical(),
                );
                self.extractor.offer(&self.store, candidate);
            }
            TripleRole::Attribute => {
                if self.store.set_property(
                    &triple.subject,
                    &triple.predicate,
                    triple.object.lexical(),
                ) {
                    self.stats.inc_property_updates();
                }
            }
            TripleRole::Ignored => {}
        }
    }

    fn apply_item(&mut self, item: &GraphItem) {
        match self.store.apply_graph_item(item) {
            ItemResolution::Created { kind, uri } => {
                self.stats.inc_entities();
                debug!(kind = kind.label(), uri = %uri, "New ontology entity");
                for candidate in ontology_candidates(&uri, item) {
                    self.extractor.offer(&self.store, candidate);
                }
            }
            ItemResolution::Merged { .. } => self.stats.inc_property_updates(),
            ItemResolution::Untyped => debug!("Skipping graph item with no ontology type"),
            ItemResolution::Anonymous => debug!("Skipping graph item without @id"),
        }
    }

    fn finish(mut self) -> (EntityStore, Vec<RelationshipRecord>, ExtractionStats) {
        if self.extractor.policy() == EdgePolicy::Deferred {
            let pending = self.extractor.pending();
            let resolved = self.extractor.finish(&self.store);
            info!(pending, resolved, "Resolved deferred relationships");
        }
        self.stats
            .add_relationships(self.extractor.records().len() as u64);
        self.stats.add_dropped(self.extractor.dropped());
        (self.store, self.extractor.into_records(), self.stats)
    }
}

fn make_sampler<T>(config: &ExtractConfig) -> Sampler<T> {
    let sampler = Sampler::new(config.mode, config.sample_size)
        .with_early_stop(config.early_stop.then_some(RESERVOIR_EARLY_STOP_FACTOR));
    match config.seed {
        Some(seed) => sampler.with_seed(seed),
        None => sampler,
    }
}

/// One forward pass over an N-Triples stream.
fn extract_ntriples(config: &ExtractConfig, pipeline: &mut Pipeline) -> Result<Sample> {
    let spinner = make_spinner("Scanning N-Triples ...");
    let mut scanner =
        LineScanner::open(&config.input, config.chunk_size)?.with_progress(spinner.clone());
    let mut sampler = make_sampler::<String>(config);

    // Chunks never exceed what the sampler can still take, so the scan stops
    // at the line that completes the sample.
    while !sampler.is_exhausted() {
        scanner.set_limit(sampler.remaining());
        let Some(chunk) = scanner.next() else {
            break;
        };
        let chunk =
            chunk.with_context(|| format!("Failed to read {}", config.input.display()))?;
        debug!(chunk = chunk.index, lines = chunk.lines.len(), "Processing chunk");

        for line in chunk.lines {
            let triple = match parse_line(&line) {
                Ok(triple) => triple,
                Err(e) => {
                    pipeline.stats.inc_parse_failures();
                    debug!(error = %e, line = %line, "Skipping malformed line");
                    continue;
                }
            };
            pipeline.stats.inc_valid();
            if pipeline.record_admission(sampler.offer(line)) {
                pipeline.apply_triple(&triple);
            }
        }
    }
    spinner.finish_and_clear();
    if sampler.is_exhausted() {
        info!(seen = sampler.seen(), "Sample complete, stopping scan");
    }

    pipeline
        .stats
        .add_lines(scanner.lines_read(), scanner.skipped());
    info!(
        lines = scanner.lines_read(),
        valid = pipeline.stats.valid(),
        failures = pipeline.stats.failures(),
        sampled = sampler.len(),
        "N-Triples scan finished"
    );
    Ok(Sample::Lines(sampler.into_items()))
}

/// One forward pass over the `@graph` items of a JSON-LD document.
fn extract_jsonld(config: &ExtractConfig, pipeline: &mut Pipeline) -> Result<Sample> {
    let mut items = open_graph_items(&config.input, config.jsonld_direct_limit)?;
    let spinner = make_spinner("Reading JSON-LD graph ...");
    let mut sampler = make_sampler::<GraphItem>(config);
    let mut read = 0usize;

    for result in items.by_ref() {
        if sampler.is_exhausted() {
            info!(seen = sampler.seen(), "Sample complete, stopping scan");
            break;
        }
        read += 1;
        if read % DEFAULT_JSONLD_CHUNK_SIZE == 0 {
            info!(items = read, entities = pipeline.store.total(), "Processing graph items");
            spinner.set_message(format!("{read} graph items"));
        }

        let item = match result {
            Ok(item) => item,
            Err(e) if e.is_fatal() => {
                spinner.finish_and_clear();
                return Err(e)
                    .with_context(|| format!("Failed to read {}", config.input.display()));
            }
            Err(e) => {
                pipeline.stats.inc_parse_failures();
                warn!(error = %e, "Skipping malformed graph item");
                continue;
            }
        };
        pipeline.stats.inc_valid();

        let admission = sampler.offer(item);
        if pipeline.record_admission(admission) {
            let slot = match admission {
                Admission::Replaced { slot } => slot,
                _ => sampler.len() - 1,
            };
            pipeline.apply_item(&sampler.items()[slot]);
        }
    }
    spinner.finish_and_clear();
    if !items.graph_found() {
        warn!(path = %config.input.display(), "JSON-LD document has no @graph array");
    }

    info!(
        items = read,
        valid = pipeline.stats.valid(),
        failures = pipeline.stats.failures(),
        sampled = sampler.len(),
        "JSON-LD scan finished"
    );
    Ok(Sample::Items(sampler.into_items()))
}

/// Runs one extraction pass over `config.input` and, unless this is a dry
/// run, writes the import files into `config.output_dir`.
pub fn run_extraction(config: &ExtractConfig) -> Result<ExtractionOutcome> {
    let format = InputFormat::detect(&config.input)?;
    let start = Instant::now();
    info!(
        input = %config.input.display(),
        format = ?format,
        mode = ?config.mode,
        sample_size = config.sample_size,
        "Starting extraction"
    );

    let mut pipeline = Pipeline::new(config.edge_policy);
    let sample = match format {
        InputFormat::NTriples => extract_ntriples(config, &mut pipeline)?,
        InputFormat::JsonLd => extract_jsonld(config, &mut pipeline)?,
    };
    let (store, relationships, stats) = pipeline.finish();

    info!(
        entities = store.total(),
        relationships = relationships.len(),
        dropped = stats.dropped(),
        duration_secs = start.elapsed().as_secs_f64(),
        "Extraction pass complete"
    );

    let manifest = if config.dry_run {
        info!("Dry run, skipping output files");
        None
    } else {
        Some(write_outputs(
            &config.output_dir,
            &store,
            &relationships,
            &sample,
            stats.snapshot(),
        )?)
    };

    Ok(ExtractionOutcome {
        format,
        store,
        relationships,
        sample,
        stats,
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_formats() {
        let cases = [
            ("dump.nt", InputFormat::NTriples),
            ("dump.NT.BZ2", InputFormat::NTriples),
            ("tbox.jsonld", InputFormat::JsonLd),
            ("graph.json", InputFormat::JsonLd),
        ];
        for (name, expected) in cases {
            assert_eq!(InputFormat::detect(Path::new(name)).unwrap(), expected, "{name}");
        }
    }

    #[test]
    fn detect_rejects_archives() {
        let err = InputFormat::detect(Path::new("dump.rar")).unwrap_err();
        assert!(err.to_string().contains("Unsupported input file"));
        assert!(InputFormat::detect(Path::new("notes.bz2")).is_err());
    }

    #[test]
    fn pipeline_counts_admissions() {
        let pipeline = Pipeline::new(EdgePolicy::Drop);
        assert!(pipeline.record_admission(Admission::Appended));
        assert!(pipeline.record_admission(Admission::Replaced { slot: 0 }));
        assert!(!pipeline.record_admission(Admission::Rejected));
        assert_eq!(pipeline.stats.sampled(), 2);
        assert_eq!(pipeline.stats.replacements(), 1);
    }

    #[test]
    fn pipeline_applies_triples_in_order() {
        let mut pipeline = Pipeline::new(EdgePolicy::Drop);
        for line in [
            "<http://ex/p1> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://schema/Product> .",
            "<http://ex/p1> <http://ex/hasBrand> <http://ex/b1> .",
            "<http://ex/b1> <http://ex/type> <http://schema/Brand> .",
            "<http://ex/p1> <http://ex/hasBrand> <http://ex/b1> .",
            r#"<http://ex/p1> <http://ex/price> "10" ."#,
        ] {
            pipeline.apply_triple(&parse_line(line).unwrap());
        }
        let (store, relationships, stats) = pipeline.finish();
        assert_eq!(store.total(), 2);
        assert_eq!(relationships.len(), 1);
        assert_eq!(stats.dropped(), 1);
        assert_eq!(stats.property_updates(), 1);
    }
}
