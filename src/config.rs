use crate::relations::EdgePolicy;
use crate::sampling::SamplingMode;
use std::path::PathBuf;

/// Default number of items kept in the output sample
pub const DEFAULT_SAMPLE_SIZE: usize = 10_000;

/// N-Triples data lines handed to the pipeline per scanner chunk
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// JSON-LD graph items between progress reports
pub const DEFAULT_JSONLD_CHUNK_SIZE: usize = 1_000;

/// Progress update interval (tick every N raw lines)
pub const PROGRESS_INTERVAL: u64 = 100_000;

/// Reservoir sampling stops once `valid items >= sample size * factor`
pub const RESERVOIR_EARLY_STOP_FACTOR: u64 = 10;

/// JSON-LD files below this size are parsed as one document
pub const JSONLD_DIRECT_PARSE_LIMIT: u64 = 500 * 1024 * 1024;

/// Buffer size for CSV writers
pub const CSV_BUFFER_SIZE: usize = 128 * 1024;

pub const DEFAULT_BOLT_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_NEO4J_USER: &str = "neo4j";
pub const DEFAULT_NEO4J_DATABASE: &str = "neo4j";

/// Neo4j LOAD CSV reads from its own import directory
pub const DEFAULT_IMPORT_PREFIX: &str = "file://";

pub const IMPORT_MAX_RETRIES: u32 = 10;
pub const IMPORT_RETRY_DELAY_SECS: u64 = 3;

/// Rows per transaction for `CALL { ... } IN TRANSACTIONS`
pub const IMPORT_BATCH_ROWS: u32 = 5_000;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Settings for one extraction run over a single input file.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub sample_size: usize,
    pub chunk_size: usize,
    pub mode: SamplingMode,
    /// Fixed seed for reservoir sampling; entropy-seeded when `None`
    pub seed: Option<u64>,
    pub early_stop: bool,
    pub edge_policy: EdgePolicy,
    pub jsonld_direct_limit: u64,
    pub dry_run: bool,
}

impl ExtractConfig {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            mode: SamplingMode::Head,
            seed: None,
            early_stop: true,
            edge_policy: EdgePolicy::Drop,
            jsonld_direct_limit: JSONLD_DIRECT_PARSE_LIMIT,
            dry_run: false,
        }
    }
}
