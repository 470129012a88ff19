//! Configuration for lakemeta
//!
//! Centralized configuration with sensible defaults. Table-level constants
//! (partition keys, primary keys, bucket count) live in the schema, not here;
//! this struct only tunes how a process reads and writes a table.

/// Main configuration for a table handle
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Layout Configuration
    // -------------------------------------------------------------------------
    /// Bucket count written into the schema of newly created tables
    /// (schema option `bucket`). Existing tables keep their own value.
    pub default_buckets: u32,

    /// Extension of data files produced by the built-in row writer
    pub file_extension: String,

    // -------------------------------------------------------------------------
    // Write Configuration
    // -------------------------------------------------------------------------
    /// Rows per data file before the writer rolls to a new file
    pub target_file_rows: usize,

    /// fsync data and metadata files before publishing them
    pub sync_writes: bool,

    // -------------------------------------------------------------------------
    // Commit Configuration
    // -------------------------------------------------------------------------
    /// Max entries per manifest file before the coordinator rolls a new one
    pub manifest_target_entries: usize,

    /// Retries after `ConcurrentModification` before surfacing it
    pub commit_max_retries: usize,

    /// Base backoff between commit retries (milliseconds, doubled per attempt)
    pub commit_retry_backoff_ms: u64,

    /// Recorded as `commitUser` in every snapshot
    pub commit_user: String,

    // -------------------------------------------------------------------------
    // Scan Configuration
    // -------------------------------------------------------------------------
    /// Worker threads used to read manifest files during a scan
    pub scan_parallelism: usize,

    /// Check that every live data file exists before returning a plan
    pub verify_files: bool,

    /// Extensions recognised by the best-effort raw directory scan
    pub raw_scan_extensions: Vec<String>,

    /// Objects kept per kind in the metadata cache before the oldest are evicted
    pub metadata_cache_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_buckets: 1,
            file_extension: "row".to_string(),
            target_file_rows: 100_000,
            sync_writes: true,
            manifest_target_entries: 1024,
            commit_max_retries: 10,
            commit_retry_backoff_ms: 10,
            commit_user: "lakemeta".to_string(),
            scan_parallelism: 4,
            verify_files: true,
            raw_scan_extensions: ["orc", "parquet", "avro", "row"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            metadata_cache_entries: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the bucket count for newly created tables
    pub fn default_buckets(mut self, buckets: u32) -> Self {
        self.config.default_buckets = buckets;
        self
    }

    /// Set the data file extension
    pub fn file_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.file_extension = ext.into();
        self
    }

    /// Set the number of rows per data file
    pub fn target_file_rows(mut self, rows: usize) -> Self {
        self.config.target_file_rows = rows;
        self
    }

    /// Enable or disable fsync on writes
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Set the max entries per manifest file
    pub fn manifest_target_entries(mut self, entries: usize) -> Self {
        self.config.manifest_target_entries = entries;
        self
    }

    /// Set the number of commit retries
    pub fn commit_max_retries(mut self, retries: usize) -> Self {
        self.config.commit_max_retries = retries;
        self
    }

    /// Set the commit retry backoff (in milliseconds)
    pub fn commit_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.commit_retry_backoff_ms = ms;
        self
    }

    /// Set the commit user recorded in snapshots
    pub fn commit_user(mut self, user: impl Into<String>) -> Self {
        self.config.commit_user = user.into();
        self
    }

    /// Set the number of manifest reader threads
    pub fn scan_parallelism(mut self, threads: usize) -> Self {
        self.config.scan_parallelism = threads;
        self
    }

    /// Enable or disable data file existence checks during scans
    pub fn verify_files(mut self, verify: bool) -> Self {
        self.config.verify_files = verify;
        self
    }

    /// Set the extensions recognised by raw directory scans
    pub fn raw_scan_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.raw_scan_extensions = exts.into_iter().map(Into::into).collect();
        self
    }

    /// Cap the number of cached snapshots, schemas, manifests and manifest lists
    pub fn metadata_cache_entries(mut self, entries: usize) -> Self {
        self.config.metadata_cache_entries = entries;
        self
    }

    /// Build the config, rejecting values that would make the engine stall
    pub fn build(self) -> crate::Result<Config> {
        let config = self.config;
        if config.default_buckets == 0 {
            return Err(crate::LakeError::Config(
                "default_buckets must be at least 1".to_string(),
            ));
        }
        if config.manifest_target_entries == 0 {
            return Err(crate::LakeError::Config(
                "manifest_target_entries must be at least 1".to_string(),
            ));
        }
        if config.metadata_cache_entries == 0 {
            return Err(crate::LakeError::Config(
                "metadata_cache_entries must be at least 1".to_string(),
            ));
        }
        if config.target_file_rows == 0 {
            return Err(crate::LakeError::Config(
                "target_file_rows must be at least 1".to_string(),
            ));
        }
        if config.file_extension.is_empty() || config.file_extension.contains('/') {
            return Err(crate::LakeError::Config(format!(
                "invalid file extension '{}'",
                config.file_extension
            )));
        }
        Ok(config)
    }
}
