//! Runtime configuration. Mirrors the shape of the teacher's
//! `SchedulerBuilder`: a plain builder that accumulates settings and
//! produces an immutable config consumed once at `Runtime` construction.

const DEFAULT_BUCKET_COUNT: usize = 1023;

/// Tunables for a `Runtime`. None of these affect correctness, only
/// memory/latency trade-offs, matching spec.md's framing of the pool and
/// bucket count as performance knobs rather than semantic ones.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Bucket count for every per-parent dependency hash table (§4.2).
    /// Should be prime so the mixing in `GlobalPtr::slot` spreads evenly;
    /// not enforced, only documented.
    pub bucket_count: usize,
    /// Number of worker threads for `worker::RayonWorkerPool::with_config`.
    /// `None` uses rayon's own default (number of logical CPUs).
    pub worker_threads: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            worker_threads: None,
        }
    }
}

/// Builds a `RuntimeConfig`. Exists mainly so construction reads the same
/// way the teacher's `SchedulerBuilder::new().with(sys).build(...)` chain
/// does, rather than a bare struct literal.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket_count(mut self, count: usize) -> Self {
        assert!(count > 0, "bucket_count must be nonzero");
        self.config.bucket_count = count;
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = Some(threads);
        self
    }

    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}
