pub mod builders;
pub mod fakes;

use std::sync::{Arc, Once};
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use snapwatch::diff::{ChangeSelector, Differ};
use snapwatch::engine::{Engine, WorkerLimits};
use snapwatch::exec::JobExecutor;
use snapwatch::fetch::{Fetcher, FetcherSet};
use snapwatch::store::SnapshotStore;
use snapwatch::types::ReferenceSelection;

pub use builders::{ConfigFileBuilder, JobConfigBuilder};
pub use fakes::{
    CountingDiffer, FailingReporter, FailingStore, FakeFetcher, PanickingFetcher,
    RecordingReporter,
};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Engine wired to a scripted fetcher: no retry delay, small fixed pools.
pub fn test_engine(
    store: Arc<dyn SnapshotStore>,
    fetcher: Arc<dyn Fetcher>,
    differ: Arc<dyn Differ>,
    reference_selection: ReferenceSelection,
) -> Engine {
    let executor =
        JobExecutor::new(FetcherSet::uniform(fetcher)).with_retry_base(Duration::ZERO);
    let selector = ChangeSelector::new(differ, reference_selection, 3);
    Engine::new(store, executor, selector, WorkerLimits { light: 4, heavy: 1 })
}
