pub mod aggregator;
pub mod binge;
pub mod history;
pub mod import;
pub mod normalizer;
pub mod providers;
pub mod resolver;
pub mod scorer;
pub mod seed;

pub use aggregator::Aggregator;
pub use binge::{detect_binge, BingeRun};
pub use import::{ImportManager, ImportOutcome, ImportRun, ImportStatus, Progress, RunState};
pub use resolver::Resolver;
