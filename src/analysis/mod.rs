pub mod engine;
pub mod filters;
pub mod overbuy;
pub mod patterns;
pub mod snapshot;
pub mod strategies;
pub mod trace;

pub use engine::{MomentumReport, ScreeningEngine, SeasonReport, StrategyHits};
pub use overbuy::{OverbuyReport, OverbuyScreen, OverbuySignal, TagFilter};
pub use snapshot::{SnapshotLoader, SnapshotSet, SymbolSnapshot};
pub use strategies::{find_strategy, StrategyDef, TargetList};
pub use trace::TraceLog;
