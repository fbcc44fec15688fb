//! Single-threaded, priority-ordered analysis execution.

pub(crate) mod queue;

pub use queue::{AnalysisHandler, AnalysisPriority, AnalysisQueue};
