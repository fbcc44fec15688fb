pub mod analysis;
pub mod analyzer;
pub mod buffer;
pub mod config;
pub mod content;
pub mod diagnostics;
pub mod entry;
pub mod error;
pub mod parse;

pub use analysis::{AnalysisHandler, AnalysisPriority, AnalysisQueue};
pub use analyzer::Analyzer;
pub use buffer::{ChangeEvent, ChangeListener, TextBuffer};
pub use config::AnalyzerSettings;
pub use content::{Cookie, TextContent, TextSnapshot};
pub use diagnostics::{Diagnostic, DiagnosticsSink, NullDiagnosticsSink, Severity, Span};
pub use entry::{AnalysisEntry, EntryRegistry};
pub use error::PipelineError;
pub use parse::{ParseOutput, Parser, SyntaxTree};
