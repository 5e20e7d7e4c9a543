pub mod audit;
pub mod classifier;
pub mod extractor;
pub mod lenient;
pub mod recommend;
pub mod report;
pub mod savings;
pub mod summary;

pub use crate::domain::model::{AuditSummary, CategoryCounts, ClassificationOutcome};
pub use crate::domain::ports::{CompletionClient, Storage};
pub use crate::utils::error::Result;
