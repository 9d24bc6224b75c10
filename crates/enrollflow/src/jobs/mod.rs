pub mod handlers;
pub mod model;
pub mod processor;
pub mod repo;
pub mod store;

pub use handlers::{EnrollmentHandler, ItemError, RosterHandler};
pub use model::{
    EnrollmentItem, FailedItem, JobProgress, JobStatus, ProgressSummary, ProgressViolation,
    SucceededItem,
};
pub use processor::{BatchProcessor, ProcessorConfig};
pub use repo::PgProgressRepo;
pub use store::{MemoryProgressStore, ProgressStore};
