pub mod record;
pub mod store;

pub use record::{
    AlignedWord, JobStatus, TranslationJob, Unit, UnitPatch, UnitStatus, Variant,
};
pub use store::{InMemoryJobStore, JobStore, StoreError};
