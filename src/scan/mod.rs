pub mod coordinator;

pub use coordinator::{working_set, ClassificationError, ScanCoordinator};
