pub mod artifact;
pub mod page;
pub mod phase;
pub mod record;
pub mod status;

pub use artifact::Artifact;
pub use page::{PageClass, PageEvent};
pub use phase::PhaseKind;
pub use record::{ExtractedRecord, RecordField};
pub use status::ReceiptStatus;
