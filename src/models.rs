mod ids;
mod record;
mod status;

pub use ids::FileId;
pub use record::{Batch, CanonicalRecord};
pub use status::{Status, UnknownStatus};
