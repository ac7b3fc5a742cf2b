pub mod models;
mod store;

pub use models::{FileRecord, FileType};
pub use store::{MetadataStore, StoreError};
