mod files;
mod health;
mod uploads;

pub use files::{get_file, placeholder_image};
pub use health::health;
pub use uploads::{complete_upload, upload_chunk};
