pub mod images;
pub mod repository;
pub mod service;

pub use images::{ImageBytes, ImageSource, ImageStore, sanitize_file_name};
pub use service::Catalog;
