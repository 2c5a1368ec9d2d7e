pub mod deleter;
pub mod downloader;
pub mod error;
pub mod metadata_service;
pub mod object_service;
pub mod uploader;

#[cfg(test)]
mod test_support;

pub use downloader::DEFAULT_DOWNLOAD_CONCURRENCY;
pub use error::{ObjectError, ObjectResult};
pub use object_service::{ObjectLocator, ObjectService, UploadRequest};
