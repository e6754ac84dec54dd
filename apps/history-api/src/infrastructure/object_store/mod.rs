//! Object Store Adapters
//!
//! Implementations of [`ObjectStore`](crate::application::ports::ObjectStore):
//! an S3/R2-compatible bucket and a local directory.

mod local;
mod s3;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;
