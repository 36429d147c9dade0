pub mod backend;
pub mod bucket;
pub mod local;
pub mod types;
pub mod uri;

pub use backend::{BackendType, BatchItem, S3Provider, StorageBackend};
pub use bucket::{BucketBackend, S3Options};
pub use local::LocalBackend;
pub use types::*;
pub use uri::{Endpoints, Location, RemoteLocation, RemoteScheme};
