pub mod memory;
pub mod null_store;
pub mod s3_store;
pub mod traits;

pub use memory::MemoryBlobStore;
pub use null_store::NullBlobStore;
pub use s3_store::S3BlobStore;
pub use traits::BlobStore;
