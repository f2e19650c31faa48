pub mod memory;
pub mod redis_store;
pub mod traits;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use traits::DedupStore;
