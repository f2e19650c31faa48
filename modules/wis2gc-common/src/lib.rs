pub mod config;
pub mod error;
pub mod metric_keys;
pub mod notification;

pub use config::Config;
pub use error::Wis2Error;
pub use notification::{
    derive_message_group_id, raw_already_cached_by, ContentBlock, IntegrityBlock, Notification,
    SourceLink,
};
