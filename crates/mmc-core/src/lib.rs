//! mmc-core: shared types, config schema, and error taxonomy for mmcrypt

pub mod config;
pub mod error;
pub mod jid;
pub mod node;
pub mod types;

pub use config::MmcConfig;
pub use error::{MediaError, MediaResult};
pub use node::{BinaryNode, NodeContent};
pub use types::{MediaReference, MediaType, MessageKey};
