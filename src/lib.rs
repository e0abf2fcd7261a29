pub mod encode;
pub mod error;
pub mod filter;
pub mod hook;
pub mod layer;
pub mod queue;
pub mod record;
pub mod redact;
pub mod sink;

#[cfg(feature = "postgres")]
pub mod postgres;

pub mod env;
pub mod init;
pub mod noop_sink;
