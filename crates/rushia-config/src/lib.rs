#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Client configuration for the Rushia task tracker.
//!
//! Layout: `defaults.rs` (baseline values), `model.rs` (typed config and the
//! partial on-disk document), `validate.rs` (parsing/validation helpers),
//! `loader.rs` (file + environment layering).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use model::{ClientConfig, ConfigDocument};
