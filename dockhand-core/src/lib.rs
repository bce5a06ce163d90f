//! Dockhand core library — domain types, documents, errors.
//!
//! - [`types`] — service names, actions, parsed change records
//! - [`settings`] — the repository's own `settings.yml`
//! - [`config`] — the daemon's `~/.dockhand/config.yaml`
//! - [`error`] — [`CoreError`]

pub mod config;
pub mod error;
pub mod settings;
pub mod types;

pub use config::{Admission, Config, HttpConfig};
pub use error::CoreError;
pub use settings::Settings;
pub use types::{
    Action, ChangeRecord, ChangeStatus, ServiceName, ServicePath, COMPOSE_FILE, ENV_FILE,
    SETTINGS_FILE,
};
