//! Mail folder synchronization engine.
//!
//! Reconciles a remote mailbox folder with a local message cache: the newest
//! window of messages is downloaded (small ones in full, large ones partially),
//! remote deletions and flag changes are mirrored, and progress is reported
//! through a [`SyncListener`].

pub mod actor;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod local;
pub mod logging;
pub mod mail;
pub mod remote;
pub mod sync;

pub use actor::{SyncActorHandle, SyncCommand, SyncEvent, spawn_sync_actor};
pub use cache::Cache;
pub use config::{Config, SyncConfig};
pub use error::{FetchFailure, SyncError};
pub use local::{LocalFolder, LocalStorage};
pub use remote::{RemoteFolder, RemoteStore};
pub use sync::{FolderSync, NoopListener, SyncListener};
