//! Per-account scheduler: runs synchronization passes one at a time.
//!
//! The actor owns the command queue of an account, so no two passes ever
//! touch the same folder concurrently. Listener callbacks are forwarded to
//! the embedding application as [`SyncEvent`]s.

pub mod retry;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Interval, MissedTickBehavior};

use crate::config::{Config, SchedulerSettings, SyncSettings};
use crate::constants::{COMMAND_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY};
use crate::error::is_authentication_failure;
use crate::sync::{FolderSync, SyncListener};

use retry::{RetryConfig, with_retry_if};

/// Commands sent TO the sync actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    SyncFolder { folder: String },
    /// Download one message in full, retrying transient failures
    FetchMessage { folder: String, uid: String },
    /// Synchronize every configured folder
    SyncAll,
    Shutdown,
}

/// Events sent FROM the sync actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    SyncStarted { folder: String },
    AuthenticationSuccess,
    HeadersFinished { folder: String, completed: usize, total: usize },
    Progress { folder: String, completed: usize, total: usize },
    NewMessage { folder: String, uid: String, is_old: bool },
    MessageRemoved { folder: String, uid: String },
    FlagChanged { folder: String, uid: String },
    FolderStatus { folder: String, unread: usize },
    SyncFinished { folder: String, total: i64, new_messages: usize },
    SyncFailed { folder: String, reason: String },
    MessageFetched { folder: String, uid: String },
    MessageFetchFailed { folder: String, uid: String, error: String },
}

/// Handle for controlling the sync actor
pub struct SyncActorHandle {
    pub cmd_tx: mpsc::Sender<SyncCommand>,
    pub event_rx: mpsc::Receiver<SyncEvent>,
}

/// Forwards listener callbacks into a bounded channel.
///
/// Never blocks a pass: events that do not fit are dropped.
pub struct ChannelListener {
    tx: mpsc::Sender<SyncEvent>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::Sender<SyncEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: SyncEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::debug!("Dropping sync event: {}", e);
        }
    }
}

impl SyncListener for ChannelListener {
    fn sync_started(&self, folder: &str) {
        self.send(SyncEvent::SyncStarted {
            folder: folder.to_string(),
        });
    }

    fn sync_authentication_success(&self) {
        self.send(SyncEvent::AuthenticationSuccess);
    }

    fn sync_headers_finished(&self, folder: &str, completed: usize, total: usize) {
        self.send(SyncEvent::HeadersFinished {
            folder: folder.to_string(),
            completed,
            total,
        });
    }

    fn sync_progress(&self, folder: &str, completed: usize, total: usize) {
        self.send(SyncEvent::Progress {
            folder: folder.to_string(),
            completed,
            total,
        });
    }

    fn sync_new_message(&self, folder: &str, uid: &str, is_old: bool) {
        self.send(SyncEvent::NewMessage {
            folder: folder.to_string(),
            uid: uid.to_string(),
            is_old,
        });
    }

    fn sync_removed_message(&self, folder: &str, uid: &str) {
        self.send(SyncEvent::MessageRemoved {
            folder: folder.to_string(),
            uid: uid.to_string(),
        });
    }

    fn sync_flag_changed(&self, folder: &str, uid: &str) {
        self.send(SyncEvent::FlagChanged {
            folder: folder.to_string(),
            uid: uid.to_string(),
        });
    }

    fn folder_status_changed(&self, folder: &str, unread_count: usize) {
        self.send(SyncEvent::FolderStatus {
            folder: folder.to_string(),
            unread: unread_count,
        });
    }

    fn sync_finished(&self, folder: &str, total_count: i64, new_count: usize) {
        self.send(SyncEvent::SyncFinished {
            folder: folder.to_string(),
            total: total_count,
            new_messages: new_count,
        });
    }

    fn sync_failed(&self, folder: &str, reason: &str, _cause: &anyhow::Error) {
        self.send(SyncEvent::SyncFailed {
            folder: folder.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Spawn the sync actor for one account and return a handle to control it.
///
/// With a non-zero poll interval every configured folder is synchronized
/// right away and then once per interval.
pub fn spawn_sync_actor(engine: Arc<FolderSync>, config: &Config) -> SyncActorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(sync_actor(
        engine,
        config.sync.clone(),
        config.scheduler.clone(),
        cmd_rx,
        event_tx,
    ));

    SyncActorHandle { cmd_tx, event_rx }
}

async fn sync_actor(
    engine: Arc<FolderSync>,
    sync: SyncSettings,
    scheduler: SchedulerSettings,
    mut cmd_rx: mpsc::Receiver<SyncCommand>,
    event_tx: mpsc::Sender<SyncEvent>,
) {
    let listener = ChannelListener::new(event_tx);
    let retry = RetryConfig::from(&scheduler);
    let mut poll = poll_timer(scheduler.poll_interval_secs);

    tracing::info!("Sync actor started for {}", engine.account_name());

    loop {
        let cmd = tokio::select! {
            cmd = cmd_rx.recv() => cmd,
            _ = next_poll(&mut poll) => Some(SyncCommand::SyncAll),
        };

        match cmd {
            Some(SyncCommand::Shutdown) => {
                tracing::info!("Sync actor for {} shutting down", engine.account_name());
                break;
            }
            Some(cmd) => {
                handle_command(&engine, &sync, &scheduler, &retry, &listener, cmd).await;
            }
            None => {
                tracing::info!("Command channel closed, shutting down");
                break;
            }
        }
    }
}

async fn handle_command(
    engine: &FolderSync,
    sync: &SyncSettings,
    scheduler: &SchedulerSettings,
    retry: &RetryConfig,
    listener: &ChannelListener,
    cmd: SyncCommand,
) {
    match cmd {
        SyncCommand::SyncFolder { folder } => {
            let config = sync.to_sync_config(Utc::now());
            engine.synchronize(&folder, &config, listener, None).await;
        }
        SyncCommand::SyncAll => {
            let config = sync.to_sync_config(Utc::now());
            for folder in &scheduler.folders {
                engine.synchronize(folder, &config, listener, None).await;
            }
        }
        SyncCommand::FetchMessage { folder, uid } => {
            let config = sync.to_sync_config(Utc::now());
            let result = with_retry_if(
                retry,
                |e: &anyhow::Error| !is_authentication_failure(e),
                || engine.download_message(&config, &folder, &uid),
            )
            .await;

            match result {
                Ok(()) => listener.send(SyncEvent::MessageFetched { folder, uid }),
                Err(e) => {
                    tracing::warn!("Fetching message {} of {} failed: {:#}", uid, folder, e);
                    listener.send(SyncEvent::MessageFetchFailed {
                        folder,
                        uid,
                        error: format!("{:#}", e),
                    });
                }
            }
        }
        SyncCommand::Shutdown => {}
    }
}

fn poll_timer(interval_secs: u64) -> Option<Interval> {
    if interval_secs == 0 {
        return None;
    }
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn next_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
