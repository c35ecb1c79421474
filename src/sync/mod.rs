//! Folder synchronization engine.
//!
//! A pass lists the newest window of a remote folder, reconciles deletions,
//! downloads what is missing and mirrors flags into the local store. Results
//! are reported through a [`SyncListener`]; [`FolderSync::synchronize`] never
//! fails to its caller.

pub mod classify;
pub mod download;
pub mod listener;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::{ExpungePolicy, SyncConfig};
use crate::constants::{AUTHENTICATION_FAILURE_REASON, EXTRA_UID_VALIDITY, LOCAL_UID_PREFIX};
use crate::error::{SyncError, is_authentication_failure, root_cause_message};
use crate::local::{LocalFolder, LocalStorage};
use crate::mail::{MoreMessages, RemoteMessage};
use crate::remote::{OpenMode, RemoteFolder, RemoteStore};

use classify::{fetch_window, passes_cutoff};
use download::{DownloadOptions, download_messages};
pub use listener::{NoopListener, SyncListener};

/// Synchronizes the folders of one account between a remote store and the
/// local cache.
pub struct FolderSync {
    account_name: String,
    remote_store: Arc<dyn RemoteStore>,
    storage: Arc<dyn LocalStorage>,
}

impl FolderSync {
    pub fn new(
        account_name: impl Into<String>,
        remote_store: Arc<dyn RemoteStore>,
        storage: Arc<dyn LocalStorage>,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            remote_store,
            storage,
        }
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Run one synchronization pass over `folder`.
    ///
    /// A caller-supplied `remote` must already be open and is left open; a
    /// folder opened here is closed before returning.
    pub async fn synchronize(
        &self,
        folder: &str,
        config: &SyncConfig,
        listener: &dyn SyncListener,
        remote: Option<&mut dyn RemoteFolder>,
    ) {
        tracing::info!("Synchronizing folder {}:{}", self.account_name, folder);

        let mut local: Option<Box<dyn LocalFolder>> = None;
        let mut owned_remote: Option<Box<dyn RemoteFolder>> = None;

        let result = self
            .run_pass(folder, config, listener, remote, &mut local, &mut owned_remote)
            .await;

        if let Err(err) = result {
            self.report_failure(folder, local.as_deref(), listener, &err).await;
        }

        if let Some(mut remote) = owned_remote {
            remote.close().await;
        }
    }

    async fn run_pass(
        &self,
        folder: &str,
        config: &SyncConfig,
        listener: &dyn SyncListener,
        provided: Option<&mut dyn RemoteFolder>,
        local_slot: &mut Option<Box<dyn LocalFolder>>,
        remote_slot: &mut Option<Box<dyn RemoteFolder>>,
    ) -> Result<()> {
        tracing::trace!("SYNC: About to get local folder {}", folder);
        let local: &dyn LocalFolder = &**local_slot.insert(self.storage.folder(folder).await?);
        let folder_name = local.name().await?;
        listener.sync_started(folder);

        let mut last_uid = local.last_uid().await?;
        let mut local_dates = local.all_messages_and_effective_dates().await?;

        let remote: &mut dyn RemoteFolder = match provided {
            Some(remote) => {
                tracing::trace!("SYNC: using provided remote folder {}", folder);
                remote
            }
            None => {
                tracing::trace!("SYNC: About to open remote folder {}", folder);
                let remote = remote_slot.insert(self.remote_store.folder(folder).await?);
                if config.expunge_policy == ExpungePolicy::OnPoll {
                    tracing::debug!("SYNC: Expunging folder {}:{}", self.account_name, folder);
                    remote.open(OpenMode::ReadWrite).await?;
                    remote.expunge().await?;
                }
                remote.open(OpenMode::ReadOnly).await?;
                &mut **remote
            }
        };

        listener.sync_authentication_success();

        if self.check_uid_validity(remote, local).await? {
            last_uid = None;
            local_dates.clear();
        }

        let remote_count = remote.message_count().await?;
        if remote_count < 0 {
            return Err(SyncError::InvalidMessageCount {
                folder: folder.to_string(),
                count: remote_count,
            }
            .into());
        }
        tracing::trace!("SYNC: Remote message count for folder {} is {}", folder, remote_count);

        let visible_limit = match local.visible_limit().await? {
            limit if limit < 0 => config.default_visible_limit,
            limit => limit,
        };
        let cutoff = config.earliest_poll_date;

        let window = fetch_window(remote_count, visible_limit);
        let window_start = window.map_or(1, |(start, _)| start);
        let candidates = match window {
            Some((start, end)) => {
                list_candidates(folder, remote, listener, &local_dates, start, end, cutoff).await?
            }
            None => Vec::new(),
        };

        let mut more_messages = local.more_messages().await?;
        if config.sync_remote_deletions {
            let removed = remove_deleted(folder, local, listener, &local_dates, &candidates).await?;
            if removed > 0 {
                more_messages = MoreMessages::Unknown;
            }
        }

        if more_messages == MoreMessages::Unknown {
            update_more_messages(remote, local, cutoff, window_start).await?;
        }

        let options = DownloadOptions {
            flag_sync_only: false,
            purge_to_visible_limit: true,
            last_uid,
        };
        let new_messages =
            download_messages(config, remote, local, candidates, options, listener).await?;

        let unread = local.unread_message_count().await?;
        listener.folder_status_changed(folder, unread);

        local.set_last_checked(Utc::now()).await?;
        local.set_status(None).await?;

        tracing::debug!(
            "Done synchronizing folder {}:{} ({}) with {} new messages",
            self.account_name,
            folder,
            folder_name,
            new_messages
        );
        listener.sync_finished(folder, remote_count, new_messages);
        tracing::info!("Done synchronizing folder {}:{}", self.account_name, folder);

        Ok(())
    }

    /// Compare the remote UID epoch with the stored one. Returns true when the
    /// local cache was invalidated.
    async fn check_uid_validity(
        &self,
        remote: &mut dyn RemoteFolder,
        local: &dyn LocalFolder,
    ) -> Result<bool> {
        let Some(current) = remote.uid_validity().await? else {
            return Ok(false);
        };
        let current = i64::try_from(current)?;

        match local.folder_extra_number(EXTRA_UID_VALIDITY).await? {
            Some(stored) if stored == current => Ok(false),
            Some(stored) => {
                tracing::warn!(
                    "UIDVALIDITY of {}:{} changed from {} to {}, clearing local messages",
                    self.account_name,
                    remote.server_id(),
                    stored,
                    current
                );
                local.clear_all_messages().await?;
                local.set_folder_extra_number(EXTRA_UID_VALIDITY, current).await?;
                Ok(true)
            }
            None => {
                local.set_folder_extra_number(EXTRA_UID_VALIDITY, current).await?;
                Ok(false)
            }
        }
    }

    async fn report_failure(
        &self,
        folder: &str,
        local: Option<&dyn LocalFolder>,
        listener: &dyn SyncListener,
        err: &anyhow::Error,
    ) {
        if is_authentication_failure(err) {
            tracing::warn!("Authentication failure synchronizing {}:{}", self.account_name, folder);
            listener.sync_failed(folder, AUTHENTICATION_FAILURE_REASON, err);
            return;
        }

        tracing::error!("synchronizeMailbox {}:{}: {:#}", self.account_name, folder, err);
        let message = root_cause_message(err);

        // Without a last-checked time a broken folder would be retried too often.
        if let Some(local) = local
            && let Err(e) = record_failure(local, &message).await
        {
            tracing::error!(
                "Could not set last checked on folder {}:{}: {:#}",
                self.account_name,
                folder,
                e
            );
        }

        listener.sync_failed(folder, &message, err);
        tracing::error!("Failed synchronizing folder {}:{}", self.account_name, folder);
    }

    /// Download a single message in full, outside of a folder pass.
    pub async fn download_message(&self, config: &SyncConfig, folder: &str, uid: &str) -> Result<()> {
        let local = self.storage.folder(folder).await?;
        let mut remote = self.remote_store.folder(folder).await?;

        let result = download_one(config, remote.as_mut(), local.as_ref(), uid).await;
        remote.close().await;
        result
    }
}

async fn download_one(
    config: &SyncConfig,
    remote: &mut dyn RemoteFolder,
    local: &dyn LocalFolder,
    uid: &str,
) -> Result<()> {
    remote.open(OpenMode::ReadOnly).await?;
    let message = remote.get_message(uid).await?;

    let options = DownloadOptions {
        flag_sync_only: false,
        purge_to_visible_limit: false,
        last_uid: None,
    };
    download_messages(config, remote, local, vec![message], options, &NoopListener).await?;
    Ok(())
}

/// List the window and keep the messages surviving the cutoff.
async fn list_candidates(
    folder: &str,
    remote: &mut dyn RemoteFolder,
    listener: &dyn SyncListener,
    local_dates: &HashMap<String, Option<DateTime<Utc>>>,
    start: i64,
    end: i64,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<RemoteMessage>> {
    tracing::trace!("SYNC: About to get messages {} through {} for folder {}", start, end, folder);
    listener.sync_headers_started(folder);

    let listed = remote.get_messages(start, end, cutoff).await?;
    let total = listed.len();

    let mut candidates = Vec::with_capacity(total);
    for (index, message) in listed.into_iter().enumerate() {
        listener.sync_headers_progress(folder, index + 1, total);
        if passes_cutoff(&message, local_dates.get(&message.uid).copied(), cutoff) {
            candidates.push(message);
        }
    }

    tracing::trace!("SYNC: Got {} messages for folder {}", candidates.len(), folder);
    listener.sync_headers_finished(folder, total, candidates.len());
    Ok(candidates)
}

/// Destroy local messages that vanished remotely. Returns how many went.
async fn remove_deleted(
    folder: &str,
    local: &dyn LocalFolder,
    listener: &dyn SyncListener,
    local_dates: &HashMap<String, Option<DateTime<Utc>>>,
    candidates: &[RemoteMessage],
) -> Result<usize> {
    let remote_uids: HashSet<&str> = candidates.iter().map(|m| m.uid.as_str()).collect();

    let mut destroy: Vec<String> = local_dates
        .keys()
        .filter(|uid| !uid.starts_with(LOCAL_UID_PREFIX) && !remote_uids.contains(uid.as_str()))
        .cloned()
        .collect();
    if destroy.is_empty() {
        return Ok(0);
    }
    destroy.sort_by(|a, b| crate::mail::compare_uids(a, b));

    tracing::debug!("SYNC: Removing {} messages gone from folder {}", destroy.len(), folder);
    local.destroy_messages(&destroy).await?;
    for uid in &destroy {
        listener.sync_removed_message(folder, uid);
    }
    Ok(destroy.len())
}

async fn update_more_messages(
    remote: &mut dyn RemoteFolder,
    local: &dyn LocalFolder,
    cutoff: Option<DateTime<Utc>>,
    window_start: i64,
) -> Result<()> {
    let more = if window_start == 1 {
        MoreMessages::False
    } else {
        remote.are_more_messages_available(window_start, cutoff).await?.into()
    };
    local.set_more_messages(more).await
}

async fn record_failure(local: &dyn LocalFolder, message: &str) -> Result<()> {
    local.set_status(Some(message)).await?;
    local.set_last_checked(Utc::now()).await
}
