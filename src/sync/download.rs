//! The download pass: classify candidates, fetch content tier by tier and
//! reconcile flags of messages that are already cached.

use anyhow::Result;
use std::collections::HashMap;

use crate::config::SyncConfig;
use crate::constants::BODY_SANE_SUGGESTED_SIZE;
use crate::local::LocalFolder;
use crate::mail::{
    FetchProfile, MessageBody, MessageFlags, RemoteMessage, collect_text_parts, is_old_message,
    parse_sent_date,
};
use crate::remote::{FetchResult, RemoteFolder};

use super::classify::{Route, Tier, keep_newest, route, size_tier};
use super::listener::SyncListener;

/// Knobs distinguishing a folder pass from an on-demand fetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    /// Only reconcile flags; never download messages missing locally.
    pub flag_sync_only: bool,
    /// Trim the local folder to its visible limit once done.
    pub purge_to_visible_limit: bool,
    /// High-water mark separating "old" from genuinely new messages.
    pub last_uid: Option<u64>,
}

/// Candidates split into disjoint, ordered work lists.
#[derive(Debug, Default)]
struct Routed {
    unsynced: Vec<RemoteMessage>,
    flags_only: Vec<RemoteMessage>,
}

#[derive(Debug, Default)]
struct Tiers {
    small: Vec<RemoteMessage>,
    large: Vec<RemoteMessage>,
}

/// Mutable state of one pass, threaded through every stage.
struct DownloadPass<'a> {
    folder: &'a str,
    config: &'a SyncConfig,
    local: &'a dyn LocalFolder,
    listener: &'a dyn SyncListener,
    options: DownloadOptions,
    progress: usize,
    todo: usize,
    new_messages: usize,
}

/// Download content for `messages` and reconcile flags.
///
/// Returns the number of downloaded messages that are not marked as seen.
pub async fn download_messages(
    config: &SyncConfig,
    remote: &mut dyn RemoteFolder,
    local: &dyn LocalFolder,
    messages: Vec<RemoteMessage>,
    options: DownloadOptions,
    listener: &dyn SyncListener,
) -> Result<usize> {
    let folder = remote.server_id().to_string();
    if let Some(cutoff) = config.earliest_poll_date {
        tracing::debug!("Only syncing messages after {}", cutoff);
    }

    let mut pass = DownloadPass {
        folder: &folder,
        config,
        local,
        listener,
        options,
        progress: 0,
        todo: 0,
        new_messages: 0,
    };

    let mut routed = pass.classify(remote, messages).await?;
    pass.todo = routed.unsynced.len() + routed.flags_only.len();
    listener.sync_progress(&folder, pass.progress, pass.todo);
    tracing::debug!("SYNC: Have {} unsynced messages", routed.unsynced.len());

    let mut tiers = Tiers::default();
    if !routed.unsynced.is_empty() {
        let visible_limit = local.visible_limit().await?;
        keep_newest(&mut routed.unsynced, visible_limit, |a, b| {
            remote.compare_uids(a, b)
        });
        tracing::debug!(
            "SYNC: About to fetch {} unsynced messages for folder {}",
            routed.unsynced.len(),
            folder
        );
        tiers = pass.fetch_envelopes(remote, &routed.unsynced).await?;
    }
    tracing::debug!(
        "SYNC: Have {} large messages and {} small messages out of {} unsynced messages",
        tiers.large.len(),
        tiers.small.len(),
        routed.unsynced.len()
    );

    pass.download_small(remote, tiers.small).await?;
    pass.download_large(remote, tiers.large).await?;
    pass.refresh_flags(remote, routed.flags_only).await?;

    tracing::debug!(
        "SYNC: Synced remote messages for folder {}, {} new messages",
        folder,
        pass.new_messages
    );

    if options.purge_to_visible_limit {
        for uid in local.purge_to_visible_limit().await? {
            listener.sync_removed_message(&folder, &uid);
        }
    }

    Ok(pass.new_messages)
}

impl DownloadPass<'_> {
    async fn classify(
        &self,
        remote: &mut dyn RemoteFolder,
        messages: Vec<RemoteMessage>,
    ) -> Result<Routed> {
        let mut routed = Routed::default();

        for message in messages {
            let local_flags = if message.is_set(MessageFlags::DELETED) {
                None
            } else if self.local.is_message_present(&message.uid).await? {
                Some(self.local.message_flags(&message.uid).await?)
            } else {
                None
            };

            match route(&message, local_flags, self.options.flag_sync_only) {
                Route::Unsynced => {
                    tracing::trace!("Message with uid {} has not yet been downloaded", message.uid);
                    routed.unsynced.push(message);
                }
                Route::FlagsOnly => {
                    if local_flags.is_some() {
                        let current = self.local.push_state().await?;
                        if let Some(state) = remote.new_push_state(current.as_deref(), &message) {
                            self.local.set_push_state(Some(&state)).await?;
                        }
                    }
                    routed.flags_only.push(message);
                }
                Route::Skip => {
                    tracing::trace!("Skipping message with uid {}", message.uid);
                }
            }
        }

        Ok(routed)
    }

    /// FLAGS + ENVELOPE for the unsynced messages, split by size.
    async fn fetch_envelopes(
        &mut self,
        remote: &mut dyn RemoteFolder,
        unsynced: &[RemoteMessage],
    ) -> Result<Tiers> {
        let profile = FetchProfile::FLAGS | FetchProfile::ENVELOPE;
        let results = remote
            .fetch(unsynced, profile, self.config.max_auto_download_size)
            .await?;

        let mut tiers = Tiers::default();
        let mut push_state = self.local.push_state().await?;

        for result in results {
            let message = match result {
                Ok(message) => message,
                Err(failure) => {
                    tracing::warn!("SYNC: {}", failure);
                    self.advance();
                    continue;
                }
            };

            if let Some(state) = remote.new_push_state(push_state.as_deref(), &message) {
                push_state = Some(state);
            }

            if message.is_set(MessageFlags::DELETED) {
                tracing::trace!(
                    "Newly downloaded message {}:{} was marked deleted on server, skipping",
                    self.folder,
                    message.uid
                );
                self.advance();
                continue;
            }
            if message.older_than(self.config.earliest_poll_date) {
                tracing::debug!("Newly downloaded message {} is older than cutoff, skipping", message.uid);
                self.advance();
                continue;
            }

            match size_tier(&message, self.config.max_auto_download_size) {
                Tier::Small => tiers.small.push(message),
                Tier::Large => tiers.large.push(message),
            }
        }

        self.local.set_push_state(push_state.as_deref()).await?;
        Ok(tiers)
    }

    async fn download_small(
        &mut self,
        remote: &mut dyn RemoteFolder,
        small: Vec<RemoteMessage>,
    ) -> Result<()> {
        if small.is_empty() {
            return Ok(());
        }
        tracing::debug!("SYNC: Fetching {} small messages for folder {}", small.len(), self.folder);

        let results = remote.fetch(&small, FetchProfile::BODY, None).await?;
        for result in results {
            let mut message = match result {
                Ok(message) => message,
                Err(failure) => {
                    tracing::warn!("SYNC: fetch small messages: {}", failure);
                    self.advance();
                    continue;
                }
            };

            if let Some(MessageBody::Raw(raw)) = &message.body
                && let Some(sent) = parse_sent_date(raw)
            {
                message.sent_date = Some(sent);
            }

            if !self.should_import(&message) {
                self.progress += 1;
                continue;
            }

            if let Err(e) = self.local.save_complete_message(&message).await {
                tracing::error!("SYNC: failed to store message {}: {:#}", message.uid, e);
                continue;
            }
            self.progress += 1;
            if !message.is_set(MessageFlags::SEEN) {
                self.new_messages += 1;
            }

            tracing::trace!(
                "About to notify listeners that we got a new small message {}:{}",
                self.folder,
                message.uid
            );
            self.notify_new(&message.uid);
        }

        tracing::debug!("SYNC: Done fetching small messages for folder {}", self.folder);
        Ok(())
    }

    async fn download_large(
        &mut self,
        remote: &mut dyn RemoteFolder,
        large: Vec<RemoteMessage>,
    ) -> Result<()> {
        if large.is_empty() {
            return Ok(());
        }
        tracing::debug!("SYNC: Fetching {} large messages for folder {}", large.len(), self.folder);

        let results = remote.fetch(&large, FetchProfile::STRUCTURE, None).await?;
        for result in results {
            let message = match result {
                Ok(message) => message,
                Err(failure) => {
                    tracing::warn!("SYNC: fetch large messages: {}", failure);
                    self.advance();
                    continue;
                }
            };

            if !self.should_import(&message) {
                self.progress += 1;
                continue;
            }

            let uid = message.uid.clone();
            let stored = if message.body.is_none() {
                self.download_sane_body(remote, message).await
            } else {
                self.download_partial(remote, message).await
            };
            if let Err(e) = stored {
                tracing::warn!("SYNC: failed to download large message {}: {:#}", uid, e);
                self.advance();
                continue;
            }

            self.progress += 1;
            let flags = self.local.message_flags(&uid).await?;
            if !flags.contains(MessageFlags::SEEN) {
                self.new_messages += 1;
            }

            tracing::trace!(
                "About to notify listeners that we got a new large message {}:{}",
                self.folder,
                uid
            );
            self.notify_new(&uid);
        }

        tracing::debug!("SYNC: Done fetching large messages for folder {}", self.folder);
        Ok(())
    }

    /// No structure available: store a bounded prefix of the raw message.
    async fn download_sane_body(
        &self,
        remote: &mut dyn RemoteFolder,
        message: RemoteMessage,
    ) -> Result<()> {
        let limit = self
            .config
            .max_auto_download_size
            .map_or(BODY_SANE_SUGGESTED_SIZE, |max| max.min(BODY_SANE_SUGGESTED_SIZE));

        let fetched = remote
            .fetch(std::slice::from_ref(&message), FetchProfile::BODY_SANE, Some(limit))
            .await?;
        let message = first_fetched(fetched, message)?;
        self.local.save_partial_message(&message).await
    }

    /// Structure available: fetch the viewable parts only.
    async fn download_partial(
        &self,
        remote: &mut dyn RemoteFolder,
        mut message: RemoteMessage,
    ) -> Result<()> {
        if let Some(MessageBody::Structure(structure)) = &message.body {
            let part_ids = collect_text_parts(structure);
            let mut contents = Vec::with_capacity(part_ids.len());
            for part_id in part_ids {
                let content = remote
                    .fetch_part(&message, &part_id, self.config.max_auto_download_size)
                    .await?;
                contents.push((part_id, content));
            }

            if let Some(MessageBody::Structure(structure)) = &mut message.body {
                for (part_id, content) in contents {
                    if let Some(part) = structure.find_mut(&part_id) {
                        part.content = Some(content);
                    }
                }
            }
        }

        self.local.save_partial_message(&message).await
    }

    async fn refresh_flags(
        &mut self,
        remote: &mut dyn RemoteFolder,
        flags_only: Vec<RemoteMessage>,
    ) -> Result<()> {
        tracing::debug!(
            "SYNC: About to sync flags for {} remote messages for folder {}",
            flags_only.len(),
            self.folder
        );

        let undeleted: Vec<RemoteMessage> = flags_only
            .iter()
            .filter(|m| !m.is_set(MessageFlags::DELETED))
            .cloned()
            .collect();

        let mut fetched: HashMap<String, RemoteMessage> = HashMap::new();
        if !undeleted.is_empty() {
            for result in remote.fetch(&undeleted, FetchProfile::FLAGS, None).await? {
                match result {
                    Ok(message) => {
                        fetched.insert(message.uid.clone(), message);
                    }
                    Err(failure) => tracing::warn!("SYNC: fetch flags: {}", failure),
                }
            }
        }

        for listed in &flags_only {
            let current = if listed.is_set(MessageFlags::DELETED) {
                Some(listed)
            } else {
                fetched.get(&listed.uid)
            };

            if let Some(current) = current
                && self.sync_flags(current).await?
            {
                self.listener.sync_flag_changed(self.folder, &current.uid);
            }
            self.advance();
        }

        Ok(())
    }

    /// Mirror remote flags locally. Returns whether anything changed.
    async fn sync_flags(&self, remote_message: &RemoteMessage) -> Result<bool> {
        let uid = &remote_message.uid;
        if !self.local.is_message_present(uid).await? {
            return Ok(false);
        }

        let local_flags = self.local.message_flags(uid).await?;
        if local_flags.contains(MessageFlags::DELETED) {
            return Ok(false);
        }

        let mut changed = false;
        if remote_message.is_set(MessageFlags::DELETED) {
            if self.config.sync_remote_deletions {
                self.local.set_message_flag(uid, MessageFlags::DELETED, true).await?;
                changed = true;
            }
        } else {
            for flag in self.config.sync_flags.iter() {
                let remote_value = remote_message.is_set(flag);
                if remote_value != local_flags.contains(flag) {
                    self.local.set_message_flag(uid, flag, remote_value).await?;
                    changed = true;
                }
            }
        }

        Ok(changed)
    }

    fn should_import(&self, message: &RemoteMessage) -> bool {
        if message.is_set(MessageFlags::DELETED) {
            tracing::debug!("Message {} is deleted, hence not saving", message.uid);
            return false;
        }
        if message.older_than(self.config.earliest_poll_date) {
            tracing::debug!("Message {} is older than cutoff, hence not saving", message.uid);
            return false;
        }
        true
    }

    fn advance(&mut self) {
        self.progress += 1;
        self.listener.sync_progress(self.folder, self.progress, self.todo);
    }

    fn notify_new(&self, uid: &str) {
        self.listener.sync_progress(self.folder, self.progress, self.todo);
        let is_old = is_old_message(uid, self.options.last_uid);
        self.listener.sync_new_message(self.folder, uid, is_old);
    }
}

/// The enriched copy of a single-message fetch; falls back to the request
/// when the remote answered with nothing.
fn first_fetched(results: Vec<FetchResult>, requested: RemoteMessage) -> Result<RemoteMessage> {
    match results.into_iter().next() {
        Some(Ok(message)) => Ok(message),
        Some(Err(failure)) => Err(failure.into()),
        None => Ok(requested),
    }
}
