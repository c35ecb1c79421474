//! In-memory remote folder, local folder and listener used by engine tests.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mail_builder::MessageBuilder;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::LOCAL_UID_PREFIX;
use crate::error::{FetchFailure, SyncError};
use crate::local::{LocalFolder, LocalStorage};
use crate::mail::{
    BodyPart, FetchProfile, MessageBody, MessageFlags, MoreMessages, RemoteMessage, compare_uids,
};
use crate::remote::{FetchResult, OpenMode, RemoteFolder, RemoteStore};

use super::listener::SyncListener;

pub const FOLDER: &str = "INBOX";

/// 2024-01-01 00:00:00 UTC plus `days`.
pub fn day(days: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(days)
}

pub fn raw_message(subject: &str, date: DateTime<Utc>) -> Vec<u8> {
    MessageBuilder::new()
        .date(date.timestamp())
        .from("alice@localhost")
        .to("bob@localhost")
        .subject(subject)
        .text_body(format!("Body of {subject}"))
        .write_to_vec()
        .unwrap()
}

/// A message as the fake server stores it.
#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub message: RemoteMessage,
    pub raw: Vec<u8>,
    pub structure: Option<BodyPart>,
    pub parts: HashMap<String, Vec<u8>>,
}

impl FakeMessage {
    pub fn new(uid: impl Into<String>) -> Self {
        let uid = uid.into();
        let date = day(30);
        let raw = raw_message(&format!("Message {uid}"), date);

        let mut message = RemoteMessage::new(uid);
        message.size = raw.len() as u64;
        message.internal_date = Some(date);
        message.sent_date = Some(date);

        Self {
            message,
            raw,
            structure: None,
            parts: HashMap::new(),
        }
    }

    pub fn flags(mut self, flags: MessageFlags) -> Self {
        self.message.flags = flags;
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.message.size = size;
        self
    }

    pub fn dated(mut self, date: DateTime<Utc>) -> Self {
        self.message.internal_date = Some(date);
        self.message.sent_date = Some(date);
        self.raw = raw_message(&format!("Message {}", self.message.uid), date);
        self
    }

    /// multipart/mixed with a text body and a PDF attachment.
    pub fn with_text_structure(mut self) -> Self {
        self.structure = Some(BodyPart::multipart(
            "TEXT",
            "multipart/mixed",
            vec![
                BodyPart::leaf("1", "text/plain", 64),
                BodyPart::leaf("2", "application/pdf", 900_000).with_disposition("attachment"),
            ],
        ));
        self.parts
            .insert("1".to_string(), b"Text part of a large message".to_vec());
        self
    }

    fn listed(&self) -> RemoteMessage {
        RemoteMessage {
            body: None,
            ..self.message.clone()
        }
    }
}

#[derive(Debug, Default)]
pub struct RemoteState {
    /// Index + 1 is the message number.
    pub messages: Vec<FakeMessage>,
    pub reject_login: bool,
    pub count_override: Option<i64>,
    pub uid_validity: Option<u64>,
    pub more_available: bool,
    pub push_enabled: bool,
    pub failing_profile: Option<FetchProfile>,
    pub failing_uids: HashSet<String>,
    pub fetches: Vec<(FetchProfile, Vec<String>)>,
    pub part_fetches: Vec<(String, String)>,
    pub log: Vec<String>,
}

impl RemoteState {
    fn find(&self, uid: &str) -> Option<&FakeMessage> {
        self.messages.iter().find(|m| m.message.uid == uid)
    }
}

/// Fake server handing out folders that share one state.
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn with_messages(messages: Vec<FakeMessage>) -> Self {
        let remote = Self::default();
        remote.state().messages = messages;
        remote
    }

    pub fn numbered(count: u32) -> Self {
        Self::with_messages((1..=count).map(|n| FakeMessage::new(n.to_string())).collect())
    }

    pub fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap()
    }

    pub fn folder(&self) -> FakeRemoteFolder {
        FakeRemoteFolder {
            server_id: FOLDER.to_string(),
            state: self.state.clone(),
        }
    }

    pub fn fetched(&self, profile: FetchProfile) -> Vec<Vec<String>> {
        self.state()
            .fetches
            .iter()
            .filter(|(p, _)| *p == profile)
            .map(|(_, uids)| uids.clone())
            .collect()
    }

    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn folder(&self, server_id: &str) -> Result<Box<dyn RemoteFolder>> {
        Ok(Box::new(FakeRemoteFolder {
            server_id: server_id.to_string(),
            state: self.state.clone(),
        }))
    }
}

pub struct FakeRemoteFolder {
    server_id: String,
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemoteFolder {
    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl RemoteFolder for FakeRemoteFolder {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    async fn exists(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn open(&mut self, mode: OpenMode) -> Result<()> {
        let mut state = self.state();
        if state.reject_login {
            return Err(SyncError::AuthenticationFailed("bad credentials".to_string()).into());
        }
        state.log.push(format!("open:{:?}", mode));
        Ok(())
    }

    async fn close(&mut self) {
        self.state().log.push("close".to_string());
    }

    async fn message_count(&mut self) -> Result<i64> {
        let state = self.state();
        Ok(state.count_override.unwrap_or(state.messages.len() as i64))
    }

    async fn uid_validity(&mut self) -> Result<Option<u64>> {
        Ok(self.state().uid_validity)
    }

    async fn get_messages(
        &mut self,
        start: i64,
        end: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteMessage>> {
        let state = self.state();
        let from = usize::try_from(start - 1)?;
        let to = usize::try_from(end)?.min(state.messages.len());

        Ok(state.messages[from..to]
            .iter()
            .filter(|m| !m.message.older_than(since))
            .map(FakeMessage::listed)
            .collect())
    }

    async fn get_message(&mut self, uid: &str) -> Result<RemoteMessage> {
        match self.state().find(uid) {
            Some(message) => Ok(message.listed()),
            None => Err(SyncError::MessageNotFound {
                folder: self.server_id.clone(),
                uid: uid.to_string(),
            }
            .into()),
        }
    }

    async fn fetch(
        &mut self,
        messages: &[RemoteMessage],
        profile: FetchProfile,
        max_download_size: Option<u64>,
    ) -> Result<Vec<FetchResult>> {
        let mut state = self.state();
        let uids: Vec<String> = messages.iter().map(|m| m.uid.clone()).collect();
        state.fetches.push((profile, uids));

        if state.failing_profile == Some(profile) {
            bail!("connection reset during fetch");
        }

        let mut results = Vec::new();
        for requested in messages {
            if state.failing_uids.contains(&requested.uid) {
                results.push(Err(FetchFailure::new(&requested.uid, "unparseable response")));
                continue;
            }
            let Some(stored) = state.find(&requested.uid) else {
                results.push(Err(FetchFailure::new(&requested.uid, "no such message")));
                continue;
            };

            let mut fetched = stored.listed();
            if profile.contains(FetchProfile::BODY) {
                fetched.body = Some(MessageBody::Raw(stored.raw.clone()));
            } else if profile.contains(FetchProfile::BODY_SANE) {
                let limit = max_download_size
                    .and_then(|max| usize::try_from(max).ok())
                    .unwrap_or(usize::MAX)
                    .min(stored.raw.len());
                fetched.body = Some(MessageBody::Raw(stored.raw[..limit].to_vec()));
            } else if profile.contains(FetchProfile::STRUCTURE) {
                fetched.body = stored.structure.clone().map(MessageBody::Structure);
            }
            results.push(Ok(fetched));
        }

        Ok(results)
    }

    async fn fetch_part(
        &mut self,
        message: &RemoteMessage,
        part_id: &str,
        _max_download_size: Option<u64>,
    ) -> Result<Vec<u8>> {
        let mut state = self.state();
        state
            .part_fetches
            .push((message.uid.clone(), part_id.to_string()));
        match state.find(&message.uid).and_then(|m| m.parts.get(part_id)) {
            Some(content) => Ok(content.clone()),
            None => bail!("part {} of {} missing", part_id, message.uid),
        }
    }

    async fn are_more_messages_available(
        &mut self,
        window_start: i64,
        _since: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut state = self.state();
        state.log.push(format!("more_messages:{window_start}"));
        Ok(state.more_available)
    }

    async fn expunge(&mut self) -> Result<()> {
        let mut state = self.state();
        state.log.push("expunge".to_string());
        state
            .messages
            .retain(|m| !m.message.is_set(MessageFlags::DELETED));
        Ok(())
    }

    fn new_push_state(&self, current: Option<&str>, message: &RemoteMessage) -> Option<String> {
        if !self.state().push_enabled {
            return None;
        }
        // Highest uid seen so far, as "uidNext=N".
        let next = message.uid.parse::<u64>().ok()? + 1;
        let current = current
            .and_then(|s| s.strip_prefix("uidNext="))
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0);
        (next > current).then(|| format!("uidNext={next}"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalRecord {
    pub flags: MessageFlags,
    pub date: Option<DateTime<Utc>>,
    pub saved: Option<RemoteMessage>,
}

#[derive(Debug)]
pub struct LocalState {
    pub messages: BTreeMap<String, LocalRecord>,
    pub visible_limit: i32,
    pub more_messages: MoreMessages,
    pub push_state: Option<String>,
    pub extras: HashMap<String, i64>,
    pub last_checked: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub fail_bookkeeping: bool,
    pub calls: Vec<String>,
}

impl Default for LocalState {
    fn default() -> Self {
        Self {
            messages: BTreeMap::new(),
            visible_limit: 10,
            more_messages: MoreMessages::Unknown,
            push_state: None,
            extras: HashMap::new(),
            last_checked: None,
            status: None,
            fail_bookkeeping: false,
            calls: Vec::new(),
        }
    }
}

/// Local store whose every folder shares one state.
#[derive(Clone, Default)]
pub struct FakeLocal {
    state: Arc<Mutex<LocalState>>,
}

impl FakeLocal {
    pub fn with_visible_limit(limit: i32) -> Self {
        let local = Self::default();
        local.state().visible_limit = limit;
        local
    }

    pub fn state(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap()
    }

    /// Seed a downloaded message.
    pub fn insert(&self, uid: &str, flags: MessageFlags, date: Option<DateTime<Utc>>) {
        self.state().messages.insert(
            uid.to_string(),
            LocalRecord {
                flags,
                date,
                saved: None,
            },
        );
    }

    pub fn uids(&self) -> Vec<String> {
        self.state().messages.keys().cloned().collect()
    }

    pub fn flags(&self, uid: &str) -> Option<MessageFlags> {
        self.state().messages.get(uid).map(|r| r.flags)
    }

    pub fn called(&self, name: &str) -> bool {
        self.state().calls.iter().any(|c| c.starts_with(name))
    }

    pub fn calls_named(&self, name: &str) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(name))
            .cloned()
            .collect()
    }

    fn save(&self, message: &RemoteMessage, state_flag: MessageFlags, call: &str) {
        let mut state = self.state();
        state.calls.push(format!("{call}:{}", message.uid));
        let flags = (message.flags - MessageFlags::LOCAL_ONLY) | state_flag;
        state.messages.insert(
            message.uid.clone(),
            LocalRecord {
                flags,
                date: message.effective_date(),
                saved: Some(message.clone()),
            },
        );
    }
}

#[async_trait]
impl LocalStorage for FakeLocal {
    async fn folder(&self, server_id: &str) -> Result<Box<dyn LocalFolder>> {
        self.state().calls.push(format!("open_folder:{server_id}"));
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl LocalFolder for FakeLocal {
    async fn name(&self) -> Result<String> {
        Ok("Inbox".to_string())
    }

    async fn last_uid(&self) -> Result<Option<u64>> {
        Ok(self
            .state()
            .messages
            .keys()
            .filter_map(|uid| uid.parse::<u64>().ok())
            .max())
    }

    async fn all_messages_and_effective_dates(
        &self,
    ) -> Result<HashMap<String, Option<DateTime<Utc>>>> {
        Ok(self
            .state()
            .messages
            .iter()
            .map(|(uid, record)| (uid.clone(), record.date))
            .collect())
    }

    async fn visible_limit(&self) -> Result<i32> {
        Ok(self.state().visible_limit)
    }

    async fn more_messages(&self) -> Result<MoreMessages> {
        Ok(self.state().more_messages)
    }

    async fn set_more_messages(&self, more_messages: MoreMessages) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("set_more_messages:{}", more_messages.as_str()));
        state.more_messages = more_messages;
        Ok(())
    }

    async fn is_message_present(&self, uid: &str) -> Result<bool> {
        Ok(self.state().messages.contains_key(uid))
    }

    async fn message_flags(&self, uid: &str) -> Result<MessageFlags> {
        Ok(self.flags(uid).unwrap_or_default())
    }

    async fn set_message_flag(&self, uid: &str, flag: MessageFlags, value: bool) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("set_message_flag:{uid}"));
        if let Some(record) = state.messages.get_mut(uid) {
            record.flags.set(flag, value);
        }
        Ok(())
    }

    async fn save_complete_message(&self, message: &RemoteMessage) -> Result<()> {
        self.save(message, MessageFlags::DOWNLOADED_FULL, "save_complete");
        Ok(())
    }

    async fn save_partial_message(&self, message: &RemoteMessage) -> Result<()> {
        self.save(message, MessageFlags::DOWNLOADED_PARTIAL, "save_partial");
        Ok(())
    }

    async fn destroy_messages(&self, uids: &[String]) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("destroy:{}", uids.join(",")));
        for uid in uids {
            state.messages.remove(uid);
        }
        Ok(())
    }

    async fn clear_all_messages(&self) -> Result<()> {
        let mut state = self.state();
        state.calls.push("clear_all".to_string());
        state.messages.clear();
        Ok(())
    }

    async fn purge_to_visible_limit(&self) -> Result<Vec<String>> {
        let mut state = self.state();
        state.calls.push("purge".to_string());
        let Ok(limit) = usize::try_from(state.visible_limit) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut uids: Vec<String> = state
            .messages
            .keys()
            .filter(|uid| !uid.starts_with(LOCAL_UID_PREFIX))
            .cloned()
            .collect();
        uids.sort_by(|a, b| compare_uids(b, a));

        let removed: Vec<String> = uids.into_iter().skip(limit).collect();
        for uid in &removed {
            state.messages.remove(uid);
        }
        Ok(removed)
    }

    async fn push_state(&self) -> Result<Option<String>> {
        Ok(self.state().push_state.clone())
    }

    async fn set_push_state(&self, push_state: Option<&str>) -> Result<()> {
        let mut state = self.state();
        state.calls.push("set_push_state".to_string());
        state.push_state = push_state.map(str::to_string);
        Ok(())
    }

    async fn unread_message_count(&self) -> Result<usize> {
        Ok(self
            .state()
            .messages
            .values()
            .filter(|r| !r.flags.intersects(MessageFlags::SEEN | MessageFlags::DELETED))
            .count())
    }

    async fn set_last_checked(&self, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state();
        state.calls.push("set_last_checked".to_string());
        if state.fail_bookkeeping {
            bail!("database is locked");
        }
        state.last_checked = Some(at);
        Ok(())
    }

    async fn set_status(&self, status: Option<&str>) -> Result<()> {
        let mut state = self.state();
        state.calls.push("set_status".to_string());
        if state.fail_bookkeeping {
            bail!("database is locked");
        }
        state.status = status.map(str::to_string);
        Ok(())
    }

    async fn folder_extra_number(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.state().extras.get(key).copied())
    }

    async fn set_folder_extra_number(&self, key: &str, value: i64) -> Result<()> {
        self.state().extras.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started,
    AuthenticationSuccess,
    HeadersFinished { completed: usize, total: usize },
    NewMessage { uid: String, is_old: bool },
    Removed(String),
    FlagChanged(String),
    FolderStatus(usize),
    Finished { total: i64, new: usize },
    Failed(String),
}

/// Records every milestone except progress ticks, which go to `progress`.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
    progress: Mutex<Vec<(usize, usize)>>,
}

impl RecordingListener {
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<(usize, usize)> {
        self.progress.lock().unwrap().clone()
    }

    pub fn new_messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::NewMessage { uid, .. } => Some(uid),
                _ => None,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Removed(uid) => Some(uid),
                _ => None,
            })
            .collect()
    }

    pub fn flag_changes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::FlagChanged(uid) => Some(uid),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Option<(i64, usize)> {
        self.events().into_iter().find_map(|e| match e {
            Event::Finished { total, new } => Some((total, new)),
            _ => None,
        })
    }

    pub fn failure(&self) -> Option<String> {
        self.events().into_iter().find_map(|e| match e {
            Event::Failed(reason) => Some(reason),
            _ => None,
        })
    }
}

impl SyncListener for RecordingListener {
    fn sync_started(&self, _folder: &str) {
        self.push(Event::Started);
    }

    fn sync_authentication_success(&self) {
        self.push(Event::AuthenticationSuccess);
    }

    fn sync_headers_finished(&self, _folder: &str, completed: usize, total: usize) {
        self.push(Event::HeadersFinished { completed, total });
    }

    fn sync_progress(&self, _folder: &str, completed: usize, total: usize) {
        self.progress.lock().unwrap().push((completed, total));
    }

    fn sync_new_message(&self, _folder: &str, uid: &str, is_old: bool) {
        self.push(Event::NewMessage {
            uid: uid.to_string(),
            is_old,
        });
    }

    fn sync_removed_message(&self, _folder: &str, uid: &str) {
        self.push(Event::Removed(uid.to_string()));
    }

    fn sync_flag_changed(&self, _folder: &str, uid: &str) {
        self.push(Event::FlagChanged(uid.to_string()));
    }

    fn folder_status_changed(&self, _folder: &str, unread_count: usize) {
        self.push(Event::FolderStatus(unread_count));
    }

    fn sync_finished(&self, _folder: &str, total_count: i64, new_count: usize) {
        self.push(Event::Finished {
            total: total_count,
            new: new_count,
        });
    }

    fn sync_failed(&self, _folder: &str, reason: &str, _cause: &anyhow::Error) {
        self.push(Event::Failed(reason.to_string()));
    }
}
