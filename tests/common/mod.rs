//! Shared mock collaborators for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use nightwatch::activity::{ActivityError, ActivityLog, AutoReplyRecord};
use nightwatch::error::TransportError;
use nightwatch::identity::PeerId;
use nightwatch::settings::{
    AccountDirectory, AccountId, AccountSettings, SettingsProvider, UserId,
};
use nightwatch::transport::{
    ChatConnection, ChatInfo, ChatKind, ChatTransport, EventSink, InboundEvent, InboundMessage,
    Mention, MessageId, PeerInfo, ReplyRef, SelfIdentity, SendOptions, StoredMessage,
};

// ============================================================================
// Failure injection
// ============================================================================

/// How an injected failure should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    Auth,
    Transient,
    Subscription,
}

impl FailKind {
    pub fn to_error(self) -> TransportError {
        match self {
            Self::Auth => TransportError::Unauthorized("injected".into()),
            Self::Transient => TransportError::Timeout("injected".into()),
            Self::Subscription => TransportError::Subscription("injected".into()),
        }
    }
}

// ============================================================================
// MockTransport
// ============================================================================

/// Connection factory handing out inspectable mock connections.
#[derive(Default)]
pub struct MockTransport {
    connects: AtomicUsize,
    conns: Mutex<HashMap<i64, Arc<MockConnection>>>,
    fail_connect: Mutex<HashMap<i64, FailKind>>,
    poison_subscribe: Mutex<HashMap<i64, FailKind>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The most recent connection handed out for the account.
    pub fn connection(&self, account: AccountId) -> Option<Arc<MockConnection>> {
        self.conns.lock().unwrap().get(&account.0).cloned()
    }

    /// Make every `connect` for the account fail with the given kind.
    pub fn fail_connect(&self, account: AccountId, kind: FailKind) {
        self.fail_connect.lock().unwrap().insert(account.0, kind);
    }

    /// Let `connect` succeed again.
    pub fn allow_connect(&self, account: AccountId) {
        self.fail_connect.lock().unwrap().remove(&account.0);
    }

    /// Hand out connections whose `subscribe` fails for this account.
    pub fn poison_subscribe(&self, account: AccountId, kind: FailKind) {
        self.poison_subscribe
            .lock()
            .unwrap()
            .insert(account.0, kind);
    }

    /// Total successful connects across all accounts.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn connect(&self, account: AccountId) -> Result<Arc<dyn ChatConnection>, TransportError> {
        if let Some(kind) = self.fail_connect.lock().unwrap().get(&account.0).copied() {
            return Err(kind.to_error());
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let conn = Arc::new(MockConnection::new(account));
        if let Some(kind) = self.poison_subscribe.lock().unwrap().get(&account.0).copied() {
            conn.set_fail_subscribe(Some(kind));
        }
        self.conns.lock().unwrap().insert(account.0, conn.clone());
        Ok(conn)
    }
}

// ============================================================================
// MockConnection
// ============================================================================

/// One captured outbound send.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat: PeerId,
    pub text: String,
    pub reply_to: Option<MessageId>,
}

pub struct MockConnection {
    account: AccountId,
    identity: Mutex<SelfIdentity>,
    connected: AtomicBool,
    subscription: Mutex<Option<EventSink>>,
    subscribe_calls: AtomicUsize,
    offline_pushes: AtomicUsize,
    sent: Mutex<Vec<SentMessage>>,
    fail_send: Mutex<Option<FailKind>>,
    fail_subscribe: Mutex<Option<FailKind>>,
    peers: Mutex<HashMap<i64, PeerInfo>>,
    stored: Mutex<HashMap<(i64, i64), StoredMessage>>,
    fail_fetch: AtomicBool,
    unread: Mutex<Vec<InboundMessage>>,
}

impl MockConnection {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            identity: Mutex::new(SelfIdentity {
                id: PeerId::new(account.0),
                username: Some(format!("acct{}", account.0)),
            }),
            connected: AtomicBool::new(true),
            subscription: Mutex::new(None),
            subscribe_calls: AtomicUsize::new(0),
            offline_pushes: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            fail_send: Mutex::new(None),
            fail_subscribe: Mutex::new(None),
            peers: Mutex::new(HashMap::new()),
            stored: Mutex::new(HashMap::new()),
            fail_fetch: AtomicBool::new(false),
            unread: Mutex::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------------
    // Test controls
    // ------------------------------------------------------------------------

    pub fn set_identity(&self, identity: SelfIdentity) {
        *self.identity.lock().unwrap() = identity;
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Simulate the transport silently losing the event handler.
    pub fn drop_subscription(&self) {
        *self.subscription.lock().unwrap() = None;
    }

    pub fn set_fail_send(&self, kind: Option<FailKind>) {
        *self.fail_send.lock().unwrap() = kind;
    }

    pub fn set_fail_subscribe(&self, kind: Option<FailKind>) {
        *self.fail_subscribe.lock().unwrap() = kind;
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn add_peer(&self, peer: PeerInfo) {
        self.peers.lock().unwrap().insert(peer.id.get(), peer);
    }

    pub fn add_stored(&self, chat: PeerId, message: StoredMessage) {
        self.stored
            .lock()
            .unwrap()
            .insert((chat.get(), message.id.0), message);
    }

    pub fn push_unread(&self, message: InboundMessage) {
        self.unread.lock().unwrap().push(message);
    }

    // ------------------------------------------------------------------------
    // Test observations
    // ------------------------------------------------------------------------

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn offline_push_count(&self) -> usize {
        self.offline_pushes.load(Ordering::SeqCst)
    }

    /// Push an inbound message through the attached subscription, as the
    /// network would.
    pub async fn deliver(&self, message: InboundMessage) {
        let sink = self.subscription.lock().unwrap().clone();
        let sink = sink.expect("no subscription attached");
        sink.send(InboundEvent {
            account: self.account,
            message,
        })
        .await
        .expect("event queue closed");
    }
}

#[async_trait]
impl ChatConnection for MockConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn self_identity(&self) -> Result<SelfIdentity, TransportError> {
        Ok(self.identity.lock().unwrap().clone())
    }

    async fn send_message(
        &self,
        chat: PeerId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageId, TransportError> {
        // A real send suspends on the network; model that so concurrent
        // dispatches genuinely interleave.
        tokio::task::yield_now().await;
        if let Some(kind) = *self.fail_send.lock().unwrap() {
            return Err(kind.to_error());
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentMessage {
            chat,
            text: text.to_string(),
            reply_to: opts.reply_to,
        });
        Ok(MessageId(10_000 + sent.len() as i64))
    }

    async fn set_offline(&self) -> Result<(), TransportError> {
        self.offline_pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, sink: EventSink) -> Result<(), TransportError> {
        if let Some(kind) = *self.fail_subscribe.lock().unwrap() {
            return Err(kind.to_error());
        }
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        *self.subscription.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        *self.subscription.lock().unwrap() = None;
        Ok(())
    }

    fn has_subscription(&self) -> bool {
        self.subscription.lock().unwrap().is_some()
    }

    async fn get_message(
        &self,
        chat: PeerId,
        id: MessageId,
    ) -> Result<Option<StoredMessage>, TransportError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout("fetch".into()));
        }
        Ok(self
            .stored
            .lock()
            .unwrap()
            .get(&(chat.get(), id.0))
            .cloned())
    }

    async fn get_peer(&self, id: PeerId) -> Result<PeerInfo, TransportError> {
        self.peers
            .lock()
            .unwrap()
            .get(&id.get())
            .cloned()
            .ok_or_else(|| TransportError::PeerUnavailable(format!("peer {id}")))
    }

    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>, TransportError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout("fetch".into()));
        }
        Ok(std::mem::take(&mut *self.unread.lock().unwrap()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// MockSettings / MockDirectory / MockActivity
// ============================================================================

#[derive(Default)]
pub struct MockSettings {
    settings: Mutex<HashMap<i64, AccountSettings>>,
}

impl MockSettings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, account: AccountId, settings: AccountSettings) {
        self.settings.lock().unwrap().insert(account.0, settings);
    }
}

#[async_trait]
impl SettingsProvider for MockSettings {
    async fn account_settings(&self, account: AccountId) -> Option<AccountSettings> {
        self.settings.lock().unwrap().get(&account.0).cloned()
    }
}

#[derive(Default)]
pub struct MockDirectory {
    accounts: Mutex<Vec<AccountId>>,
    owners: Mutex<HashMap<i64, UserId>>,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, account: AccountId, owner: UserId) {
        self.accounts.lock().unwrap().push(account);
        self.owners.lock().unwrap().insert(account.0, owner);
    }
}

#[async_trait]
impl AccountDirectory for MockDirectory {
    async fn accounts_with_auto_reply(&self) -> Vec<AccountId> {
        self.accounts.lock().unwrap().clone()
    }

    async fn owner_of(&self, account: AccountId) -> Option<UserId> {
        self.owners.lock().unwrap().get(&account.0).copied()
    }
}

#[derive(Default)]
pub struct MockActivity {
    records: Mutex<Vec<AutoReplyRecord>>,
    auth_failures: Mutex<Vec<(AccountId, String)>>,
    fail: AtomicBool,
}

impl MockActivity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<AutoReplyRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn auth_failures(&self) -> Vec<(AccountId, String)> {
        self.auth_failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActivityLog for MockActivity {
    async fn log_auto_reply(&self, record: AutoReplyRecord) -> Result<(), ActivityError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ActivityError("injected".into()));
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn log_auth_failure(
        &self,
        _owner: Option<UserId>,
        account: AccountId,
        detail: &str,
    ) -> Result<(), ActivityError> {
        self.auth_failures
            .lock()
            .unwrap()
            .push((account, detail.to_string()));
        Ok(())
    }
}

// ============================================================================
// Message builders
// ============================================================================

pub fn direct_chat(id: i64) -> ChatInfo {
    ChatInfo {
        id: PeerId::new(id),
        kind: ChatKind::Direct,
        title: None,
    }
}

pub fn group_chat(id: i64) -> ChatInfo {
    ChatInfo {
        id: PeerId::new(id),
        kind: ChatKind::Group,
        title: Some("test group".into()),
    }
}

pub fn dm(id: i64, chat: i64, sender: i64, text: &str) -> InboundMessage {
    InboundMessage {
        id: MessageId(id),
        chat: direct_chat(chat),
        sender: Some(PeerId::new(sender)),
        text: text.to_string(),
        mentions: Vec::new(),
        reply_to: None,
    }
}

pub fn group_message(id: i64, chat: i64, sender: i64, text: &str) -> InboundMessage {
    InboundMessage {
        id: MessageId(id),
        chat: group_chat(chat),
        sender: Some(PeerId::new(sender)),
        text: text.to_string(),
        mentions: Vec::new(),
        reply_to: None,
    }
}

pub fn with_mention(mut message: InboundMessage, mention: Mention) -> InboundMessage {
    message.mentions.push(mention);
    message
}

pub fn with_reply_to(
    mut message: InboundMessage,
    referenced: MessageId,
    author: Option<PeerId>,
) -> InboundMessage {
    message.reply_to = Some(ReplyRef {
        message_id: referenced,
        author,
    });
    message
}

/// Settings with both surfaces enabled and distinct texts.
pub fn full_settings() -> AccountSettings {
    AccountSettings {
        dm_enabled: true,
        dm_message: Some("Away right now".into()),
        groups_enabled: true,
        groups_message: Some("I will get back to you".into()),
    }
}
