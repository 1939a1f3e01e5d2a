use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::domain::entities::{Bookmark, NewBookmark, Session, User};
use crate::domain::errors::CredentialError;
use crate::domain::events::{
    AuthView, ChangeKind, SessionChange, SessionEvent, TableChange, WidgetEvent,
};
use crate::domain::ports::{AuthGateway, AuthWidget, BookmarkStore, Clock};

const SESSION_EVENT_CAPACITY: usize = 16;
const FEED_EVENT_CAPACITY: usize = 64;

// System clock adapter used outside of tests.
#[derive(Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct Account {
    user: User,
    password: String,
}

struct BackendInner {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<Session>>,
    bookmarks: Mutex<HashMap<Uuid, Bookmark>>,
    session_tx: broadcast::Sender<SessionEvent>,
    // One change channel per owner keeps the feed filter on the store side.
    feeds: Mutex<HashMap<Uuid, broadcast::Sender<TableChange>>>,
    clock: Arc<dyn Clock>,
}

// In-memory backend standing in for the managed identity provider and the
// bookmarks table. Implements the same capability contracts as the remote
// adapters, including the row-level rule: every table operation is checked
// against the caller's active session, not the client-side filter.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<BackendInner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (session_tx, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            inner: Arc::new(BackendInner {
                accounts: Mutex::new(HashMap::new()),
                current: Mutex::new(None),
                bookmarks: Mutex::new(HashMap::new()),
                session_tx,
                feeds: Mutex::new(HashMap::new()),
                clock,
            }),
        }
    }

    // Marks an account's email as confirmed, standing in for the user
    // clicking the confirmation link.
    pub async fn confirm_email(&self, email: &str) {
        let mut accounts = self.inner.accounts.lock().await;
        if let Some(account) = accounts.get_mut(email) {
            account.user.email_confirmed_at = Some(self.inner.clock.now());
        }
    }

    async fn caller_id(&self) -> Option<Uuid> {
        let current = self.inner.current.lock().await;
        current.as_ref().map(|session| session.user.id)
    }

    async fn notify(&self, user_id: Uuid, kind: ChangeKind) {
        let feeds = self.inner.feeds.lock().await;
        if let Some(sender) = feeds.get(&user_id) {
            let _ = sender.send(TableChange { kind, user_id });
        }
    }

    fn emit_session_event(&self, change: SessionChange, session: Option<Session>) {
        let _ = self.inner.session_tx.send(SessionEvent { change, session });
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthGateway for MemoryBackend {
    async fn current_session(&self) -> Result<Option<Session>, String> {
        let current = self.inner.current.lock().await;
        Ok(current.clone())
    }

    async fn sign_out(&self) -> Result<(), String> {
        let mut current = self.inner.current.lock().await;
        let had_session = current.take().is_some();
        drop(current);
        if had_session {
            self.emit_session_event(SessionChange::SignedOut, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.session_tx.subscribe()
    }
}

#[async_trait]
impl BookmarkStore for MemoryBackend {
    async fn insert(&self, bookmark: NewBookmark) -> Result<(), String> {
        let caller = self
            .caller_id()
            .await
            .ok_or_else(|| "row-level rule: no active session".to_string())?;
        if bookmark.user_id != caller {
            return Err("row-level rule: cannot write rows for another user".to_string());
        }

        let row = Bookmark {
            id: Uuid::new_v4(),
            title: bookmark.title,
            url: bookmark.url,
            user_id: bookmark.user_id,
            created_at: self.inner.clock.now(),
        };
        let mut bookmarks = self.inner.bookmarks.lock().await;
        bookmarks.insert(row.id, row);
        drop(bookmarks);

        self.notify(caller, ChangeKind::Insert).await;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), String> {
        // Rows the caller does not own are invisible to the delete, matching
        // a row-level-secured table: the statement succeeds and affects
        // nothing.
        let Some(caller) = self.caller_id().await else {
            return Ok(());
        };
        let mut bookmarks = self.inner.bookmarks.lock().await;
        let owned = bookmarks
            .get(&id)
            .map(|row| row.user_id == caller)
            .unwrap_or(false);
        if owned {
            bookmarks.remove(&id);
        }
        drop(bookmarks);
        if owned {
            self.notify(caller, ChangeKind::Delete).await;
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Bookmark>, String> {
        let Some(caller) = self.caller_id().await else {
            return Ok(Vec::new());
        };
        let bookmarks = self.inner.bookmarks.lock().await;
        let mut rows: Vec<Bookmark> = bookmarks
            .values()
            .filter(|row| row.user_id == user_id && row.user_id == caller)
            .cloned()
            .collect();
        drop(bookmarks);
        // created_at descending; id as a stable tie-break.
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(rows)
    }

    async fn subscribe_changes(
        &self,
        user_id: Uuid,
    ) -> Result<broadcast::Receiver<TableChange>, String> {
        let mut feeds = self.inner.feeds.lock().await;
        let sender = feeds
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(FEED_EVENT_CAPACITY).0);
        Ok(sender.subscribe())
    }
}

// Credential widget over the in-memory backend. Owns credential validation
// and the widget event stream; the entry screen only reacts to the events.
#[derive(Clone)]
pub struct MemoryAuthWidget {
    backend: MemoryBackend,
    providers: Vec<String>,
    widget_tx: broadcast::Sender<WidgetEvent>,
}

impl MemoryAuthWidget {
    pub fn new(backend: MemoryBackend, providers: Vec<String>) -> Self {
        let (widget_tx, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            backend,
            providers,
            widget_tx,
        }
    }

    fn emit(&self, event: WidgetEvent) {
        let _ = self.widget_tx.send(event);
    }

    async fn install_session(&self, user: User, change: SessionChange) -> Session {
        let session = Session {
            user,
            access_token: Uuid::new_v4().to_string(),
        };
        let mut current = self.backend.inner.current.lock().await;
        *current = Some(session.clone());
        drop(current);
        self.backend
            .emit_session_event(change, Some(session.clone()));
        self.emit(WidgetEvent::AuthStateChanged {
            change,
            session: Some(session.clone()),
        });
        session
    }
}

#[async_trait]
impl AuthWidget for MemoryAuthWidget {
    fn providers(&self) -> Vec<String> {
        self.providers.clone()
    }

    fn set_view(&self, view: AuthView) {
        self.emit(WidgetEvent::ViewChanged(view));
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, CredentialError> {
        let accounts = self.backend.inner.accounts.lock().await;
        let user = match accounts.get(email) {
            Some(account) if account.password == password => account.user.clone(),
            _ => return Err(CredentialError::InvalidCredentials),
        };
        drop(accounts);
        Ok(self.install_session(user, SessionChange::SignedIn).await)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, CredentialError> {
        let mut accounts = self.backend.inner.accounts.lock().await;
        if accounts.contains_key(email) {
            return Err(CredentialError::EmailTaken);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            email_confirmed_at: None,
        };
        accounts.insert(
            email.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        drop(accounts);
        Ok(self.install_session(user, SessionChange::SignedUp).await)
    }

    fn events(&self) -> broadcast::Receiver<WidgetEvent> {
        self.widget_tx.subscribe()
    }
}
