use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::entities::{Bookmark, NewBookmark, Session, User};
use crate::domain::events::{ChangeKind, SessionEvent, TableChange};
use crate::domain::ports::{AuthGateway, BookmarkStore, Clock, Navigator, Route};

pub(crate) fn test_user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        email_confirmed_at: None,
    }
}

pub(crate) fn test_session(email: &str) -> Session {
    session_for(test_user(email))
}

pub(crate) fn session_for(user: User) -> Session {
    Session {
        user,
        access_token: "test-token".to_string(),
    }
}

// Advancing time source so created_at ordering is deterministic in tests.
pub(crate) struct StepClock {
    base: DateTime<Utc>,
    ticks: Mutex<i64>,
}

impl StepClock {
    pub(crate) fn new() -> Self {
        Self {
            base: DateTime::from_timestamp(1_700_000_000, 0).expect("valid test epoch"),
            ticks: Mutex::new(0),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let mut ticks = self.ticks.lock().expect("ticks mutex poisoned");
        *ticks += 1;
        self.base + Duration::seconds(*ticks)
    }
}

// Scripted identity provider; tests set the session and emit change events.
#[derive(Clone)]
pub(crate) struct RecordingAuth {
    session: Arc<Mutex<Option<Session>>>,
    session_tx: broadcast::Sender<SessionEvent>,
    fail_session_check: bool,
    fail_sign_out: bool,
    sign_out_calls: Arc<Mutex<u32>>,
}

impl RecordingAuth {
    pub(crate) fn new() -> Self {
        let (session_tx, _) = broadcast::channel(16);
        Self {
            session: Arc::new(Mutex::new(None)),
            session_tx,
            fail_session_check: false,
            fail_sign_out: false,
            sign_out_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub(crate) fn with_failing_session_check(mut self) -> Self {
        self.fail_session_check = true;
        self
    }

    pub(crate) fn with_failing_sign_out(mut self) -> Self {
        self.fail_sign_out = true;
        self
    }

    pub(crate) async fn set_session(&self, session: Option<Session>) {
        let mut guard = self.session.lock().expect("session mutex poisoned");
        *guard = session;
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.session_tx.send(event);
    }

    pub(crate) fn sign_out_calls(&self) -> u32 {
        *self.sign_out_calls.lock().expect("sign-out mutex poisoned")
    }
}

#[async_trait]
impl AuthGateway for RecordingAuth {
    async fn current_session(&self) -> Result<Option<Session>, String> {
        if self.fail_session_check {
            return Err("session check failed".to_string());
        }
        let guard = self.session.lock().expect("session mutex poisoned");
        Ok(guard.clone())
    }

    async fn sign_out(&self) -> Result<(), String> {
        let mut calls = self.sign_out_calls.lock().expect("sign-out mutex poisoned");
        *calls += 1;
        if self.fail_sign_out {
            return Err("sign out failed".to_string());
        }
        let mut guard = self.session.lock().expect("session mutex poisoned");
        *guard = None;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }
}

#[derive(Clone, Copy, Default)]
pub(crate) struct FailureFlags {
    pub insert: bool,
    pub delete: bool,
    pub list: bool,
    pub subscribe: bool,
}

// Minimal working bookmark table with failure hooks and a per-owner feed.
#[derive(Clone)]
pub(crate) struct RecordingStore {
    rows: Arc<Mutex<Vec<Bookmark>>>,
    clock: Arc<StepClock>,
    feed_tx: broadcast::Sender<TableChange>,
    insert_calls: Arc<Mutex<u32>>,
    list_calls: Arc<Mutex<u32>>,
    failures: FailureFlags,
}

impl RecordingStore {
    pub(crate) fn new() -> Self {
        let (feed_tx, _) = broadcast::channel(64);
        Self {
            rows: Arc::new(Mutex::new(Vec::new())),
            clock: Arc::new(StepClock::new()),
            feed_tx,
            insert_calls: Arc::new(Mutex::new(0)),
            list_calls: Arc::new(Mutex::new(0)),
            failures: FailureFlags::default(),
        }
    }

    pub(crate) fn with_failures(mut self, failures: FailureFlags) -> Self {
        self.failures = failures;
        self
    }

    pub(crate) fn seed_row(&self, user_id: Uuid, title: &str, url: &str) -> Bookmark {
        let bookmark = Bookmark {
            id: Uuid::new_v4(),
            title: title.to_string(),
            url: url.to_string(),
            user_id,
            created_at: self.clock.now(),
        };
        let mut rows = self.rows.lock().expect("rows mutex poisoned");
        rows.push(bookmark.clone());
        bookmark
    }

    pub(crate) fn insert_calls(&self) -> u32 {
        *self.insert_calls.lock().expect("insert-calls mutex poisoned")
    }

    pub(crate) fn list_calls(&self) -> u32 {
        *self.list_calls.lock().expect("list-calls mutex poisoned")
    }

    pub(crate) fn rows_for(&self, user_id: Uuid) -> Vec<Bookmark> {
        let rows = self.rows.lock().expect("rows mutex poisoned");
        rows.iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BookmarkStore for RecordingStore {
    async fn insert(&self, bookmark: NewBookmark) -> Result<(), String> {
        let mut calls = self.insert_calls.lock().expect("insert-calls mutex poisoned");
        *calls += 1;
        drop(calls);
        if self.failures.insert {
            return Err("insert failed".to_string());
        }
        let row = Bookmark {
            id: Uuid::new_v4(),
            title: bookmark.title,
            url: bookmark.url,
            user_id: bookmark.user_id,
            created_at: self.clock.now(),
        };
        let user_id = row.user_id;
        let mut rows = self.rows.lock().expect("rows mutex poisoned");
        rows.push(row);
        drop(rows);
        let _ = self.feed_tx.send(TableChange {
            kind: ChangeKind::Insert,
            user_id,
        });
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), String> {
        if self.failures.delete {
            return Err("delete failed".to_string());
        }
        let mut rows = self.rows.lock().expect("rows mutex poisoned");
        let removed = rows
            .iter()
            .position(|row| row.id == id)
            .map(|index| rows.remove(index));
        drop(rows);
        if let Some(row) = removed {
            let _ = self.feed_tx.send(TableChange {
                kind: ChangeKind::Delete,
                user_id: row.user_id,
            });
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Bookmark>, String> {
        let mut calls = self.list_calls.lock().expect("list-calls mutex poisoned");
        *calls += 1;
        drop(calls);
        if self.failures.list {
            return Err("list failed".to_string());
        }
        let rows = self.rows.lock().expect("rows mutex poisoned");
        let mut owned: Vec<Bookmark> = rows
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn subscribe_changes(
        &self,
        _user_id: Uuid,
    ) -> Result<broadcast::Receiver<TableChange>, String> {
        if self.failures.subscribe {
            return Err("subscribe failed".to_string());
        }
        Ok(self.feed_tx.subscribe())
    }
}

// Records every navigation so tests can assert redirects.
#[derive(Clone)]
pub(crate) struct RecordingNavigator {
    visited: Arc<Mutex<Vec<Route>>>,
}

impl RecordingNavigator {
    pub(crate) fn new() -> Self {
        Self {
            visited: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn visited(&self) -> Vec<Route> {
        self.visited.lock().expect("visited mutex poisoned").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        let mut visited = self.visited.lock().expect("visited mutex poisoned");
        visited.push(route);
    }
}
