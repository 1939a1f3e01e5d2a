use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::entities::{Bookmark, NewBookmark, Session};
use crate::domain::errors::CredentialError;
use crate::domain::events::{AuthView, SessionEvent, TableChange, WidgetEvent};

// Routes exposed by the navigation shell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Entry,
    Dashboard,
}

// Port for the external identity provider and its session store.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, String>;

    async fn sign_out(&self) -> Result<(), String>;

    // Session-change feed. Dropping the receiver releases the registration.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

// Port for the bookmarks table behind row-level authorization.
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    async fn insert(&self, bookmark: NewBookmark) -> Result<(), String>;

    async fn delete(&self, id: Uuid) -> Result<(), String>;

    // Rows owned by user_id, created_at descending. The filter is a UI
    // convenience; the store enforces ownership regardless.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Bookmark>, String>;

    // Change feed filtered store-side to one owner's rows, all change kinds.
    // Dropping the receiver closes the subscription.
    async fn subscribe_changes(
        &self,
        user_id: Uuid,
    ) -> Result<broadcast::Receiver<TableChange>, String>;
}

// Port for the delegated credential widget. Credential validation and error
// display live entirely behind this trait.
#[async_trait]
pub trait AuthWidget: Send + Sync {
    // Third-party providers offered beside the password form.
    fn providers(&self) -> Vec<String>;

    fn set_view(&self, view: AuthView);

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, CredentialError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, CredentialError>;

    fn events(&self) -> broadcast::Receiver<WidgetEvent>;
}

// Port for the routing shell.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

// Port for retrieving the current time. Store adapters use it to assign
// created_at; tests pin it for deterministic ordering.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
