use uuid::Uuid;

use crate::domain::entities::Session;

// Session transitions reported by the identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn,
    SignedUp,
    SignedOut,
    TokenRefreshed,
}

// One session-change notification delivered to listeners.
#[derive(Clone, Debug)]
pub struct SessionEvent {
    pub change: SessionChange,
    pub session: Option<Session>,
}

// Change kinds on the bookmarks table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

// Feed notification for one owner's rows. Carries no row payload on purpose;
// consumers re-fetch the whole collection instead of patching.
#[derive(Clone, Debug)]
pub struct TableChange {
    pub kind: ChangeKind,
    pub user_id: Uuid,
}

// Views the credential widget can display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthView {
    SignIn,
    SignUp,
}

// Events emitted by the delegated credential widget.
#[derive(Clone, Debug)]
pub enum WidgetEvent {
    ViewChanged(AuthView),
    AuthStateChanged {
        change: SessionChange,
        session: Option<Session>,
    },
}
