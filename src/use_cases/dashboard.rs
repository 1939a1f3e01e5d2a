use tokio::sync::{broadcast, mpsc, watch};
use url::Url;
use uuid::Uuid;

use crate::domain::entities::{Bookmark, NewBookmark, User};
use crate::domain::events::{SessionEvent, TableChange};
use crate::domain::ports::{AuthGateway, BookmarkStore, Navigator, Route};

// Commands the shell feeds into a running dashboard.
#[derive(Clone, Debug)]
pub enum DashboardCommand {
    SetTitle(String),
    SetUrl(String),
    Submit,
    Delete(Uuid),
    SignOut,
}

// Render snapshot published after every handled event. While user_email is
// None the shell renders a loading placeholder only; the form and list are
// never shown without a confirmed user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DashboardView {
    pub user_email: Option<String>,
    pub bookmarks: Vec<Bookmark>,
    pub pending_create: bool,
    pub title_field: String,
    pub url_field: String,
}

// How a session-change notification was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Unchanged,
    UserChanged,
    SignedOut,
}

// Live-sync subscription slot. Idle means no feed is open, either because
// there is no user yet or because the feed went away.
enum FeedState {
    Live(broadcast::Receiver<TableChange>),
    Idle,
}

// Dashboard screen: one user's bookmark collection kept consistent against
// two independent asynchronous sources (session changes and the table change
// feed), plus create/delete/sign-out actions. All mutations are followed by
// a wholesale re-fetch; local state is replaced, never patched.
pub struct DashboardScreen<A, S, N> {
    pub auth: A,
    pub store: S,
    pub navigator: N,
    user: Option<User>,
    bookmarks: Vec<Bookmark>,
    pending_create: bool,
    title_field: String,
    url_field: String,
}

impl<A, S, N> DashboardScreen<A, S, N>
where
    A: AuthGateway,
    S: BookmarkStore,
    N: Navigator,
{
    pub fn new(auth: A, store: S, navigator: N) -> Self {
        Self {
            auth,
            store,
            navigator,
            user: None,
            bookmarks: Vec::new(),
            pending_create: false,
            title_field: String::new(),
            url_field: String::new(),
        }
    }

    // Initialization protocol: session probe, then the initial snapshot.
    // Returns false when there is no session and the screen redirected.
    // A failed probe counts as "no session".
    pub async fn mount(&mut self) -> bool {
        let session = match self.auth.current_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.navigator.navigate(Route::Entry);
                return false;
            }
            Err(err) => {
                tracing::debug!(error = %err, "session check failed, treating as signed out");
                self.navigator.navigate(Route::Entry);
                return false;
            }
        };
        self.user = Some(session.user);
        self.refresh().await;
        true
    }

    // Event loop. The session listener lives for the whole screen lifetime
    // and the feed subscription for one user identity; both are receivers
    // dropped on every exit path out of this function.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<DashboardCommand>,
        updates: watch::Sender<DashboardView>,
    ) {
        if !self.mount().await {
            let _ = updates.send(self.view());
            return;
        }
        let mut session_events = self.auth.subscribe();
        let mut feed = self.open_feed().await;
        let _ = updates.send(self.view());

        loop {
            tokio::select! {
                event = session_events.recv() => {
                    let outcome = match event {
                        Ok(event) => self.apply_session_event(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "missed session events, re-checking session");
                            self.recheck_session().await
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            // The provider is gone; treat it as a sign-out so
                            // the shell lands back on the entry route.
                            tracing::warn!("session event stream closed");
                            self.apply_session_event(SessionEvent {
                                change: crate::domain::events::SessionChange::SignedOut,
                                session: None,
                            });
                            break;
                        }
                    };
                    match outcome {
                        SessionOutcome::SignedOut => break,
                        SessionOutcome::UserChanged => {
                            // Close the old subscription before the new one
                            // activates, then build the new user's snapshot.
                            feed = FeedState::Idle;
                            feed = self.open_feed().await;
                            self.refresh().await;
                        }
                        SessionOutcome::Unchanged => {}
                    }
                }
                notice = Self::next_change(&mut feed) => {
                    match notice {
                        // Any signal, regardless of row or kind, triggers a
                        // wholesale re-fetch. A lagged receiver missed some
                        // notifications, which the re-fetch absorbs anyway.
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            self.refresh().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::warn!("change feed closed, live updates disabled");
                            feed = FeedState::Idle;
                        }
                    }
                }
                command = commands.recv() => {
                    match command {
                        None => break,
                        Some(DashboardCommand::SetTitle(title)) => self.set_title(title),
                        Some(DashboardCommand::SetUrl(url)) => self.set_url(url),
                        Some(DashboardCommand::Submit) => self.submit_create().await,
                        Some(DashboardCommand::Delete(id)) => self.delete(id).await,
                        Some(DashboardCommand::SignOut) => {
                            self.sign_out().await;
                            break;
                        }
                    }
                }
            }
            let _ = updates.send(self.view());
        }
        let _ = updates.send(self.view());
    }

    // Applies one session-change notification. Loss of the session discards
    // the snapshot and redirects; a new identity discards the snapshot and
    // asks the caller to rebuild the live-sync subscription.
    pub fn apply_session_event(&mut self, event: SessionEvent) -> SessionOutcome {
        match event.session {
            None => {
                self.user = None;
                self.bookmarks.clear();
                self.navigator.navigate(Route::Entry);
                SessionOutcome::SignedOut
            }
            Some(session) => {
                let changed = self.user.as_ref().map(|user| user.id) != Some(session.user.id);
                if changed {
                    self.bookmarks.clear();
                }
                self.user = Some(session.user);
                if changed {
                    SessionOutcome::UserChanged
                } else {
                    SessionOutcome::Unchanged
                }
            }
        }
    }

    // Fallback after missed session events: ask the provider directly.
    async fn recheck_session(&mut self) -> SessionOutcome {
        match self.auth.current_session().await {
            Ok(Some(session)) => self.apply_session_event(SessionEvent {
                change: crate::domain::events::SessionChange::TokenRefreshed,
                session: Some(session),
            }),
            Ok(None) | Err(_) => self.apply_session_event(SessionEvent {
                change: crate::domain::events::SessionChange::SignedOut,
                session: None,
            }),
        }
    }

    // Wholesale re-fetch: replace the snapshot with the server-ordered
    // collection for the current user. A failed fetch keeps the last
    // snapshot; the worst case is a stale display until the next signal.
    pub async fn refresh(&mut self) {
        let Some(user_id) = self.user.as_ref().map(|user| user.id) else {
            return;
        };
        match self.store.list_for_user(user_id).await {
            Ok(bookmarks) => self.bookmarks = bookmarks,
            Err(err) => {
                tracing::warn!(error = %err, "bookmark fetch failed, keeping last snapshot");
            }
        }
    }

    // Create operation. Empty fields, a relative URL, or a missing user make
    // this a silent no-op with no insert issued. The pending flag and the
    // form fields are cleared whether or not the insert succeeds, and the
    // re-fetch runs either way; it may race the feed-driven one, which is
    // harmless since both produce the same server snapshot.
    pub async fn submit_create(&mut self) {
        let Some(user_id) = self.user.as_ref().map(|user| user.id) else {
            return;
        };
        let title = self.title_field.trim().to_string();
        let url = self.url_field.trim().to_string();
        if title.is_empty() || url.is_empty() {
            return;
        }
        if Url::parse(&url).is_err() {
            // Absolute URLs only, relative fragments are rejected.
            return;
        }

        self.pending_create = true;
        let result = self
            .store
            .insert(NewBookmark {
                title,
                url,
                user_id,
            })
            .await;
        self.title_field.clear();
        self.url_field.clear();
        self.pending_create = false;
        if let Err(err) = result {
            tracing::warn!(error = %err, "bookmark insert failed");
        }
        self.refresh().await;
    }

    // Delete operation. Ownership is enforced store-side; the re-fetch is
    // guarded by user presence.
    pub async fn delete(&mut self, id: Uuid) {
        if let Err(err) = self.store.delete(id).await {
            tracing::warn!(error = %err, bookmark_id = %id, "bookmark delete failed");
        }
        if self.user.is_some() {
            self.refresh().await;
        }
    }

    // Sign-out: fire the request, then navigate immediately. The session
    // listener will observe the same transition; the explicit navigation is
    // a redundant-but-harmless fast path.
    pub async fn sign_out(&mut self) {
        if let Err(err) = self.auth.sign_out().await {
            tracing::warn!(error = %err, "sign out failed");
        }
        self.user = None;
        self.bookmarks.clear();
        self.navigator.navigate(Route::Entry);
    }

    async fn open_feed(&self) -> FeedState {
        let Some(user_id) = self.user.as_ref().map(|user| user.id) else {
            return FeedState::Idle;
        };
        match self.store.subscribe_changes(user_id).await {
            Ok(receiver) => FeedState::Live(receiver),
            Err(err) => {
                tracing::warn!(error = %err, "change feed unavailable, live updates disabled");
                FeedState::Idle
            }
        }
    }

    async fn next_change(feed: &mut FeedState) -> Result<TableChange, broadcast::error::RecvError> {
        match feed {
            FeedState::Live(receiver) => receiver.recv().await,
            FeedState::Idle => std::future::pending().await,
        }
    }

    pub fn set_title(&mut self, title: String) {
        self.title_field = title;
    }

    pub fn set_url(&mut self, url: String) {
        self.url_field = url;
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn is_pending_create(&self) -> bool {
        self.pending_create
    }

    pub fn view(&self) -> DashboardView {
        DashboardView {
            user_email: self.user.as_ref().map(|user| user.email.clone()),
            bookmarks: self.bookmarks.clone(),
            pending_create: self.pending_create,
            title_field: self.title_field.clone(),
            url_field: self.url_field.clone(),
        }
    }
}
