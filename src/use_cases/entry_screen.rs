use crate::domain::events::{AuthView, SessionChange, WidgetEvent};
use crate::domain::ports::{AuthGateway, Navigator, Route};

// What the entry screen decided to display after the session probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryOutcome {
    RedirectToDashboard,
    ShowSignInForm,
}

// Entry/auth screen with injected dependencies. Credential collection is
// delegated to the auth widget; this screen only probes the session and
// tracks the sign-up confirmation notice.
pub struct EntryScreen<A, N> {
    pub auth: A,
    pub navigator: N,
    loading: bool,
    confirm_notice: bool,
}

impl<A, N> EntryScreen<A, N>
where
    A: AuthGateway,
    N: Navigator,
{
    pub fn new(auth: A, navigator: N) -> Self {
        Self {
            auth,
            navigator,
            loading: true,
            confirm_notice: false,
        }
    }

    // Session probe on mount. An existing session redirects to the dashboard
    // and this screen is done; a failed check means "no session", never a
    // hard failure. The form stays hidden until the probe resolves.
    pub async fn resolve(&mut self) -> EntryOutcome {
        match self.auth.current_session().await {
            Ok(Some(_)) => {
                self.navigator.navigate(Route::Dashboard);
                EntryOutcome::RedirectToDashboard
            }
            Ok(None) => {
                self.loading = false;
                EntryOutcome::ShowSignInForm
            }
            Err(err) => {
                tracing::debug!(error = %err, "session check failed, treating as signed out");
                self.loading = false;
                EntryOutcome::ShowSignInForm
            }
        }
    }

    // The two widget reactions this screen owns: a sign-up whose session
    // email is unconfirmed raises the persistent notice, and any view change
    // away from sign-up clears it. Everything else belongs to the widget.
    pub fn on_widget_event(&mut self, event: WidgetEvent) {
        match event {
            WidgetEvent::ViewChanged(view) => {
                if view != AuthView::SignUp {
                    self.confirm_notice = false;
                }
            }
            WidgetEvent::AuthStateChanged {
                change: SessionChange::SignedUp,
                session: Some(session),
            } if session.user.email_confirmed_at.is_none() => {
                self.confirm_notice = true;
            }
            WidgetEvent::AuthStateChanged { .. } => {}
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn shows_confirm_notice(&self) -> bool {
        self.confirm_notice
    }
}
