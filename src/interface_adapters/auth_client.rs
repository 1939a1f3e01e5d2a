use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::domain::entities::{Session, User};
use crate::domain::errors::CredentialError;
use crate::domain::events::{AuthView, SessionChange, SessionEvent, WidgetEvent};
use crate::domain::ports::{AuthGateway, AuthWidget};

const SESSION_EVENT_CAPACITY: usize = 16;

#[derive(Debug, Serialize)]
struct CredentialRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: Uuid,
    email: String,
    email_confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    access_token: String,
    user: UserPayload,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

impl SessionResponse {
    fn into_session(self) -> Session {
        Session {
            user: User {
                id: self.user.id,
                email: self.user.email,
                email_confirmed_at: self.user.email_confirmed_at,
            },
            access_token: self.access_token,
        }
    }
}

// Thin reqwest client for a remote identity service. Implements both the
// gateway the screens consume and the credential widget, since the remote
// service owns credential validation end to end.
#[derive(Clone)]
pub struct AuthServiceClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<Mutex<Option<String>>>,
    providers: Vec<String>,
    session_tx: broadcast::Sender<SessionEvent>,
    widget_tx: broadcast::Sender<WidgetEvent>,
}

impl AuthServiceClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        providers: Vec<String>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let (session_tx, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        let (widget_tx, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Ok(Self {
            http,
            base_url: base_url.into(),
            token: Arc::new(Mutex::new(None)),
            providers,
            session_tx,
            widget_tx,
        })
    }

    // The remote service has no push channel for session changes, so expiry
    // is observed by polling the session endpoint and emitting transitions.
    pub fn spawn_session_watch(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last_identity: Option<Uuid> = None;
            loop {
                ticker.tick().await;
                match client.current_session().await {
                    Ok(Some(session)) => {
                        let identity = session.user.id;
                        if last_identity != Some(identity) {
                            last_identity = Some(identity);
                            let _ = client.session_tx.send(SessionEvent {
                                change: SessionChange::SignedIn,
                                session: Some(session),
                            });
                        }
                    }
                    Ok(None) => {
                        if last_identity.take().is_some() {
                            let _ = client.session_tx.send(SessionEvent {
                                change: SessionChange::SignedOut,
                                session: None,
                            });
                        }
                    }
                    // Transient upstream trouble is not a sign-out.
                    Err(err) => {
                        tracing::debug!(error = %err, "session watch probe failed");
                    }
                }
            }
        })
    }

    async fn submit_credentials(
        &self,
        path: &str,
        email: &str,
        password: &str,
        change: SessionChange,
    ) -> Result<Session, CredentialError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(url)
            .json(&CredentialRequest { email, password })
            .send()
            .await
            .map_err(|_| CredentialError::UpstreamUnavailable)?;

        match response.status() {
            status if status.is_success() => {
                let session = response
                    .json::<SessionResponse>()
                    .await
                    .map_err(|_| CredentialError::UpstreamUnavailable)?
                    .into_session();
                let mut token = self.token.lock().await;
                *token = Some(session.access_token.clone());
                drop(token);
                let _ = self.session_tx.send(SessionEvent {
                    change,
                    session: Some(session.clone()),
                });
                let _ = self.widget_tx.send(WidgetEvent::AuthStateChanged {
                    change,
                    session: Some(session.clone()),
                });
                Ok(session)
            }
            StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => {
                Err(CredentialError::InvalidCredentials)
            }
            StatusCode::CONFLICT => Err(CredentialError::EmailTaken),
            status => {
                if let Ok(error) = response.json::<ErrorResponse>().await {
                    tracing::warn!(%status, message = %error.message, "identity service error");
                }
                Err(CredentialError::UpstreamUnavailable)
            }
        }
    }
}

#[async_trait]
impl AuthGateway for AuthServiceClient {
    async fn current_session(&self) -> Result<Option<Session>, String> {
        let token = {
            let guard = self.token.lock().await;
            guard.clone()
        };
        let Some(token) = token else {
            return Ok(None);
        };

        let url = format!("{}/auth/session", self.base_url);
        let response = self
            .http
            .post(url)
            .json(&TokenRequest { token: &token })
            .send()
            .await
            .map_err(|err| format!("identity service unreachable: {err}"))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            // Expired or revoked upstream; forget the local token.
            let mut guard = self.token.lock().await;
            *guard = None;
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(format!("identity service error: {}", response.status()));
        }
        let session = response
            .json::<SessionResponse>()
            .await
            .map_err(|err| format!("malformed session payload: {err}"))?;
        Ok(Some(session.into_session()))
    }

    async fn sign_out(&self) -> Result<(), String> {
        let token = {
            let mut guard = self.token.lock().await;
            guard.take()
        };
        let _ = self.session_tx.send(SessionEvent {
            change: SessionChange::SignedOut,
            session: None,
        });
        let Some(token) = token else {
            return Ok(());
        };

        let url = format!("{}/auth/sign-out", self.base_url);
        self.http
            .post(url)
            .json(&TokenRequest { token: &token })
            .send()
            .await
            .map_err(|err| format!("sign-out request failed: {err}"))?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }
}

#[async_trait]
impl AuthWidget for AuthServiceClient {
    fn providers(&self) -> Vec<String> {
        self.providers.clone()
    }

    fn set_view(&self, view: AuthView) {
        let _ = self.widget_tx.send(WidgetEvent::ViewChanged(view));
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, CredentialError> {
        self.submit_credentials("/auth/sign-in", email, password, SessionChange::SignedIn)
            .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, CredentialError> {
        self.submit_credentials("/auth/sign-up", email, password, SessionChange::SignedUp)
            .await
    }

    fn events(&self) -> broadcast::Receiver<WidgetEvent> {
        self.widget_tx.subscribe()
    }
}
