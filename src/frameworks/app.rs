use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;

use crate::domain::ports::{AuthGateway, AuthWidget, BookmarkStore, Route};
use crate::frameworks::{config, db};
use crate::interface_adapters::auth_client::AuthServiceClient;
use crate::interface_adapters::memory::{MemoryAuthWidget, MemoryBackend};
use crate::interface_adapters::shell::{self, ShellExit, ShellNavigator};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run() {
    // Load .env locally; safe to ignore when not present.
    let _ = dotenvy::dotenv();
    init_tracing();

    match (config::auth_service_url(), config::database_url()) {
        (Some(auth_url), Some(database_url)) => run_remote(auth_url, database_url).await,
        (None, None) => run_local().await,
        _ => {
            tracing::error!(
                "AUTH_SERVICE_URL and DATABASE_URL must be set together; \
                 unset both to use the in-memory backend"
            );
        }
    }
}

// Demo/offline mode: the in-memory backend plays both external services.
async fn run_local() {
    let backend = MemoryBackend::new();
    let widget = MemoryAuthWidget::new(backend.clone(), config::oauth_providers());
    drive(backend.clone(), widget, backend).await;
}

// Remote mode: identity service over HTTP, bookmarks in PostgreSQL.
async fn run_remote(auth_url: String, database_url: String) {
    let auth = match AuthServiceClient::new(
        auth_url,
        config::auth_request_timeout(),
        config::oauth_providers(),
    ) {
        Ok(auth) => auth,
        Err(err) => {
            tracing::error!(error = %err, "failed to build identity client");
            return;
        }
    };
    let _session_watch = auth.spawn_session_watch(config::session_watch_interval());

    let pool = match db::connect_pool(&database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to database");
            return;
        }
    };
    if let Err(err) = db::run_migrations(&pool).await {
        tracing::error!(error = %err, "failed to run migrations");
        return;
    }

    // The store binds each statement to the authenticated identity for the
    // row-level policy; this task keeps that identity current.
    let (identity_tx, identity_rx) = watch::channel(None);
    let mut session_events = auth.subscribe();
    tokio::spawn(async move {
        loop {
            match session_events.recv().await {
                Ok(event) => {
                    let _ = identity_tx.send(event.session.map(|session| session.user.id));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    let store = db::PgBookmarkStore::new(pool, identity_rx);

    drive(auth.clone(), auth, store).await;
}

// Route dispatcher: runs whichever screen the current route names until one
// of them asks to quit. Redirect-on-mismatch is handled inside the screens.
async fn drive<A, W, S>(auth: A, widget: W, store: S)
where
    A: AuthGateway + Clone + Send + 'static,
    W: AuthWidget + Clone,
    S: BookmarkStore + Clone + Send + 'static,
{
    let (navigator, mut routes) = ShellNavigator::new();
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut input = stdin.lines();

    loop {
        let route = *routes.borrow_and_update();
        let exit = match route {
            Route::Entry => {
                shell::run_entry(auth.clone(), widget.clone(), navigator.clone(), &mut input).await
            }
            Route::Dashboard => {
                shell::run_dashboard(auth.clone(), store.clone(), navigator.clone(), &mut input)
                    .await
            }
        };
        if exit == ShellExit::Quit {
            break;
        }
    }
}
