use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::{broadcast, watch, Mutex};
use uuid::Uuid;

use crate::domain::entities::{Bookmark, NewBookmark};
use crate::domain::events::{ChangeKind, TableChange};
use crate::domain::ports::BookmarkStore;

const FEED_EVENT_CAPACITY: usize = 64;
const NOTIFY_CHANNEL: &str = "bookmarks_changed";

// Build a small PostgreSQL pool for the bookmark store.
pub async fn connect_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

// Run database migrations for the bookmark store.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
    MIGRATOR.run(pool).await
}

// Payload of one NOTIFY from the bookmarks trigger.
#[derive(Debug, Deserialize)]
struct ChangeNotice {
    user_id: Uuid,
    kind: String,
}

// PostgreSQL-backed bookmark store. The row-level security policy in the
// migration scopes every statement to the identity set on the transaction;
// the change feed rides the table's NOTIFY trigger.
#[derive(Clone)]
pub struct PgBookmarkStore {
    pool: PgPool,
    // Current authenticated identity, maintained by the session wiring.
    identity: watch::Receiver<Option<Uuid>>,
    feeds: Arc<Mutex<HashMap<Uuid, broadcast::Sender<TableChange>>>>,
    listener_started: Arc<Mutex<bool>>,
}

impl PgBookmarkStore {
    pub fn new(pool: PgPool, identity: watch::Receiver<Option<Uuid>>) -> Self {
        Self {
            pool,
            identity,
            feeds: Arc::new(Mutex::new(HashMap::new())),
            listener_started: Arc::new(Mutex::new(false)),
        }
    }

    // Opens a transaction carrying the caller's identity for the RLS policy.
    async fn begin_as_caller(&self) -> Result<Transaction<'static, Postgres>, String> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| format!("begin failed: {err}"))?;
        let current_identity = *self.identity.borrow();
        if let Some(user_id) = current_identity {
            sqlx::query("SELECT set_config('app.current_user_id', $1, true)")
                .bind(user_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|err| format!("identity binding failed: {err}"))?;
        }
        Ok(tx)
    }

    // Starts the single LISTEN task that fans notifications out to the
    // per-user feed channels.
    async fn ensure_listener(&self) -> Result<(), String> {
        let mut started = self.listener_started.lock().await;
        if *started {
            return Ok(());
        }

        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|err| format!("listener connect failed: {err}"))?;
        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .map_err(|err| format!("listen failed: {err}"))?;

        let feeds = Arc::clone(&self.feeds);
        tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        let notice: ChangeNotice =
                            match serde_json::from_str(notification.payload()) {
                                Ok(notice) => notice,
                                Err(err) => {
                                    tracing::warn!(error = %err, "malformed change notice");
                                    continue;
                                }
                            };
                        let kind = match notice.kind.as_str() {
                            "INSERT" => ChangeKind::Insert,
                            "UPDATE" => ChangeKind::Update,
                            "DELETE" => ChangeKind::Delete,
                            other => {
                                tracing::warn!(kind = other, "unknown change kind");
                                continue;
                            }
                        };
                        let feeds = feeds.lock().await;
                        if let Some(sender) = feeds.get(&notice.user_id) {
                            let _ = sender.send(TableChange {
                                kind,
                                user_id: notice.user_id,
                            });
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "change listener lost, live updates stop");
                        break;
                    }
                }
            }
        });

        *started = true;
        Ok(())
    }

    fn row_to_bookmark(row: &sqlx::postgres::PgRow) -> Result<Bookmark, sqlx::Error> {
        Ok(Bookmark {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            url: row.try_get("url")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl BookmarkStore for PgBookmarkStore {
    async fn insert(&self, bookmark: NewBookmark) -> Result<(), String> {
        let mut tx = self.begin_as_caller().await?;
        sqlx::query("INSERT INTO bookmarks (title, url, user_id) VALUES ($1, $2, $3)")
            .bind(&bookmark.title)
            .bind(&bookmark.url)
            .bind(bookmark.user_id)
            .execute(&mut *tx)
            .await
            .map_err(|err| format!("insert failed: {err}"))?;
        tx.commit()
            .await
            .map_err(|err| format!("commit failed: {err}"))
    }

    async fn delete(&self, id: Uuid) -> Result<(), String> {
        let mut tx = self.begin_as_caller().await?;
        // Rows outside the caller's row-level scope are simply not matched.
        sqlx::query("DELETE FROM bookmarks WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|err| format!("delete failed: {err}"))?;
        tx.commit()
            .await
            .map_err(|err| format!("commit failed: {err}"))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Bookmark>, String> {
        let mut tx = self.begin_as_caller().await?;
        let rows = sqlx::query(
            "SELECT id, title, url, user_id, created_at \
             FROM bookmarks WHERE user_id = $1 \
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|err| format!("list failed: {err}"))?;
        tx.commit()
            .await
            .map_err(|err| format!("commit failed: {err}"))?;

        rows.iter()
            .map(|row| Self::row_to_bookmark(row).map_err(|err| format!("bad row: {err}")))
            .collect()
    }

    async fn subscribe_changes(
        &self,
        user_id: Uuid,
    ) -> Result<broadcast::Receiver<TableChange>, String> {
        self.ensure_listener().await?;
        let mut feeds = self.feeds.lock().await;
        let sender = feeds
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(FEED_EVENT_CAPACITY).0);
        Ok(sender.subscribe())
    }
}
