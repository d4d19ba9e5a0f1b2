use std::sync::Arc;

use diesel::RunQueryDsl;

use crate::config::DatabaseConfig;
use crate::db::sqlite::{
    SqliteAccountStore, SqliteBoardStore, SqlitePreferenceStore, SqliteTaskStore,
    SqliteWebhookStore, establish_connection,
};
use crate::db::{
    AccountStore, BoardStore, DatabaseError, PreferenceStore, TaskStore, WebhookStore,
};

#[derive(Clone)]
pub struct DatabaseManager {
    sqlite_path: String,
    account_store: Arc<dyn AccountStore>,
    preference_store: Arc<dyn PreferenceStore>,
    board_store: Arc<dyn BoardStore>,
    webhook_store: Arc<dyn WebhookStore>,
    task_store: Arc<dyn TaskStore>,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let path = config.sqlite_path().ok_or_else(|| {
            DatabaseError::Connection("database connection string is not configured".to_string())
        })?;
        let path_arc = Arc::new(path.clone());

        Ok(Self {
            sqlite_path: path,
            account_store: Arc::new(SqliteAccountStore::new(path_arc.clone())),
            preference_store: Arc::new(SqlitePreferenceStore::new(path_arc.clone())),
            board_store: Arc::new(SqliteBoardStore::new(path_arc.clone())),
            webhook_store: Arc::new(SqliteWebhookStore::new(path_arc.clone())),
            task_store: Arc::new(SqliteTaskStore::new(path_arc)),
        })
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let path = self.sqlite_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&path)
                .map_err(|e| DatabaseError::Migration(e.to_string()))?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS accounts (
                    email TEXT PRIMARY KEY NOT NULL,
                    api_key TEXT NOT NULL,
                    api_token TEXT NOT NULL,
                    linked_board_id TEXT,
                    linked_board_name TEXT
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS subscriber_preferences (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    account_email TEXT NOT NULL REFERENCES accounts(email),
                    board_id TEXT NOT NULL,
                    board_name TEXT NOT NULL,
                    webhook_id TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    label_id TEXT,
                    label_name TEXT,
                    list_name TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE (account_email, webhook_id, event_type)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS board_bindings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    account_email TEXT NOT NULL UNIQUE REFERENCES accounts(email),
                    board_id TEXT NOT NULL,
                    board_name TEXT NOT NULL,
                    lists TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS registered_webhooks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    board_id TEXT NOT NULL UNIQUE,
                    webhook_id TEXT NOT NULL,
                    callback_url TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS queued_tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    payload TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    attempts INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    claimed_at TEXT
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_preferences_board_event ON subscriber_preferences(board_id, event_type)",
                "CREATE INDEX IF NOT EXISTS idx_preferences_webhook ON subscriber_preferences(webhook_id)",
                "CREATE INDEX IF NOT EXISTS idx_queued_tasks_status ON queued_tasks(status, id)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    /// Cheap liveness probe for the health endpoint.
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        let path = self.sqlite_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&path)?;
            diesel::sql_query("SELECT 1")
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    pub fn account_store(&self) -> Arc<dyn AccountStore> {
        self.account_store.clone()
    }

    pub fn preference_store(&self) -> Arc<dyn PreferenceStore> {
        self.preference_store.clone()
    }

    pub fn board_store(&self) -> Arc<dyn BoardStore> {
        self.board_store.clone()
    }

    pub fn webhook_store(&self) -> Arc<dyn WebhookStore> {
        self.webhook_store.clone()
    }

    pub fn task_store(&self) -> Arc<dyn TaskStore> {
        self.task_store.clone()
    }
}
