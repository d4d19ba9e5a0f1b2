use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::db::schema_sqlite::{
    accounts, board_bindings, queued_tasks, registered_webhooks, subscriber_preferences,
};

use super::{
    DatabaseError,
    models::{Account, BoardBinding, QueuedTask, RegisteredWebhook, SubscriberPreference, TaskStatus},
};

// Helper function to convert DateTime to ISO string for SQLite
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// Helper function to parse ISO string to DateTime
fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

pub(crate) fn establish_connection(db_path: &str) -> Result<SqliteConnection, DatabaseError> {
    let conn_string = format!("sqlite://{}", db_path);
    let mut conn = SqliteConnection::establish(&conn_string)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    // Workers and the web server share the file; wait out writer contention.
    diesel::sql_query("PRAGMA busy_timeout = 5000")
        .execute(&mut conn)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = accounts)]
struct DbAccount {
    email: String,
    api_key: String,
    api_token: String,
    linked_board_id: Option<String>,
    linked_board_name: Option<String>,
}

impl DbAccount {
    fn to_account(&self) -> Account {
        Account {
            email: self.email.clone(),
            api_key: self.api_key.clone(),
            api_token: self.api_token.clone(),
            linked_board_id: self.linked_board_id.clone(),
            linked_board_name: self.linked_board_name.clone(),
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = accounts)]
struct NewAccount<'a> {
    email: &'a str,
    api_key: &'a str,
    api_token: &'a str,
    linked_board_id: Option<&'a str>,
    linked_board_name: Option<&'a str>,
}

#[derive(AsChangeset)]
#[diesel(table_name = accounts)]
struct UpdateAccount<'a> {
    api_key: &'a str,
    api_token: &'a str,
    linked_board_id: Option<&'a str>,
    linked_board_name: Option<&'a str>,
}

pub struct SqliteAccountStore {
    db_path: Arc<String>,
}

impl SqliteAccountStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::AccountStore for SqliteAccountStore {
    async fn get_account(&self, email: &str) -> Result<Option<Account>, DatabaseError> {
        let account_email = email.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::accounts::dsl::*;
            accounts
                .filter(email.eq(account_email))
                .select(DbAccount::as_select())
                .first::<DbAccount>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))
                .map(|row| row.map(|a| a.to_account()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn upsert_account(&self, account: &Account) -> Result<(), DatabaseError> {
        let account = account.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::accounts::dsl;

            let existing = dsl::accounts
                .filter(dsl::email.eq(&account.email))
                .select(DbAccount::as_select())
                .first::<DbAccount>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            if existing.is_some() {
                let changes = UpdateAccount {
                    api_key: &account.api_key,
                    api_token: &account.api_token,
                    linked_board_id: account.linked_board_id.as_deref(),
                    linked_board_name: account.linked_board_name.as_deref(),
                };
                diesel::update(accounts::table.filter(accounts::email.eq(&account.email)))
                    .set(changes)
                    .execute(&mut conn)
                    .map(|_| ())
                    .map_err(|e| DatabaseError::Query(e.to_string()))
            } else {
                let new_account = NewAccount {
                    email: &account.email,
                    api_key: &account.api_key,
                    api_token: &account.api_token,
                    linked_board_id: account.linked_board_id.as_deref(),
                    linked_board_name: account.linked_board_name.as_deref(),
                };
                diesel::insert_into(accounts::table)
                    .values(&new_account)
                    .execute(&mut conn)
                    .map(|_| ())
                    .map_err(|e| DatabaseError::Query(e.to_string()))
            }
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = subscriber_preferences)]
struct DbSubscriberPreference {
    id: i32,
    account_email: String,
    board_id: String,
    board_name: String,
    webhook_id: String,
    event_type: String,
    label_id: Option<String>,
    label_name: Option<String>,
    list_name: Option<String>,
    created_at: String,
}

impl DbSubscriberPreference {
    fn to_preference(&self) -> Result<SubscriberPreference, DatabaseError> {
        Ok(SubscriberPreference {
            id: self.id as i64,
            account_email: self.account_email.clone(),
            board_id: self.board_id.clone(),
            board_name: self.board_name.clone(),
            webhook_id: self.webhook_id.clone(),
            event_type: self.event_type.clone(),
            label_id: self.label_id.clone(),
            label_name: self.label_name.clone(),
            list_name: self.list_name.clone(),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = subscriber_preferences)]
struct NewSubscriberPreference<'a> {
    account_email: &'a str,
    board_id: &'a str,
    board_name: &'a str,
    webhook_id: &'a str,
    event_type: &'a str,
    label_id: Option<&'a str>,
    label_name: Option<&'a str>,
    list_name: Option<&'a str>,
    created_at: String,
}

#[derive(AsChangeset)]
#[diesel(table_name = subscriber_preferences)]
struct UpdateSubscriberPreference<'a> {
    board_id: &'a str,
    board_name: &'a str,
    label_id: Option<&'a str>,
    label_name: Option<&'a str>,
    list_name: Option<&'a str>,
}

pub struct SqlitePreferenceStore {
    db_path: Arc<String>,
}

impl SqlitePreferenceStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::PreferenceStore for SqlitePreferenceStore {
    async fn find_by_board_and_event(
        &self,
        board_id: &str,
        event_type: &str,
    ) -> Result<Vec<SubscriberPreference>, DatabaseError> {
        let board = board_id.to_string();
        let event = event_type.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::subscriber_preferences::dsl::*;
            let results = subscriber_preferences
                .filter(board_id.eq(board))
                .filter(event_type.eq(event))
                .order(id.asc())
                .select(DbSubscriberPreference::as_select())
                .load::<DbSubscriberPreference>(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            results.into_iter().map(|p| p.to_preference()).collect()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn list_for_account(
        &self,
        email: &str,
    ) -> Result<Vec<SubscriberPreference>, DatabaseError> {
        let email = email.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::subscriber_preferences::dsl::*;
            let results = subscriber_preferences
                .filter(account_email.eq(email))
                .order(id.asc())
                .select(DbSubscriberPreference::as_select())
                .load::<DbSubscriberPreference>(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            results.into_iter().map(|p| p.to_preference()).collect()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn get_for_account(
        &self,
        preference_id: i64,
        email: &str,
    ) -> Result<Option<SubscriberPreference>, DatabaseError> {
        let email = email.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::subscriber_preferences::dsl::*;
            subscriber_preferences
                .filter(id.eq(preference_id as i32))
                .filter(account_email.eq(email))
                .select(DbSubscriberPreference::as_select())
                .first::<DbSubscriberPreference>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|p| p.to_preference())
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn find_by_webhook_for_account(
        &self,
        webhook: &str,
        email: &str,
    ) -> Result<Option<SubscriberPreference>, DatabaseError> {
        let webhook = webhook.to_string();
        let email = email.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::subscriber_preferences::dsl::*;
            subscriber_preferences
                .filter(webhook_id.eq(webhook))
                .filter(account_email.eq(email))
                .order(id.asc())
                .select(DbSubscriberPreference::as_select())
                .first::<DbSubscriberPreference>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|p| p.to_preference())
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn upsert_preference(
        &self,
        preference: &SubscriberPreference,
    ) -> Result<i64, DatabaseError> {
        let preference = preference.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::subscriber_preferences::dsl;

            let existing = dsl::subscriber_preferences
                .filter(dsl::account_email.eq(&preference.account_email))
                .filter(dsl::webhook_id.eq(&preference.webhook_id))
                .filter(dsl::event_type.eq(&preference.event_type))
                .select(DbSubscriberPreference::as_select())
                .first::<DbSubscriberPreference>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            if let Some(row) = existing {
                let changes = UpdateSubscriberPreference {
                    board_id: &preference.board_id,
                    board_name: &preference.board_name,
                    label_id: preference.label_id.as_deref(),
                    label_name: preference.label_name.as_deref(),
                    list_name: preference.list_name.as_deref(),
                };
                diesel::update(
                    subscriber_preferences::table
                        .filter(subscriber_preferences::id.eq(row.id)),
                )
                .set(changes)
                .execute(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
                Ok(row.id as i64)
            } else {
                let new_preference = NewSubscriberPreference {
                    account_email: &preference.account_email,
                    board_id: &preference.board_id,
                    board_name: &preference.board_name,
                    webhook_id: &preference.webhook_id,
                    event_type: &preference.event_type,
                    label_id: preference.label_id.as_deref(),
                    label_name: preference.label_name.as_deref(),
                    list_name: preference.list_name.as_deref(),
                    created_at: datetime_to_string(&preference.created_at),
                };
                diesel::insert_into(subscriber_preferences::table)
                    .values(&new_preference)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;

                let inserted = dsl::subscriber_preferences
                    .filter(dsl::account_email.eq(&preference.account_email))
                    .filter(dsl::webhook_id.eq(&preference.webhook_id))
                    .filter(dsl::event_type.eq(&preference.event_type))
                    .select(DbSubscriberPreference::as_select())
                    .first::<DbSubscriberPreference>(&mut conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
                Ok(inserted.id as i64)
            }
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn delete_preference(&self, preference_id: i64) -> Result<(), DatabaseError> {
        let preference_id = preference_id as i32;
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            diesel::delete(
                subscriber_preferences::table
                    .filter(subscriber_preferences::id.eq(preference_id)),
            )
            .execute(&mut conn)
            .map(|_| ())
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn count_for_webhook(&self, webhook: &str) -> Result<i64, DatabaseError> {
        let webhook = webhook.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::subscriber_preferences::dsl::*;
            subscriber_preferences
                .filter(webhook_id.eq(webhook))
                .count()
                .get_result(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = board_bindings)]
struct DbBoardBinding {
    id: i32,
    account_email: String,
    board_id: String,
    board_name: String,
    lists: String,
}

impl DbBoardBinding {
    fn to_binding(&self) -> Result<BoardBinding, DatabaseError> {
        let lists: HashMap<String, String> = serde_json::from_str(&self.lists)
            .map_err(|e| DatabaseError::Query(format!("invalid lists payload: {}", e)))?;
        Ok(BoardBinding {
            id: self.id as i64,
            account_email: self.account_email.clone(),
            board_id: self.board_id.clone(),
            board_name: self.board_name.clone(),
            lists,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = board_bindings)]
struct NewBoardBinding<'a> {
    account_email: &'a str,
    board_id: &'a str,
    board_name: &'a str,
    lists: String,
}

pub struct SqliteBoardStore {
    db_path: Arc<String>,
}

impl SqliteBoardStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::BoardStore for SqliteBoardStore {
    async fn get_binding(&self, email: &str) -> Result<Option<BoardBinding>, DatabaseError> {
        let email = email.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::board_bindings::dsl::*;
            board_bindings
                .filter(account_email.eq(email))
                .select(DbBoardBinding::as_select())
                .first::<DbBoardBinding>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|b| b.to_binding())
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn create_binding(&self, binding: &BoardBinding) -> Result<(), DatabaseError> {
        let binding = binding.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let lists = serde_json::to_string(&binding.lists)
                .map_err(|e| DatabaseError::Query(format!("invalid lists payload: {}", e)))?;
            let new_binding = NewBoardBinding {
                account_email: &binding.account_email,
                board_id: &binding.board_id,
                board_name: &binding.board_name,
                lists,
            };
            diesel::insert_into(board_bindings::table)
                .values(&new_binding)
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = registered_webhooks)]
struct DbRegisteredWebhook {
    id: i32,
    board_id: String,
    webhook_id: String,
    callback_url: String,
    created_at: String,
}

impl DbRegisteredWebhook {
    fn to_webhook(&self) -> Result<RegisteredWebhook, DatabaseError> {
        Ok(RegisteredWebhook {
            id: self.id as i64,
            board_id: self.board_id.clone(),
            webhook_id: self.webhook_id.clone(),
            callback_url: self.callback_url.clone(),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = registered_webhooks)]
struct NewRegisteredWebhook<'a> {
    board_id: &'a str,
    webhook_id: &'a str,
    callback_url: &'a str,
    created_at: String,
}

pub struct SqliteWebhookStore {
    db_path: Arc<String>,
}

impl SqliteWebhookStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::WebhookStore for SqliteWebhookStore {
    async fn get_by_board(
        &self,
        board: &str,
    ) -> Result<Option<RegisteredWebhook>, DatabaseError> {
        let board = board.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::registered_webhooks::dsl::*;
            registered_webhooks
                .filter(board_id.eq(board))
                .select(DbRegisteredWebhook::as_select())
                .first::<DbRegisteredWebhook>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|w| w.to_webhook())
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn create_webhook(&self, webhook: &RegisteredWebhook) -> Result<(), DatabaseError> {
        let webhook = webhook.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let new_webhook = NewRegisteredWebhook {
                board_id: &webhook.board_id,
                webhook_id: &webhook.webhook_id,
                callback_url: &webhook.callback_url,
                created_at: datetime_to_string(&webhook.created_at),
            };
            diesel::insert_into(registered_webhooks::table)
                .values(&new_webhook)
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn delete_by_webhook_id(&self, webhook: &str) -> Result<(), DatabaseError> {
        let webhook = webhook.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            diesel::delete(
                registered_webhooks::table
                    .filter(registered_webhooks::webhook_id.eq(webhook)),
            )
            .execute(&mut conn)
            .map(|_| ())
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = queued_tasks)]
struct DbQueuedTask {
    id: i32,
    payload: String,
    status: String,
    attempts: i32,
    created_at: String,
    claimed_at: Option<String>,
}

impl DbQueuedTask {
    fn to_task(&self) -> Result<QueuedTask, DatabaseError> {
        Ok(QueuedTask {
            id: self.id as i64,
            payload: self.payload.clone(),
            status: self.status.clone(),
            attempts: self.attempts,
            created_at: string_to_datetime(&self.created_at)?,
            claimed_at: self
                .claimed_at
                .as_deref()
                .map(string_to_datetime)
                .transpose()?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = queued_tasks)]
struct NewQueuedTask<'a> {
    payload: &'a str,
    status: &'a str,
    attempts: i32,
    created_at: String,
}

pub struct SqliteTaskStore {
    db_path: Arc<String>,
}

impl SqliteTaskStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::TaskStore for SqliteTaskStore {
    async fn enqueue(&self, payload: &str) -> Result<i64, DatabaseError> {
        // Named to dodge the glob-imported payload column below.
        let payload_text = payload.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::queued_tasks::dsl::*;
            conn.immediate_transaction(|conn| {
                let new_task = NewQueuedTask {
                    payload: &payload_text,
                    status: TaskStatus::Pending.as_str(),
                    attempts: 0,
                    created_at: datetime_to_string(&Utc::now()),
                };
                diesel::insert_into(queued_tasks)
                    .values(&new_task)
                    .execute(conn)?;

                let inserted_id: i32 = queued_tasks.select(diesel::dsl::max(id)).first::<Option<i32>>(conn)?.unwrap_or(0);
                Ok::<i64, DatabaseError>(inserted_id as i64)
            })
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn claim_next(&self) -> Result<Option<QueuedTask>, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::queued_tasks::dsl::*;

            let claimed: Result<Option<DbQueuedTask>, DatabaseError> = conn
                .immediate_transaction(|conn| {
                    let next = queued_tasks
                        .filter(status.eq(TaskStatus::Pending.as_str()))
                        .order(id.asc())
                        .select(DbQueuedTask::as_select())
                        .first::<DbQueuedTask>(conn)
                        .optional()?;

                    let Some(task) = next else {
                        return Ok(None);
                    };

                    diesel::update(queued_tasks.filter(id.eq(task.id)))
                        .set((
                            status.eq(TaskStatus::Running.as_str()),
                            attempts.eq(task.attempts + 1),
                            claimed_at.eq(Some(datetime_to_string(&Utc::now()))),
                        ))
                        .execute(conn)?;

                    Ok(Some(DbQueuedTask {
                        status: TaskStatus::Running.as_str().to_string(),
                        attempts: task.attempts + 1,
                        ..task
                    }))
                });

            claimed?.map(|t| t.to_task()).transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn complete(&self, task_id: i64) -> Result<(), DatabaseError> {
        let task_id = task_id as i32;
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            diesel::delete(queued_tasks::table.filter(queued_tasks::id.eq(task_id)))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn release_stale(&self) -> Result<usize, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::queued_tasks::dsl::*;
            diesel::update(queued_tasks.filter(status.eq(TaskStatus::Running.as_str())))
                .set((
                    status.eq(TaskStatus::Pending.as_str()),
                    claimed_at.eq(None::<String>),
                ))
                .execute(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn pending_count(&self) -> Result<i64, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::queued_tasks::dsl::*;
            queued_tasks
                .filter(status.eq(TaskStatus::Pending.as_str()))
                .count()
                .get_result(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}
