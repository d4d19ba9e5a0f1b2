pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{Account, BoardBinding, RegisteredWebhook, SubscriberPreference};
pub use self::stores::{AccountStore, BoardStore, PreferenceStore, TaskStore, WebhookStore};

pub mod error;
pub mod manager;
pub mod models;
pub mod schema_sqlite;
pub mod sqlite;
pub mod stores;
