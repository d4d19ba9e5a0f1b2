pub use self::parser::{Config, DatabaseConfig, LoggingConfig, QueueConfig, TrelloConfig};
pub use self::validator::ConfigError;

mod parser;
mod validator;
