pub mod dispatcher;
pub mod event;
pub mod matcher;
pub mod worker;

pub use self::dispatcher::{DispatchOutcome, EventDispatcher};
pub use self::event::{EnrichedTask, WebhookEvent, normalize_event_type};
pub use self::matcher::EventMatcher;
pub use self::worker::{Worker, WorkerPool};
