pub mod errors;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod server;
pub mod session;
pub mod settings;

pub use errors::{handle_rejection, ErrorResponse, ErrorSeverity, IntoErrorResponse};
pub use events::{EventBus, EventSubscription, GameEvent};
pub use logging::{init_logging, init_test_logging, LogEntry, LogFormat, TestLogSubscriber};
pub use middleware::{log_response, with_request_logging};
pub use server::{AppContext, ServerConfig, ServerError, ServerHandle, WebServer};
pub use session::{CreatedGame, JoinOutcome, PlayerConnection, SessionError, SessionManager};
pub use settings::{AppSettings, SettingsError};
