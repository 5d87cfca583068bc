use crate::errors::handle_rejection;
use crate::events::EventBus;
use crate::handlers;
use crate::middleware::with_request_logging;
use crate::session::{SessionError, SessionManager};
use crate::settings::AppSettings;
use std::convert::Infallible;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use warp::filters::BoxedFilter;
use warp::reply::{Reply, Response};
use warp::Filter;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    host: String,
    port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn for_tests() -> Self {
        Self::new("127.0.0.1", 0)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Shared state handed to every route.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: ServerConfig,
    settings: AppSettings,
    event_bus: Arc<EventBus>,
    sessions: Arc<SessionManager>,
}

impl AppContext {
    pub fn new(config: ServerConfig, settings: AppSettings) -> Result<Self, ServerError> {
        settings
            .validate()
            .map_err(|err| ServerError::ConfigError(err.to_string()))?;

        let event_bus = Arc::new(EventBus::new());
        let sessions = Arc::new(SessionManager::from_settings(
            Arc::clone(&event_bus),
            &settings,
        ));

        Ok(Self::new_with_dependencies(
            config, settings, event_bus, sessions,
        ))
    }

    pub fn new_with_dependencies(
        config: ServerConfig,
        settings: AppSettings,
        event_bus: Arc<EventBus>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            config,
            settings,
            event_bus,
            sessions,
        }
    }

    pub fn new_for_tests() -> Self {
        let event_bus = Arc::new(EventBus::new());
        let sessions = Arc::new(SessionManager::new(Arc::clone(&event_bus)));
        Self::new_with_dependencies(
            ServerConfig::for_tests(),
            AppSettings::default(),
            event_bus,
            sessions,
        )
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Session error: {0}")]
    SessionError(#[from] SessionError),
}

#[derive(Debug, Clone)]
pub struct WebServer {
    context: AppContext,
}

impl WebServer {
    pub fn new(config: ServerConfig, settings: AppSettings) -> Result<Self, ServerError> {
        let context = AppContext::new(config, settings)?;
        Ok(Self { context })
    }

    pub fn from_context(context: AppContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let WebServer { context } = self;
        let config = context.config().clone();
        let bind_addr = Self::bind_addr(&config)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let routes = Self::app(&context);
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        let (addr, server_future) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(bind_addr, shutdown_signal)
            .map_err(Self::map_warp_error)?;

        tracing::info!(address = %addr, "kazhutha server listening");

        let sweeper = spawn_sweeper(context.sessions(), context.settings().sweep_interval());
        let task = tokio::spawn(async move {
            server_future.await;
            Ok(())
        });

        Ok(ServerHandle::new(addr, shutdown_tx, task, sweeper, context))
    }

    fn bind_addr(config: &ServerConfig) -> Result<SocketAddr, ServerError> {
        let host = config.host();

        if let Ok(addr) = host.parse::<SocketAddr>() {
            return Ok(addr);
        }

        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, config.port()));
        }

        let candidate = format!("{}:{}", host, config.port());
        let mut addrs = candidate.to_socket_addrs().map_err(|err| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`: {err}"))
        })?;

        addrs.next().ok_or_else(|| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`"))
        })
    }

    fn map_warp_error(err: warp::Error) -> ServerError {
        use std::error::Error as StdError;

        if let Some(source) = err.source() {
            if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
                let recreated = std::io::Error::new(io_err.kind(), io_err.to_string());
                return ServerError::BindError(recreated);
            }
        }

        ServerError::ConfigError(err.to_string())
    }

    /// Route table as served: browser clients may call it from any origin.
    pub fn app(
        context: &AppContext,
    ) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
        Self::routes(context).with(Self::cors())
    }

    fn cors() -> warp::cors::Builder {
        warp::cors()
            .allow_any_origin()
            .allow_methods(vec!["GET", "POST", "OPTIONS"])
            .allow_headers(vec!["content-type"])
    }

    /// The full route table, with request logging and JSON rejections.
    pub fn routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let routes = Self::health_route()
            .or(Self::api_routes(context))
            .unify()
            .or(Self::sse_routes(context))
            .unify();

        with_request_logging(routes)
            .recover(handle_rejection)
            .unify()
            .boxed()
    }

    fn health_route() -> BoxedFilter<(Response,)> {
        warp::path!("api" / "healthz")
            .and(warp::get())
            .map(|| handlers::health().into_response())
            .boxed()
    }

    fn api_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let sessions = context.sessions();

        let create = warp::path!("api" / "game" / "create")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |sessions: Arc<SessionManager>, request: handlers::CreateGameRequest| async move {
                    Ok::<_, Infallible>(handlers::create_game(sessions, request).await)
                },
            );

        let join = warp::path!("api" / "game" / "join")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |sessions: Arc<SessionManager>, request: handlers::JoinGameRequest| async move {
                    Ok::<_, Infallible>(handlers::join_game(sessions, request).await)
                },
            );

        let start = warp::path!("api" / "game" / "start")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |sessions: Arc<SessionManager>, request: handlers::GameActionRequest| async move {
                    Ok::<_, Infallible>(handlers::start_game(sessions, request).await)
                },
            );

        let play_again = warp::path!("api" / "game" / "play-again")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |sessions: Arc<SessionManager>, request: handlers::GameActionRequest| async move {
                    Ok::<_, Infallible>(handlers::play_again(sessions, request).await)
                },
            );

        let play = warp::path!("api" / "game" / "play")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |sessions: Arc<SessionManager>, request: handlers::PlayCardRequest| async move {
                    Ok::<_, Infallible>(handlers::play_card(sessions, request).await)
                },
            );

        let take_hand = warp::path!("api" / "game" / "take-hand")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |sessions: Arc<SessionManager>, request: handlers::GameActionRequest| async move {
                    Ok::<_, Infallible>(handlers::take_hand(sessions, request).await)
                },
            );

        let state = warp::path!("api" / "game" / String)
            .and(warp::get())
            .and(warp::query::<handlers::StateQuery>())
            .and(Self::with_session_manager(sessions))
            .and_then(
                |game_id: String, query: handlers::StateQuery, sessions: Arc<SessionManager>| async move {
                    Ok::<_, Infallible>(handlers::get_game_state(sessions, game_id, query).await)
                },
            );

        create
            .or(join)
            .unify()
            .or(start)
            .unify()
            .or(play_again)
            .unify()
            .or(play)
            .unify()
            .or(take_hand)
            .unify()
            .or(state)
            .unify()
            .boxed()
    }

    fn sse_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let sessions = context.sessions();
        let keep_alive = context.settings().keep_alive();

        warp::path!("api" / "game" / String / "events")
            .and(warp::get())
            .and(warp::query::<handlers::EventsQuery>())
            .and(Self::with_session_manager(sessions))
            .and_then(
                move |game_id: String,
                      query: handlers::EventsQuery,
                      sessions: Arc<SessionManager>| async move {
                    Ok::<_, Infallible>(
                        handlers::stream_events(game_id, query, sessions, keep_alive).await,
                    )
                },
            )
            .boxed()
    }

    fn with_session_manager(
        sessions: Arc<SessionManager>,
    ) -> impl Filter<Extract = (Arc<SessionManager>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&sessions))
    }
}

/// Periodically evicts idle games until aborted.
fn spawn_sweeper(sessions: Arc<SessionManager>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = sessions.cleanup_expired_sessions();
            if evicted > 0 {
                tracing::info!(evicted, "expired game sessions evicted");
            }
        }
    })
}

#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
    sweeper: Option<JoinHandle<()>>,
    context: AppContext,
}

impl ServerHandle {
    fn new(
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<Result<(), ServerError>>,
        sweeper: JoinHandle<()>,
        context: AppContext,
    ) -> Self {
        Self {
            addr,
            shutdown: Some(shutdown),
            task: Some(task),
            sweeper: Some(sweeper),
            context,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }

        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(err) => {
                    return Err(ServerError::ConfigError(format!(
                        "server task join error: {err}"
                    )))
                }
            }
        }

        tracing::info!(address = %self.addr, "kazhutha server stopped");
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }

        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
