use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

mod ai;
mod auth;
mod config;
mod db;
mod dto;
mod error;
mod handlers;
mod models;
mod services;
mod storage;
mod store;

use ai::{FunctionGateway, OpenAiGateway};
use auth::rate_limit::RateLimitState;
use config::Config;
use services::chat_catalog::{ChatCatalog, ChatFeed};
use services::food_analysis::FoodAnalysis;
use services::image_ingestion::ImageIngestion;
use storage::{LocalObjectStore, ObjectStore};
use store::{ChatStore, MealStore, PgStore, UserStore};

/// Raw image uploads get more room than JSON bodies.
const IMAGE_BODY_LIMIT: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserStore>,
    pub meals: Arc<dyn MealStore>,
    pub chats: Arc<dyn ChatStore>,
    pub images: ImageIngestion,
    pub analysis: FoodAnalysis,
    pub gateway: Arc<dyn FunctionGateway>,
    pub chat_feed: ChatFeed,
    pub rate_limiter: RateLimitState,
}

impl AppState {
    pub fn new<S>(
        config: Arc<Config>,
        store: S,
        objects: Arc<dyn ObjectStore>,
        gateway: Arc<dyn FunctionGateway>,
    ) -> Self
    where
        S: UserStore + MealStore + ChatStore + 'static,
    {
        let store = Arc::new(store);
        let images = ImageIngestion::new(objects);
        Self {
            config,
            users: store.clone(),
            meals: store.clone(),
            chats: store,
            analysis: FoodAnalysis::new(gateway.clone(), images.clone()),
            images,
            gateway,
            chat_feed: ChatFeed::new(256),
            rate_limiter: RateLimitState::new(),
        }
    }

    pub fn catalog(&self) -> ChatCatalog {
        ChatCatalog::new(self.chats.clone(), self.chat_feed.clone())
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let allowed_origins: Vec<axum::http::HeaderValue> = {
        let mut origins = vec![config
            .frontend_url
            .parse::<axum::http::HeaderValue>()
            .expect("FRONTEND_URL must be a valid origin")];
        // In dev, also allow LAN access (e.g. testing from another device)
        if let Ok(extra) = std::env::var("CORS_EXTRA_ORIGINS") {
            for o in extra.split(',') {
                if let Ok(hv) = o.trim().parse::<axum::http::HeaderValue>() {
                    origins.push(hv);
                }
            }
        }
        origins
    };
    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true)
}

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route(
            "/api/auth/password-reset",
            post(handlers::auth::request_password_reset),
        )
        .route(
            "/api/auth/password-reset/confirm",
            post(handlers::auth::confirm_password_reset),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/ws", get(handlers::ws::ws_handler))
        .nest_service("/media", ServeDir::new(&state.config.media_dir))
        .merge(auth_routes);

    let image_routes = Router::new()
        .route("/api/me/image", put(handlers::profile::upload_profile_image))
        .route(
            "/api/food/analyze",
            post(handlers::meals::analyze_photo).layer(middleware::from_fn_with_state(
                state.clone(),
                auth::rate_limit::rate_limit_analyze,
            )),
        )
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(IMAGE_BODY_LIMIT)),
        );

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/me",
            get(handlers::profile::me).put(handlers::profile::update_me),
        )
        // Meals
        .route("/api/dashboard", get(handlers::meals::dashboard))
        .route("/api/food-items", post(handlers::meals::create_food_item))
        .route(
            "/api/food-items/:id",
            put(handlers::meals::update_food_item).delete(handlers::meals::delete_food_item),
        )
        .route(
            "/api/food-items/:id/move",
            post(handlers::meals::move_food_item),
        )
        .route("/api/meals/:id", delete(handlers::meals::delete_meal))
        // Chats
        .route(
            "/api/chats",
            get(handlers::chats::list_chats).post(handlers::chats::create_chat),
        )
        .route("/api/chats/:id", delete(handlers::chats::delete_chat))
        .route(
            "/api/chats/:id/title",
            put(handlers::chats::update_chat_title),
        )
        .route(
            "/api/chats/:id/messages",
            get(handlers::chats::get_messages).post(handlers::chats::send_message),
        )
        .route(
            "/api/chats/:id/messages/stream",
            post(handlers::chats::stream_message),
        )
        .merge(image_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors_layer(&state.config)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mealsnap_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());

    let db = db::create_pool(&config.database_url).await;
    db::run_migrations(&db).await;

    let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(
        &config.media_dir,
        config.media_base_url(),
    ));
    let gateway: Arc<dyn FunctionGateway> =
        Arc::new(OpenAiGateway::new(&config).expect("Failed to build OpenAI client"));
    if config.openai_api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; AI features will fail");
    }

    let state = AppState::new(config.clone(), PgStore::new(db), objects, gateway);

    state
        .rate_limiter
        .spawn_cleanup_worker(Duration::from_secs(config.auth_rate_limit_window_secs));
    services::meal_aggregator::spawn_empty_meal_sweeper(
        state.meals.clone(),
        Duration::from_secs(config.empty_meal_sweep_interval_secs),
    );

    let app = build_router(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");
    // connect info feeds the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .expect("Server error");
}
