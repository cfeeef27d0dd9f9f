/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use makrx_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config)?;
/// let app = makrx_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::config::Config;
use crate::error::ApiError;
use crate::routes;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use makrx_shared::auth::jwt::TokenVerifier;
use makrx_shared::auth::middleware::{jwt_auth_middleware, AuthContext};
use makrx_shared::dispatch::DispatchService;
use makrx_shared::features::{FlagCache, SERVICE_MARKETPLACE};
use makrx_shared::integration::{HttpStoreSync, NoopStoreSync, StoreSync};
use sqlx::PgPool;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub verifier: Arc<TokenVerifier>,
    pub flags: FlagCache,
    pub store_sync: Arc<dyn StoreSync>,
    pub dispatch: DispatchService,
}

impl AppState {
    /// Builds state from configuration
    ///
    /// # Errors
    ///
    /// Fails when the token key or the store sync URL is invalid.
    pub fn new(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let verifier = Arc::new(config.auth.verifier()?);

        let store_sync: Arc<dyn StoreSync> = match &config.store_sync.url {
            Some(url) => Arc::new(HttpStoreSync::new(url, config.store_sync_timeout())?),
            None => Arc::new(NoopStoreSync),
        };

        let flags = FlagCache::new(Duration::from_secs(config.feature_cache_ttl_secs));
        let dispatch = DispatchService::new(db.clone(), Arc::clone(&store_sync));

        Ok(Self {
            db,
            config: Arc::new(config),
            verifier,
            flags,
            store_sync,
            dispatch,
        })
    }

    /// Fails with `feature_disabled` unless `key` is on for the caller
    pub async fn require_feature(&self, auth: &AuthContext, key: &str) -> Result<(), ApiError> {
        if self.flags.is_enabled(&self.db, key, &auth.user_id, &auth.roles).await? {
            Ok(())
        } else {
            Err(ApiError::FeatureDisabled(key.to_string()))
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// ```text
/// /health, /health/ready                      public
/// /api/v1/                                    bearer JWT required
/// ├── makerspaces/…                           MakrCave tenants, members, inventory, equipment
/// ├── projects/…, notifications/…
/// ├── microsites/…, events/…                  MakrX Events
/// ├── features, admin/features/:key
/// ├── services/…                              gated by `service_marketplace`
/// ├── providers/…, dispatch/orders/:id…
/// ├── products/…, cart/…, checkout, orders/…  MakrX Store
/// ├── admin/products/…, admin/orders/:id/status
/// └── integrations/service-orders/status
/// ```
///
/// Middleware, outermost first: request id, trace span (carrying the
/// request id), request id propagation, panic catcher, CORS, compression.
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/ready", get(routes::health::readiness));

    let makerspace_routes = Router::new()
        .route(
            "/",
            post(routes::makerspaces::create_makerspace).get(routes::makerspaces::list_makerspaces),
        )
        .route(
            "/:id",
            get(routes::makerspaces::get_makerspace).put(routes::makerspaces::update_makerspace),
        )
        .route(
            "/:id/members",
            get(routes::makerspaces::list_members).post(routes::makerspaces::add_member),
        )
        .route(
            "/:id/members/:user_id",
            put(routes::makerspaces::update_member).delete(routes::makerspaces::remove_member),
        )
        .route(
            "/:id/inventory",
            get(routes::inventory::list_items).post(routes::inventory::create_item),
        )
        .route("/:id/inventory/low-stock", get(routes::inventory::low_stock))
        .route(
            "/:id/inventory/:item_id",
            get(routes::inventory::get_item)
                .put(routes::inventory::update_item)
                .delete(routes::inventory::delete_item),
        )
        .route("/:id/inventory/:item_id/adjust", post(routes::inventory::adjust_item))
        .route("/:id/inventory/:item_id/usage", get(routes::inventory::usage_log))
        .route(
            "/:id/equipment",
            get(routes::equipment::list_equipment).post(routes::equipment::create_equipment),
        )
        .route(
            "/:id/equipment/:equipment_id",
            get(routes::equipment::get_equipment)
                .put(routes::equipment::update_equipment)
                .delete(routes::equipment::delete_equipment),
        )
        .route(
            "/:id/equipment/:equipment_id/reservations",
            get(routes::equipment::list_reservations).post(routes::equipment::create_reservation),
        )
        .route(
            "/:id/reservations/:reservation_id/cancel",
            post(routes::equipment::cancel_reservation),
        );

    let project_routes = Router::new()
        .route("/", post(routes::projects::create_project).get(routes::projects::list_projects))
        .route(
            "/:id",
            get(routes::projects::get_project)
                .put(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/:id/collaborators",
            get(routes::projects::list_collaborators).post(routes::projects::add_collaborator),
        )
        .route(
            "/:id/collaborators/:user_id",
            axum::routing::delete(routes::projects::remove_collaborator),
        );

    let notification_routes = Router::new()
        .route(
            "/",
            get(routes::notifications::list_notifications).post(routes::notifications::send_notification),
        )
        .route("/unread-count", get(routes::notifications::unread_count))
        .route("/read-all", post(routes::notifications::mark_all_read))
        .route("/:id", axum::routing::delete(routes::notifications::delete_notification))
        .route("/:id/read", post(routes::notifications::mark_read));

    let microsite_routes = Router::new()
        .route("/", post(routes::events::create_microsite))
        .route("/:slug", get(routes::events::get_microsite))
        .route(
            "/:slug/events",
            get(routes::events::list_microsite_events).post(routes::events::create_microsite_event),
        );

    let event_routes = Router::new()
        .route("/", post(routes::events::create_event).get(routes::events::list_events))
        .route("/:id", get(routes::events::get_event).put(routes::events::update_event))
        .route("/:id/publish", post(routes::events::publish_event))
        .route("/:id/cancel", post(routes::events::cancel_event))
        .route("/:id/register", post(routes::events::register))
        .route("/:id/registration", axum::routing::delete(routes::events::unregister))
        .route("/:id/registrations", get(routes::events::list_registrations))
        .route("/:id/teams", get(routes::events::list_teams).post(routes::events::create_team))
        .route("/:id/teams/:team_id/join", post(routes::events::join_team))
        .route(
            "/:id/tournaments",
            get(routes::events::list_tournaments).post(routes::events::create_tournament),
        )
        .route(
            "/:id/sponsors",
            get(routes::events::list_sponsors).post(routes::events::create_sponsor),
        );

    let service_routes = Router::new()
        .route("/quote", post(routes::services::quote))
        .route(
            "/orders",
            post(routes::services::create_order).get(routes::services::list_orders),
        )
        .route("/orders/:id", get(routes::services::get_order))
        .route("/orders/:id/cancel", post(routes::services::cancel_order))
        .layer(from_fn_with_state(state.clone(), marketplace_gate));

    let provider_routes = Router::new()
        .route("/", post(routes::providers::register_provider))
        .route(
            "/me",
            get(routes::providers::get_my_provider).put(routes::providers::update_my_provider),
        )
        .route("/me/jobs", get(routes::providers::list_my_jobs))
        .route("/jobs/:order_id/accept", post(routes::providers::accept_job))
        .route("/jobs/:order_id/decline", post(routes::providers::decline_job))
        .route("/jobs/:order_id/start", post(routes::providers::start_job))
        .route("/jobs/:order_id/complete", post(routes::providers::complete_job));

    let dispatch_routes = Router::new()
        .route("/orders/:id", post(routes::dispatch::dispatch_now))
        .route("/orders/:id/candidates", get(routes::dispatch::preview_candidates));

    let product_routes = Router::new()
        .route("/", get(routes::products::list_products))
        .route("/:slug", get(routes::products::get_product));

    let cart_routes = Router::new()
        .route("/", get(routes::cart::get_cart))
        .route("/items", post(routes::cart::add_item))
        .route(
            "/items/:product_id",
            put(routes::cart::set_item_quantity).delete(routes::cart::remove_item),
        );

    let order_routes = Router::new()
        .route("/", get(routes::orders::list_orders))
        .route("/:id", get(routes::orders::get_order))
        .route("/:id/cancel", post(routes::orders::cancel_order));

    let admin_routes = Router::new()
        .route("/features", get(routes::features::list_flags))
        .route("/features/:key", put(routes::features::upsert_flag))
        .route("/products", post(routes::products::create_product))
        .route("/products/:id", put(routes::products::update_product))
        .route("/orders/:id/status", put(routes::orders::update_status));

    let v1_routes = Router::new()
        .nest("/makerspaces", makerspace_routes)
        .nest("/projects", project_routes)
        .nest("/notifications", notification_routes)
        .nest("/microsites", microsite_routes)
        .nest("/events", event_routes)
        .route("/features", get(routes::features::my_features))
        .nest("/services", service_routes)
        .nest("/providers", provider_routes)
        .nest("/dispatch", dispatch_routes)
        .nest("/products", product_routes)
        .nest("/cart", cart_routes)
        .route("/checkout", post(routes::cart::checkout))
        .nest("/orders", order_routes)
        .nest("/admin", admin_routes)
        .route(
            "/integrations/service-orders/status",
            post(routes::integrations::receive_service_status),
        )
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors_layer(&state.config))
        .layer(CompressionLayer::new());

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", v1_routes)
        .layer(middleware)
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    ApiError::InternalError(format!("handler panicked: {}", detail)).into_response()
}

/// Verifies the bearer token and injects `AuthContext`
async fn jwt_auth_layer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    match jwt_auth_middleware(Arc::clone(&state.verifier), req, next).await {
        Ok(response) => response,
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Every `/services` route requires the marketplace flag
async fn marketplace_gate(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    let auth = req
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("Missing credentials".to_string()))?;

    state.require_feature(&auth, SERVICE_MARKETPLACE).await?;
    Ok(next.run(req).await)
}
