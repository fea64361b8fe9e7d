use crate::agent::Advisor;
use crate::api::ApiError;
use crate::cache::Fetched;
use crate::cli::Args;
use crate::data::{ market_trends_key, portfolio_key, recommendations_key, risk_analysis_key };
use crate::models::portfolio::{ Credentials, OnboardingProfile, PortfolioUpdate };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Json,
    Router,
    extract::{ Path, Query, State },
    response::{ IntoResponse, Response },
    http::StatusCode,
};
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error };

#[derive(Deserialize, Default)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataResponse<T> {
    success: bool,
    data: T,
    served_from_cache: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    stale: Option<JsonValue>,
}

#[derive(Clone)]
struct AppState {
    advisor: Arc<Advisor>,
}

pub fn router(advisor: Arc<Advisor>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/reload-responses", get(reload_responses_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/onboarding/complete", post(onboarding_handler))
        .route("/api/advisor/{email}/portfolio", get(portfolio_handler).put(update_portfolio_handler))
        .route("/api/advisor/{email}/recommendations", get(recommendations_handler))
        .route("/api/advisor/{email}/risk-analysis", get(risk_analysis_handler))
        .route("/api/advisor/{email}/market-trends", get(market_trends_handler))
        .layer(cors)
        .with_state(AppState { advisor })
}

pub async fn start_http_server(
    http_port: u16,
    advisor: Arc<Advisor>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(advisor);

    if let (true, Some(cert_path), Some(key_path)) = (
        args.enable_tls,
        args.tls_cert_path.as_ref(),
        args.tls_key_path.as_ref(),
    ) {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        tokio::spawn(async move {
            let result = axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service()).await;

            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });

        info!("HTTPS server started with TLS enabled");
    } else {
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        error!("HTTP server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                }
            }
        });

        info!("HTTP server started");
    }

    Ok(())
}

fn api_error_status(err: &ApiError) -> StatusCode {
    match err {
        ApiError::Status { status, .. } if *status == 401 || *status == 403 => StatusCode::UNAUTHORIZED,
        ApiError::Status { status, .. } if *status == 404 => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn failure(err: &ApiError, what: &str, stale: Option<JsonValue>) -> Response {
    (
        api_error_status(err),
        Json(ErrorResponse {
            success: false,
            error: err.user_message(what),
            stale,
        }),
    ).into_response()
}

/// Success carries the payload; failure carries the last cached payload, if any.
async fn cached_response<T: Serialize>(
    state: &AppState,
    what: &str,
    key: String,
    result: Result<Fetched<T>, ApiError>
) -> Response {
    match result {
        Ok(fetched) =>
            Json(DataResponse {
                success: true,
                data: fetched.data,
                served_from_cache: fetched.served_from_cache,
            }).into_response(),
        Err(e) => {
            let stale = state.advisor.data().stale::<JsonValue>(&key).await;
            failure(&e, what, stale)
        }
    }
}

async fn reload_responses_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.advisor.reload_responses_if_changed().await {
        Ok(reloaded) =>
            (
                StatusCode::OK,
                Json(ReloadResponse {
                    success: true,
                    message: (if reloaded { "Responses reloaded" } else { "Responses unchanged" }).into(),
                }),
            ),
        Err(e) => {
            error!("Failed to reload responses: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(ReloadResponse {
                    success: false,
                    message: format!("Reload error: {}", e),
                }),
            )
        }
    }
}

async fn login_handler(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>
) -> Response {
    match state.advisor.data().login(&credentials).await {
        Ok(user) => Json(DataResponse { success: true, data: user, served_from_cache: false }).into_response(),
        Err(e) => failure(&e, "your account", None),
    }
}

async fn onboarding_handler(
    State(state): State<AppState>,
    Json(profile): Json<OnboardingProfile>
) -> Response {
    match state.advisor.data().complete_onboarding(&profile).await {
        Ok(user) => Json(DataResponse { success: true, data: user, served_from_cache: false }).into_response(),
        Err(e) => failure(&e, "your profile", None),
    }
}

async fn portfolio_handler(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Query(query): Query<RefreshQuery>
) -> Response {
    let result = state.advisor.data().portfolio(&email, query.refresh).await;
    cached_response(&state, "portfolio", portfolio_key(&email), result).await
}

async fn update_portfolio_handler(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(update): Json<PortfolioUpdate>
) -> Response {
    match state.advisor.data().update_portfolio(&email, &update).await {
        Ok(portfolio) =>
            Json(DataResponse { success: true, data: portfolio, served_from_cache: false }).into_response(),
        Err(e) => failure(&e, "portfolio", None),
    }
}

async fn recommendations_handler(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Query(query): Query<RefreshQuery>
) -> Response {
    let result = state.advisor.data().recommendations(&email, query.refresh).await;
    cached_response(&state, "recommendations", recommendations_key(&email), result).await
}

async fn risk_analysis_handler(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Query(query): Query<RefreshQuery>
) -> Response {
    let result = state.advisor.data().risk_analysis(&email, query.refresh).await;
    cached_response(&state, "risk analysis", risk_analysis_key(&email), result).await
}

async fn market_trends_handler(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Query(query): Query<RefreshQuery>
) -> Response {
    let result = state.advisor.data().market_trends(&email, query.refresh).await;
    cached_response(&state, "market trends", market_trends_key(&email), result).await
}
