#![allow(dead_code)]

use axum::{
    extract::{ Path, State },
    http::StatusCode,
    routing::{ get, post },
    Json,
    Router,
};
use robo_advisor::agent::{ Advisor, TypingDelay };
use robo_advisor::api::HttpAdvisorBackend;
use robo_advisor::cache::CacheGate;
use robo_advisor::config::responses::ResponseTable;
use robo_advisor::data::{ CacheTtls, DataService };
use robo_advisor::storage::MemoryStore;
use serde_json::{ json, Value };
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct Calls {
    pub recommendations: AtomicUsize,
    pub risk_analysis: AtomicUsize,
    pub market_report: AtomicUsize,
    pub portfolio: AtomicUsize,
    pub fail_recommendations: AtomicBool,
    pub fail_risk_analysis: AtomicBool,
}

impl Calls {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct FakeBackend {
    pub base_url: String,
    pub calls: Arc<Calls>,
}

type Reply = (StatusCode, Json<Value>);

fn ok(body: Value) -> Reply {
    (StatusCode::OK, Json(body))
}

async fn login(Json(body): Json<Value>) -> Reply {
    if body["password"] == "secret" {
        ok(json!({ "success": true, "user": { "email": body["email"], "name": "Jane" } }))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "success": false, "message": "Invalid credentials" })))
    }
}

async fn onboarding(Json(body): Json<Value>) -> Reply {
    ok(json!({ "success": true, "user": { "email": body["email"], "riskTolerance": body["riskTolerance"] } }))
}

async fn portfolio(State(calls): State<Arc<Calls>>, Path(email): Path<String>) -> Reply {
    calls.portfolio.fetch_add(1, Ordering::SeqCst);
    ok(
        json!({
            "success": true,
            "portfolio": {
                "email": email,
                "holdings": [ { "symbol": "AAPL", "shares": 10.0, "avgPrice": 120.0, "currentPrice": 150.0 } ],
                "cash": 500.0
            }
        })
    )
}

async fn update_portfolio(Json(body): Json<Value>) -> Reply {
    ok(json!({ "success": true, "portfolio": body }))
}

async fn recommendations(State(calls): State<Arc<Calls>>, Path(email): Path<String>) -> Reply {
    let n = calls.recommendations.fetch_add(1, Ordering::SeqCst) + 1;
    if calls.fail_recommendations.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "boom" })));
    }
    ok(
        json!({
            "success": true,
            "recommendations": {
                "immediate": [ { "action": "trim", "symbol": "AAPL" } ],
                "short_term": [],
                "long_term": [ { "action": "add", "symbol": "VTI" } ],
                "opportunities": []
            },
            "summary": { "generation": n, "email": email },
            "ai_insights": null,
            "metadata": {},
            "confidence": 0.8,
            "explainability": {}
        })
    )
}

async fn risk_analysis(State(calls): State<Arc<Calls>>) -> Reply {
    calls.risk_analysis.fetch_add(1, Ordering::SeqCst);
    if calls.fail_risk_analysis.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "risk engine offline" })));
    }
    ok(json!({ "success": true, "riskAnalysis": { "riskScore": 6.2, "riskLabel": "Moderate" } }))
}

async fn market_report(State(calls): State<Arc<Calls>>, Path(email): Path<String>) -> Reply {
    calls.market_report.fetch_add(1, Ordering::SeqCst);
    if email == "empty@example.com" {
        return ok(json!({ "success": false, "message": "No holdings" }));
    }
    ok(
        json!({
            "success": true,
            "holdings": [ { "symbol": "AAPL", "change": 1.5 } ],
            "portfolioMetrics": { "dailyChange": 0.7 }
        })
    )
}

pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub async fn spawn_fake_backend() -> FakeBackend {
    let calls = Arc::new(Calls::default());
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/onboarding/complete", post(onboarding))
        .route("/api/portfolio/{email}", get(portfolio).put(update_portfolio))
        .route("/api/portfolio/{email}/recommendations", get(recommendations))
        .route("/api/portfolio/{email}/risk-analysis", get(risk_analysis))
        .route("/api/portfolio/{email}/market-report", get(market_report))
        .with_state(Arc::clone(&calls));

    FakeBackend { base_url: serve(app).await, calls }
}

pub fn backend_client(fake: &FakeBackend) -> HttpAdvisorBackend {
    HttpAdvisorBackend::new(&fake.base_url, Duration::from_secs(5)).unwrap()
}

pub fn data_service(fake: &FakeBackend, ttls: CacheTtls) -> Arc<DataService> {
    let store = Arc::new(MemoryStore::new());
    Arc::new(DataService::new(Arc::new(backend_client(fake)), CacheGate::new(store), ttls))
}

pub fn advisor(fake: &FakeBackend, ttls: CacheTtls, typing_delay: TypingDelay) -> Arc<Advisor> {
    Arc::new(
        Advisor::new(
            data_service(fake, ttls),
            Arc::new(ResponseTable::builtin()),
            None,
            typing_delay
        )
    )
}
