// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempt, quiz},
    state::AppState,
    utils::jwt::{auth_middleware, staff_middleware},
};

/// Assembles the main application router.
///
/// * Every quiz route requires a bearer token.
/// * Authoring and results routes additionally require a staff role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let student_routes = Router::new()
        .route("/{id}", get(quiz::get_quiz))
        .route("/{id}/submit", post(attempt::submit_attempt))
        .route("/{id}/attempts", get(attempt::get_attempt_history));

    // Auth first, then the staff check
    let staff_routes = Router::new()
        .route("/", post(quiz::create_quiz))
        .route("/{id}/results", get(attempt::get_results))
        .layer(middleware::from_fn(staff_middleware));

    let quiz_routes = student_routes
        .merge(staff_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api/quizzes", quiz_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
