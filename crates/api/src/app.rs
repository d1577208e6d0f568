use std::time::Duration;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse, GraphQLSubscription};
use axum::{
    extract::State,
    middleware::from_fn_with_state,
    response::{Html, IntoResponse},
    routing::{get, post},
    Extension, Router,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::Claims;
use crate::error::AppError;
use crate::gql::AppSchema;
use crate::middleware::jwt_middleware;
use crate::state::AppState;

/// Build the Axum router with health endpoint and GraphQL
pub fn build_router(state: AppState, schema: AppSchema) -> Router {
    let gql_ws = GraphQLSubscription::new(schema.clone());

    Router::new()
        // Liveness check; also proves the store answers.
        .route("/health", get(health))
        .route("/graphiql", get(graphiql))
        // graphql post & subscription
        .route("/graphql", post(graphql_handler).get_service(gql_ws))
        .layer(Extension(schema))
        .layer(from_fn_with_state(state.clone(), jwt_middleware))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive()) // tighten later
}

/// Executes a GraphQL request with the caller's claims, if the jwt middleware found any.
async fn graphql_handler(
    Extension(schema): Extension<AppSchema>,
    claims: Option<Extension<Claims>>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let mut req = req.into_inner();
    if let Some(Extension(claims)) = claims {
        req = req.data(claims);
    }
    schema.execute(req).await.into()
}

async fn graphiql() -> impl IntoResponse {
    Html(
        GraphiQLSource::build()
            .endpoint("/graphql")
            .subscription_endpoint("/graphql")
            .finish(),
    )
}

async fn health(State(state): State<AppState>) -> Result<&'static str, AppError> {
    state.engine().store().ping().await?;
    Ok("ok")
}
