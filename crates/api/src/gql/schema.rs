use async_graphql::Schema;

use super::{MutationRoot, QueryRoot, SubscriptionRoot};
use crate::state::AppState;

pub type AppSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Build the GraphQL schema and inject shared state (AppState) into the context.
pub fn build_schema(state: AppState) -> AppSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(state) // AppState is Clone; available in resolvers via ctx.data::<AppState>()
        .finish()
}
