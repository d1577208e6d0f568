pub mod schema;
pub mod queries;
pub mod mutations;
pub mod subscriptions;
pub mod types;
pub mod scalars;

pub use schema::{build_schema, AppSchema};
pub use queries::QueryRoot;
pub use mutations::MutationRoot;
pub use subscriptions::SubscriptionRoot;
