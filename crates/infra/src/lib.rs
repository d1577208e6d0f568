pub mod clock;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod pagination;
pub mod repos;
pub mod retry;
pub mod store;
