pub mod sweeper_service;

pub use sweeper_service::spawn_sweeper_service;
