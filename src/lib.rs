// Library for tests to access modules

pub mod aggregation;
pub mod config;
pub mod dispatcher;
pub mod export;
pub mod models;
pub mod record_repo;
pub mod routes;
pub mod watcher;
