pub mod auth;
pub mod config;
pub mod dates;
pub mod engine;
pub mod http;
pub mod limits;
pub mod mailer;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod wal;
