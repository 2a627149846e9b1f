pub mod auth;
pub mod configuration;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod telemetry;
pub mod users;
pub mod validators;
