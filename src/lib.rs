pub mod agent;
pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod notify;
pub mod phone;
pub mod routes;
pub mod telephony;
pub mod twiml;
pub mod usage;
pub mod webhooks;
