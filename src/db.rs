pub mod call_logs;
pub mod ledger;
pub mod members;
pub mod trial_calls;
pub mod webhook_events;
