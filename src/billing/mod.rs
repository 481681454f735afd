pub mod models;
pub mod provider;
pub mod service;

pub use models::{ProviderSubscription, SubscriptionMirror};
pub use provider::{BillingProvider, StripeClient};
pub use service::BillingService;
