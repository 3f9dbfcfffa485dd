pub mod contribution;
pub mod invoice;
pub mod payment_event;
pub mod payment_provider;
pub mod provider_credential;
pub mod subscription_plan;
pub mod user_subscription;
