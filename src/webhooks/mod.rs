//! Outbound webhook notifications for engine events.

mod client;
mod dispatcher;
mod retry_policy;
mod template;

pub use client::{ReqwestWebhookClient, WebhookClient, WebhookRequest};
pub use dispatcher::{create_dispatcher, DispatcherHandle, WebhookDispatcher};
pub use retry_policy::{classify_status, RetryPolicy};
pub use template::{build_request, interpolate, render};
