//! Alert evaluation and notification dispatch

mod evaluator;
mod notifier;

pub use evaluator::{AlertStateMachine, Evaluation};
pub use notifier::{LogNotifier, NotificationSink, WebhookDispatcher};
