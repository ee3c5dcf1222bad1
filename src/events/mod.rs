//! Event Subscription Bus (C7).

pub mod bus;

pub use bus::{EventBus, Notification, Subscription};
