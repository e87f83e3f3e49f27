//! Subscription bookkeeping for Castline.
//!
//! # Key types
//!
//! - [`ChannelPattern`] — an exact channel name or an anchored regex
//! - [`Listener`] — anything that can receive `(channel, payload)`
//! - [`SubscriptionRegistry`] — the set of live subscriptions
//! - [`SubscriptionId`] — handle used to remove a subscription

mod error;
mod listener;
mod pattern;
mod registry;

pub use error::RegistryError;
pub use listener::{Listener, ReceivedMessage, forward_bounded, forward_unbounded};
pub use pattern::ChannelPattern;
pub use registry::{SubscriptionId, SubscriptionRegistry};
