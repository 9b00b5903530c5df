pub mod router;
pub mod subscribers;

pub use router::{OutputRouter, RetryPolicy, RouterHandle};
pub use subscribers::SubscriberRegistry;
