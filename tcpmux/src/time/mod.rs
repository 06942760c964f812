//! Timeout utilities.
//!
//! Every blocking-equivalent call in this crate takes a [`Timeout`]:
//! - [`Timeout::Infinite`] waits until the call's condition is met,
//! - [`Timeout::Immediate`] makes a single attempt and returns,
//! - [`Timeout::After`] keeps retrying until the condition is met or the
//!   duration has elapsed on the monotonic clock.

mod timeout;

#[doc(inline)]
pub use timeout::Timeout;

pub(crate) use timeout::Deadline;
