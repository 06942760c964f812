use std::time::{Duration, Instant};

/// How long a read, write or poll may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Timeout {
    /// Wait until the call's condition is satisfied.
    #[default]
    Infinite,

    /// Make one attempt and return with whatever is available.
    Immediate,

    /// Retry until the condition is satisfied or the duration elapses.
    After(Duration),
}

impl Timeout {
    /// Maps the integer millisecond encoding onto a [`Timeout`].
    ///
    /// Negative values block, zero returns immediately and positive
    /// values are a limit in milliseconds.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use tcpmux::Timeout;
    ///
    /// assert_eq!(Timeout::from_millis(-1), Timeout::Infinite);
    /// assert_eq!(Timeout::from_millis(0), Timeout::Immediate);
    /// assert_eq!(
    ///     Timeout::from_millis(250),
    ///     Timeout::After(Duration::from_millis(250))
    /// );
    /// ```
    pub fn from_millis(ms: i64) -> Self {
        match ms {
            ms if ms < 0 => Timeout::Infinite,
            0 => Timeout::Immediate,
            ms => Timeout::After(Duration::from_millis(ms as u64)),
        }
    }

    /// Returns `true` for [`Timeout::Infinite`].
    pub fn is_infinite(&self) -> bool {
        matches!(self, Timeout::Infinite)
    }

    /// Returns the wait limit, `None` when the wait is unbounded.
    ///
    /// [`Timeout::Immediate`] and a zero [`Timeout::After`] both map to
    /// [`Duration::ZERO`].
    pub fn limit(&self) -> Option<Duration> {
        match self {
            Timeout::Infinite => None,
            Timeout::Immediate => Some(Duration::ZERO),
            Timeout::After(d) => Some(*d),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Timeout::Immediate
        } else {
            Timeout::After(duration)
        }
    }
}

/// A monotonic deadline started from a [`Timeout`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// Starts measuring now.
    pub(crate) fn start(timeout: Timeout) -> Self {
        Self {
            start: Instant::now(),
            limit: timeout.limit(),
        }
    }

    /// Returns `true` once the elapsed time exceeds the limit.
    ///
    /// An unbounded deadline never expires.
    pub(crate) fn expired(&self) -> bool {
        match self.limit {
            None => false,
            Some(limit) => self.start.elapsed() >= limit,
        }
    }

    /// Time left before expiry, `None` when unbounded.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.limit
            .map(|limit| limit.saturating_sub(self.start.elapsed()))
    }

    /// Sleeps for `interval`, shortened so the deadline is not overshot.
    pub(crate) fn pause(&self, interval: Duration) {
        let nap = match self.remaining() {
            Some(left) => left.min(interval),
            None => interval,
        };

        if !nap.is_zero() {
            std::thread::sleep(nap);
        }
    }
}
