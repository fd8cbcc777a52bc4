//! Debt-based token bucket.
//!
//! Each bucket tracks when its client was last admitted and how much time the
//! client owes (`sleep_for`, positive) or has banked (negative). Every call
//! adds one request's worth of time and subtracts the time since the last
//! admission; the result is floored at `max_slack` so idle clients cannot bank
//! an unbounded burst.
//!
//! Arithmetic is done in signed nanoseconds so the accounting is exact.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::{ThrottlePolicy, ValidationError};

/// Outcome of asking a bucket for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Within budget.
    Admit,
    /// Over budget under `ThrottlePolicy::Delay`: the debt is committed and the
    /// request may proceed once this much time has passed.
    Delay(Duration),
    /// Over budget under `ThrottlePolicy::Reject`. Nothing was charged;
    /// `retry_after` is how long until the next call would be admitted.
    Reject { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Reject { .. })
    }
}

/// Validated parameters shared by every bucket of one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketParams {
    per_request: i128,
    max_slack: i128,
    policy: ThrottlePolicy,
}

impl BucketParams {
    /// `send_rate` requests per second, tolerating bursts of `slack` requests.
    pub fn new(send_rate: f64, slack: u32, policy: ThrottlePolicy) -> Result<Self, ValidationError> {
        if !send_rate.is_finite() || send_rate <= 0.0 {
            return Err(ValidationError::InvalidSendRate(send_rate));
        }
        if slack == 0 {
            return Err(ValidationError::ZeroSlack);
        }
        let per_request = Duration::try_from_secs_f64(1.0 / send_rate)
            .map_err(|_| ValidationError::InvalidSendRate(send_rate))?
            .as_nanos() as i128;
        if per_request == 0 {
            return Err(ValidationError::InvalidSendRate(send_rate));
        }

        Ok(Self {
            per_request,
            max_slack: -(slack as i128) * per_request,
            policy,
        })
    }

    /// Time budget of a single request.
    pub fn per_request(&self) -> Duration {
        nanos_to_duration(self.per_request)
    }

    /// Largest credit a bucket may hold.
    pub fn max_credit(&self) -> Duration {
        nanos_to_duration(-self.max_slack)
    }
}

#[derive(Debug, Default)]
struct BucketState {
    last: Option<Instant>,
    sleep_for: i128,
}

/// Rate state of a single client key.
#[derive(Debug)]
pub struct TokenBucket {
    params: BucketParams,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(params: BucketParams) -> Self {
        Self {
            params,
            state: Mutex::new(BucketState::default()),
        }
    }

    pub fn allow(&self) -> Admission {
        self.allow_at(Instant::now())
    }

    /// Decide admission for a call arriving at `now`.
    ///
    /// Calls on the same bucket are serialized by its mutex, so concurrent
    /// requests from one client are charged in a total order.
    pub fn allow_at(&self, now: Instant) -> Admission {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(last) = state.last else {
            state.last = Some(now);
            return Admission::Admit;
        };

        let debt = (state.sleep_for + self.params.per_request - signed_nanos_between(last, now))
            .max(self.params.max_slack);

        if debt <= 0 {
            state.sleep_for = debt;
            state.last = Some(now);
            return Admission::Admit;
        }

        let wait = nanos_to_duration(debt);
        match self.params.policy {
            ThrottlePolicy::Reject => Admission::Reject { retry_after: wait },
            ThrottlePolicy::Delay => {
                // The caller is released at `now + wait`; that is its admission time.
                state.last = Some(now + wait);
                state.sleep_for = 0;
                Admission::Delay(wait)
            }
        }
    }
}

/// `to - from` in nanoseconds, negative when `to` precedes `from`.
fn signed_nanos_between(from: Instant, to: Instant) -> i128 {
    if to >= from {
        to.duration_since(from).as_nanos() as i128
    } else {
        -(from.duration_since(to).as_nanos() as i128)
    }
}

fn nanos_to_duration(nanos: i128) -> Duration {
    let nanos = nanos.clamp(0, u64::MAX as i128) as u64;
    Duration::from_nanos(nanos)
}
