//! Rate limiting logic and state management.

mod clock;
mod key;
mod limiter;
mod rules;
mod store;
mod sweeper;
mod window;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use key::WindowKey;
pub use limiter::{Admission, Quota, RateLimiter};
pub use rules::{
    EndpointLimit, RateLimitRule, RouteRule, RuleSet, RulesConfig, TimeUnit,
    DEFAULT_REQUESTS_PER_MINUTE,
};
pub use store::{Observation, WindowStore};
pub use sweeper::Sweeper;
pub use window::TimeWindow;
