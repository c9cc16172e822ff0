//! HTTP middleware and request extractors.

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::{ClientIp, IpRateLimiter};
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
