//! Per-client-IP rate limiting with governor.
//!
//! The limiter is checked inside the handler (after validation) rather than
//! as a layer, so malformed requests don't consume a client's allowance.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use governor::{DefaultKeyedRateLimiter, RateLimiter};

use crate::config::RateLimitConfig;

/// Tracked keys before stale entries are purged.
const RETAIN_THRESHOLD: usize = 10_000;

/// Proxy headers carrying the real client IP, most trusted first.
const CLIENT_IP_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-real-ip",
    "fly-client-ip",
];

/// The requesting client's IP address.
///
/// Resolved from Cloudflare and proxy headers first, then the socket peer.
/// Falls back to the unspecified address so all unidentifiable clients share
/// one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// First parseable IP in the known proxy headers.
fn ip_from_headers(headers: &HeaderMap) -> Option<IpAddr> {
    CLIENT_IP_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            // X-Forwarded-For is a chain; the client is first
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    })
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = ip_from_headers(&parts.headers)
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        Ok(Self(ip))
    }
}

/// Keyed limiter for the subscribe endpoint.
pub struct IpRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl IpRateLimiter {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limiter: RateLimiter::keyed(config.quota()),
        }
    }

    /// Consume one request from `ip`'s allowance. Returns `false` when exhausted.
    pub fn check(&self, ip: IpAddr) -> bool {
        if self.limiter.len() > RETAIN_THRESHOLD {
            self.limiter.retain_recent();
        }
        self.limiter.check_key(&ip).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;
    use std::time::Duration;

    use axum::http::{HeaderValue, Request};

    use super::*;

    async fn client_ip(request: Request<()>) -> IpAddr {
        let (mut parts, ()) = request.into_parts();
        ClientIp::from_request_parts(&mut parts, &()).await.unwrap().0
    }

    #[tokio::test]
    async fn test_cloudflare_header_wins() {
        let request = Request::builder()
            .header("x-forwarded-for", "10.0.0.1")
            .header("cf-connecting-ip", "203.0.113.7")
            .body(())
            .unwrap();
        assert_eq!(client_ip(request).await, "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_forwarded_for_takes_first_hop() {
        let request = Request::builder()
            .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(request).await, "198.51.100.4".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_garbage_header_falls_through() {
        let mut request = Request::builder()
            .header("x-real-ip", "not-an-ip")
            .body(())
            .unwrap();
        request.headers_mut().insert("fly-client-ip", HeaderValue::from_static("2001:db8::1"));
        assert_eq!(client_ip(request).await, "2001:db8::1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_socket_peer_then_unspecified() {
        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo("192.0.2.9:5000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_ip(request).await, "192.0.2.9".parse::<IpAddr>().unwrap());

        let request = Request::builder().body(()).unwrap();
        assert_eq!(client_ip(request).await, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_limiter_is_per_ip() {
        let config =
            RateLimitConfig::new(NonZeroU32::new(2).unwrap(), Duration::from_secs(600)).unwrap();
        let limiter = IpRateLimiter::new(&config);
        let a: IpAddr = "203.0.113.1".parse().unwrap();
        let b: IpAddr = "203.0.113.2".parse().unwrap();

        assert!(limiter.check(a));
        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
    }

    #[test]
    fn test_spent_allowance_stays_spent_for_the_window() {
        let config =
            RateLimitConfig::new(NonZeroU32::new(5).unwrap(), Duration::from_secs(1)).unwrap();
        let limiter = IpRateLimiter::new(&config);
        let ip: IpAddr = "198.51.100.7".parse().unwrap();

        for _ in 0..5 {
            assert!(limiter.check(ip));
        }
        std::thread::sleep(Duration::from_millis(250));
        assert!(!limiter.check(ip));

        // A full window later exactly one request is back
        std::thread::sleep(Duration::from_millis(900));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }
}
