//! # Delay Injection
//!
//! Requests carrying `X-Add-Delay: <duration>` are held for that long
//! before reaching the handler, so device clients can exercise their
//! timeout handling. Durations use the `300ms` / `2.5s` / `1m30s` notation;
//! an unparseable value is ignored and longer values are clamped to
//! [`MAX_ADD_DELAY`].

use std::time::Duration;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Header read by [`delay_middleware`].
pub const ADD_DELAY_HEADER: &str = "x-add-delay";

/// Longest delay a single request can ask for.
pub const MAX_ADD_DELAY: Duration = Duration::from_secs(30);

/// Parse a duration such as `300ms`, `2.5s`, or `1h2m3s`.
///
/// Accepted units: `ns`, `us`, `µs`, `ms`, `s`, `m`, `h`. Returns `None`
/// for empty, negative, or malformed input.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let mut rest = raw.trim();
    if rest.is_empty() {
        return None;
    }
    if rest == "0" {
        return Some(Duration::ZERO);
    }
    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos: u128 = match &rest[..unit_len] {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_nanos = total_nanos.checked_add(scaled(number, unit_nanos)?)?;
    }
    u64::try_from(total_nanos).ok().map(Duration::from_nanos)
}

/// `number` (decimal, optional fraction) times `unit_nanos`, truncated.
fn scaled(number: &str, unit_nanos: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(unit_nanos)?;
    if !fraction.is_empty() {
        let digits: u128 = fraction.parse().ok()?;
        let scale = 10u128.checked_pow(u32::try_from(fraction.len()).ok()?)?;
        nanos = nanos.checked_add(digits.checked_mul(unit_nanos)? / scale)?;
    }
    Some(nanos)
}

/// Sleep for the duration named in `X-Add-Delay`, then run the handler.
pub async fn delay_middleware(request: Request, next: Next) -> Response {
    let delay = request
        .headers()
        .get(ADD_DELAY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_duration)
        .map(|d| d.min(MAX_ADD_DELAY));
    if let Some(delay) = delay {
        tracing::debug!(delay_ms = delay.as_millis() as u64, "injecting request delay");
        tokio::time::sleep(delay).await;
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use proptest::prelude::*;
    use tower::ServiceExt;

    #[test]
    fn parses_common_forms() {
        assert_eq!(parse_duration("300ms"), Some(Duration::from_millis(300)));
        assert_eq!(parse_duration("2.5s"), Some(Duration::from_millis(2500)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
    }

    #[test]
    fn rejects_malformed_values() {
        for raw in ["", "abc", "10", "5 s", "-1s", "1x", "ms"] {
            assert_eq!(parse_duration(raw), None, "{raw:?}");
        }
    }

    proptest! {
        #[test]
        fn whole_milliseconds_round_trip(ms in 0u64..10_000_000) {
            prop_assert_eq!(parse_duration(&format!("{ms}ms")), Some(Duration::from_millis(ms)));
        }
    }

    fn test_app() -> Router {
        Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(from_fn(delay_middleware))
    }

    #[tokio::test(start_paused = true)]
    async fn delays_request_by_header_value() {
        let started = tokio::time::Instant::now();
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("X-Add-Delay", "2s")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn long_delay_is_clamped() {
        let started = tokio::time::Instant::now();
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("X-Add-Delay", "1h")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let elapsed = started.elapsed();
        assert!(elapsed >= MAX_ADD_DELAY);
        assert!(elapsed < MAX_ADD_DELAY + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_header_is_ignored() {
        let started = tokio::time::Instant::now();
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("X-Add-Delay", "soon")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(started.elapsed() < Duration::from_millis(1));
    }
}
