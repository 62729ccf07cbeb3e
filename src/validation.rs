//! URL validation and SSRF protection for webhook delivery endpoints.
//!
//! Production deployments require HTTPS and reject destinations that resolve
//! to loopback or private network ranges. Outside production the checks are
//! relaxed so local development can target plain-HTTP endpoints.

use std::net::IpAddr;

use crate::error::WebhookError;
use crate::models::WebhookEventType;

// ---------------------------------------------------------------------------
// URL validation
// ---------------------------------------------------------------------------

/// Validate a webhook delivery URL.
///
/// Always rejects unparseable URLs and non-HTTP(S) schemes. With `production`
/// set, additionally requires HTTPS and blocks internal hosts.
pub fn validate_webhook_url(url: &str, production: bool) -> Result<(), WebhookError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::InvalidUrl(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if !production => {}
        "http" => {
            return Err(WebhookError::InvalidUrl(
                "Webhook URLs must use HTTPS in production".to_string(),
            ));
        }
        scheme => {
            return Err(WebhookError::InvalidUrl(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| WebhookError::InvalidUrl("URL must have a host".to_string()))?;

    if production {
        validate_host_not_internal(host)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Reject hosts that point at loopback or private network ranges.
///
/// Blocks `localhost`, 127.0.0.0/8, 10.0.0.0/8, 172.16.0.0/12,
/// 192.168.0.0/16, and the IPv6 loopback/unspecified addresses.
pub fn validate_host_not_internal(host: &str) -> Result<(), WebhookError> {
    if host.eq_ignore_ascii_case("localhost") {
        return Err(WebhookError::SsrfDetected(
            "Destination host localhost is not allowed".to_string(),
        ));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_internal_ip(&ip) {
            return Err(WebhookError::SsrfDetected(format!(
                "Destination host {host} is a private/internal address"
            )));
        }
    }

    Ok(())
}

/// Check if an IP address belongs to a loopback or private range.
fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()        // 127.0.0.0/8
                || v4.is_private()  // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Event type validation
// ---------------------------------------------------------------------------

/// Validate a subscription's event-type set: non-empty, all types known.
pub fn validate_event_types(event_types: &[String]) -> Result<(), WebhookError> {
    if event_types.is_empty() {
        return Err(WebhookError::Validation(
            "At least one event type is required".to_string(),
        ));
    }
    for et in event_types {
        if WebhookEventType::parse(et).is_none() {
            return Err(WebhookError::Validation(format!(
                "Unknown event type: {et}"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
