//! # Request Context Extraction
//!
//! Builds a [`ClientInfo`] and a derived [`DeviceInfo`] from the metadata
//! headers every RPC (and public HTTP call) carries:
//!
//! | Header | Field |
//! |--------|-------|
//! | `x-application-id` | `application_id` |
//! | `x-tenant-id` | `tenant_id` |
//! | `x-client-name` / `x-client-version` | client identification |
//! | `x-platform` / `x-environment` | client platform labels |
//! | `x-forwarded-for` | first hop becomes `ip_address` |
//! | `user-agent` | raw UA + device classification |
//!
//! Extraction never fails: absent or malformed headers leave fields empty.
//! Authentication decides later whether the request may proceed.

use actix_web::http::header::HeaderMap;
use actix_web::HttpRequest;
use uuid::Uuid;

use crate::domain::DeviceInfo;

// =============================================================================
// CLIENT INFO
// =============================================================================

/// Caller-supplied request metadata.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    /// Tenant scope claimed by the caller (verified downstream)
    pub application_id: Option<Uuid>,
    /// Free-form tenant label for multi-tenant deployments
    pub tenant_id: Option<String>,
    /// Calling service/application name
    pub client_name: Option<String>,
    /// Calling client version
    pub client_version: Option<String>,
    /// "web", "ios", "android", "cli", ...
    pub platform: Option<String>,
    /// "production", "staging", ...
    pub environment: Option<String>,
    /// Client IP (first `x-forwarded-for` hop, else peer address)
    pub ip_address: Option<String>,
    /// Raw User-Agent header
    pub user_agent: Option<String>,
}

/// Everything the transport knows about a request before authentication.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Caller-supplied metadata
    pub client: ClientInfo,
    /// Device classification derived from the metadata
    pub device: DeviceInfo,
}

/// Extracts the full context from a request.
pub fn extract(req: &HttpRequest) -> RequestContext {
    let headers = req.headers();

    let ip_address = forwarded_ip(headers)
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()));
    let user_agent = header_str(headers, "user-agent");

    let client = ClientInfo {
        application_id: header_str(headers, "x-application-id")
            .and_then(|v| Uuid::parse_str(&v).ok()),
        tenant_id: header_str(headers, "x-tenant-id"),
        client_name: header_str(headers, "x-client-name"),
        client_version: header_str(headers, "x-client-version"),
        platform: header_str(headers, "x-platform"),
        environment: header_str(headers, "x-environment"),
        ip_address: ip_address.clone(),
        user_agent: user_agent.clone(),
    };

    let device = derive_device(user_agent.as_deref(), ip_address);

    RequestContext { client, device }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First hop of `x-forwarded-for` (the original client).
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
}

// =============================================================================
// DEVICE CLASSIFICATION
// =============================================================================

/// Derives a coarse device fingerprint from the User-Agent.
///
/// Classification is a best-effort label for the session ledger, not a
/// security signal; unknown agents land in the `unknown` buckets.
pub fn derive_device(user_agent: Option<&str>, ip_address: Option<String>) -> DeviceInfo {
    let Some(ua) = user_agent else {
        return DeviceInfo {
            device_type: "unknown".to_string(),
            os: "unknown".to_string(),
            browser: "unknown".to_string(),
            ip_address,
            user_agent: None,
        };
    };

    let lower = ua.to_lowercase();

    let device_type = if lower.contains("bot") || lower.contains("curl") || lower.contains("python")
    {
        "bot"
    } else if lower.contains("ipad") || lower.contains("tablet") {
        "tablet"
    } else if lower.contains("mobile") || lower.contains("iphone") || lower.contains("android") {
        "mobile"
    } else {
        "desktop"
    };

    let os = if lower.contains("iphone") || lower.contains("ipad") || lower.contains("ios") {
        "iOS"
    } else if lower.contains("android") {
        "Android"
    } else if lower.contains("windows") {
        "Windows"
    } else if lower.contains("mac os") || lower.contains("macintosh") {
        "macOS"
    } else if lower.contains("linux") {
        "Linux"
    } else {
        "unknown"
    };

    // Order matters: Edge and Chrome both announce "chrome", Chrome and
    // Safari both announce "safari"
    let browser = if lower.contains("edg/") {
        "Edge"
    } else if lower.contains("firefox") {
        "Firefox"
    } else if lower.contains("chrome") {
        "Chrome"
    } else if lower.contains("safari") {
        "Safari"
    } else if lower.contains("curl") {
        "curl"
    } else {
        "unknown"
    };

    DeviceInfo {
        device_type: device_type.to_string(),
        os: os.to_string(),
        browser: browser.to_string(),
        ip_address,
        user_agent: Some(ua.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    #[test]
    fn test_desktop_chrome_classification() {
        let device = derive_device(Some(CHROME_MAC), None);
        assert_eq!(device.device_type, "desktop");
        assert_eq!(device.os, "macOS");
        assert_eq!(device.browser, "Chrome");
        assert_eq!(device.session_name(), "Chrome on macOS");
    }

    #[test]
    fn test_mobile_safari_classification() {
        let device = derive_device(Some(SAFARI_IPHONE), None);
        assert_eq!(device.device_type, "mobile");
        assert_eq!(device.os, "iOS");
        assert_eq!(device.browser, "Safari");
    }

    #[test]
    fn test_bot_classification() {
        let device = derive_device(Some("curl/8.4.0"), None);
        assert_eq!(device.device_type, "bot");
        assert_eq!(device.browser, "curl");
    }

    #[test]
    fn test_missing_user_agent() {
        let device = derive_device(None, Some("203.0.113.7".to_string()));
        assert_eq!(device.device_type, "unknown");
        assert_eq!(device.os, "unknown");
        assert_eq!(device.browser, "unknown");
        assert_eq!(device.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(device.session_name(), "Unknown device");
    }
}
