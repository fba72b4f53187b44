//! Token-matching user-agent classifier.
//!
//! Coarse: fixed substrings against the lower-cased string, first
//! match wins within each of OS, browser and device class.

use crate::normalize::record::DeviceType;

/// Labels derived from a user-agent string. Empty strings mean "not recognized".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentInfo {
    /// Operating system label.
    pub os: &'static str,
    /// Browser label.
    pub browser: &'static str,
    /// Device class; never `Unknown` for a parsed agent.
    pub device_type: DeviceType,
}

/// Classify a raw user-agent string.
#[must_use]
pub fn parse_user_agent(ua: &str) -> UserAgentInfo {
    let value = ua.to_lowercase();
    let has = |needle: &str| value.contains(needle);

    let os = if has("android") {
        "Android"
    } else if has("iphone") || has("ipad") {
        "iOS"
    } else if has("mac os") {
        "macOS"
    } else if has("windows") {
        "Windows"
    } else if has("linux") {
        "Linux"
    } else {
        ""
    };

    let browser = if has("edg/") {
        "Edge"
    } else if has("chrome") && !has("chromium") {
        "Chrome"
    } else if has("safari") && !has("chrome") {
        "Safari"
    } else if has("firefox") {
        "Firefox"
    } else {
        ""
    };

    let device_type = if has("ipad") || has("tablet") {
        DeviceType::Tablet
    } else if has("mobi") || has("android") || has("iphone") {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    };

    UserAgentInfo {
        os,
        browser,
        device_type,
    }
}
