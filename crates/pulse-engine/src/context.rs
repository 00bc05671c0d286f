//! Environment-derived properties installed into super-properties at
//! startup.
//!
//! [`snapshot`] is pure: the same probe always yields the same map. It
//! never runs again on its own; hosts that want fresh values build a new
//! probe and pass the snapshot to `set_super_properties`.

use pulse_types::Properties;
use serde_json::Value;
use url::Url;

/// UTM query parameters copied into the snapshot when present.
const UTM_PARAMS: [&str; 5] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
];

/// Raw facts about the host, gathered by whatever embeds the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentProbe {
    /// User-agent string, for browser-like hosts.
    pub user_agent: Option<String>,
    /// BCP 47 locale such as `en-US`.
    pub locale: Option<String>,
    /// Landing URL; its query string carries the UTM parameters.
    pub url: Option<String>,
    /// Referring URL.
    pub referrer: Option<String>,
    /// OS family for hosts without a user agent.
    pub os: Option<String>,
}

impl EnvironmentProbe {
    /// Builds a probe for a native process from the locale environment
    /// variables and the target OS.
    pub fn from_process() -> Self {
        let locale = ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find_map(|raw| normalize_posix_locale(&raw));

        let os = match std::env::consts::OS {
            "linux" => Some("Linux"),
            "macos" => Some("macOS"),
            "windows" => Some("Windows"),
            "ios" => Some("iOS"),
            "android" => Some("Android"),
            "freebsd" | "openbsd" | "netbsd" => Some("BSD"),
            _ => None,
        };

        Self {
            locale,
            os: os.map(str::to_string),
            ..Self::default()
        }
    }
}

/// Turns `en_US.UTF-8` into `en-US`. `C` and `POSIX` carry no locale.
fn normalize_posix_locale(raw: &str) -> Option<String> {
    let base = raw.split(['.', '@']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

/// Derives locale, device class, OS family, referring domain, and UTM
/// parameters from `probe`. Absent facts are omitted.
pub fn snapshot(probe: &EnvironmentProbe) -> Properties {
    let mut props = Properties::new();

    if let Some(locale) = probe.locale.as_deref().filter(|l| !l.is_empty()) {
        props.insert("locale".to_string(), Value::from(locale));
    }

    let ua = probe.user_agent.as_deref().unwrap_or_default();
    let os = os_from_user_agent(ua).or(probe.os.as_deref());
    if let Some(os) = os {
        props.insert("os".to_string(), Value::from(os));
    }
    if let Some(device) = device_class(ua, os) {
        props.insert("device_type".to_string(), Value::from(device));
    }

    if let Some(domain) = probe
        .referrer
        .as_deref()
        .and_then(|r| Url::parse(r).ok())
        .and_then(|u| u.host_str().map(str::to_string))
    {
        props.insert("referring_domain".to_string(), Value::from(domain));
    }

    if let Some(url) = probe.url.as_deref().and_then(|u| Url::parse(u).ok()) {
        for (key, value) in url.query_pairs() {
            if UTM_PARAMS.contains(&key.as_ref()) && !value.is_empty() {
                props.insert(key.into_owned(), Value::from(value.into_owned()));
            }
        }
    }

    props
}

fn os_from_user_agent(ua: &str) -> Option<&'static str> {
    if ua.is_empty() {
        return None;
    }
    let ua = ua.to_ascii_lowercase();
    if ua.contains("windows") {
        Some("Windows")
    } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
        Some("iOS")
    } else if ua.contains("android") {
        Some("Android")
    } else if ua.contains("cros") {
        Some("ChromeOS")
    } else if ua.contains("mac os x") || ua.contains("macintosh") {
        Some("macOS")
    } else if ua.contains("linux") {
        Some("Linux")
    } else {
        None
    }
}

fn device_class(ua: &str, os: Option<&str>) -> Option<&'static str> {
    let lower = ua.to_ascii_lowercase();
    if !lower.is_empty() {
        if lower.contains("ipad") || lower.contains("tablet") {
            return Some("tablet");
        }
        // Android tablets omit "mobile" from the UA.
        if lower.contains("android") && !lower.contains("mobile") {
            return Some("tablet");
        }
        if lower.contains("mobi") || lower.contains("iphone") {
            return Some("mobile");
        }
        return Some("desktop");
    }
    match os? {
        "iOS" | "Android" => Some("mobile"),
        _ => Some("desktop"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const ANDROID_TABLET_UA: &str =
        "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";
    const WINDOWS_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

    #[test]
    fn classifies_user_agents() {
        let cases = [
            (IPHONE_UA, "iOS", "mobile"),
            (ANDROID_TABLET_UA, "Android", "tablet"),
            (WINDOWS_UA, "Windows", "desktop"),
        ];

        for (ua, os, device) in cases {
            let props = snapshot(&EnvironmentProbe {
                user_agent: Some(ua.to_string()),
                ..EnvironmentProbe::default()
            });
            assert_eq!(props["os"], os, "os for {ua}");
            assert_eq!(props["device_type"], device, "device for {ua}");
        }
    }

    #[test]
    fn extracts_utm_parameters_only() {
        let props = snapshot(&EnvironmentProbe {
            url: Some(
                "https://app.example.com/signup?utm_source=newsletter&utm_campaign=spring&ref=x&utm_medium="
                    .to_string(),
            ),
            ..EnvironmentProbe::default()
        });

        assert_eq!(props["utm_source"], "newsletter");
        assert_eq!(props["utm_campaign"], "spring");
        assert!(props.get("ref").is_none());
        assert!(props.get("utm_medium").is_none(), "empty values are skipped");
    }

    #[test]
    fn referrer_becomes_referring_domain() {
        let props = snapshot(&EnvironmentProbe {
            referrer: Some("https://news.example.org/item?id=1".to_string()),
            ..EnvironmentProbe::default()
        });

        assert_eq!(props["referring_domain"], "news.example.org");
    }

    #[test]
    fn native_probe_uses_os_hint() {
        let props = snapshot(&EnvironmentProbe {
            locale: Some("de-DE".to_string()),
            os: Some("Linux".to_string()),
            ..EnvironmentProbe::default()
        });

        assert_eq!(props["locale"], "de-DE");
        assert_eq!(props["os"], "Linux");
        assert_eq!(props["device_type"], "desktop");
    }

    #[test]
    fn empty_probe_yields_empty_snapshot() {
        assert!(snapshot(&EnvironmentProbe::default()).is_empty());
    }

    #[test]
    fn snapshot_is_idempotent() {
        let probe = EnvironmentProbe {
            user_agent: Some(WINDOWS_UA.to_string()),
            url: Some("https://example.com/?utm_source=x".to_string()),
            ..EnvironmentProbe::default()
        };

        assert_eq!(snapshot(&probe), snapshot(&probe));
    }

    #[test]
    fn posix_locales_are_normalized() {
        assert_eq!(normalize_posix_locale("en_US.UTF-8").as_deref(), Some("en-US"));
        assert_eq!(normalize_posix_locale("fr_FR@euro").as_deref(), Some("fr-FR"));
        assert_eq!(normalize_posix_locale("C"), None);
        assert_eq!(normalize_posix_locale("POSIX.UTF-8"), None);
        assert_eq!(normalize_posix_locale(""), None);
    }
}
