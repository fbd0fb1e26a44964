//! Relay registry.
//!
//! Relays are a small closed set of shapes, so classification is a tagged
//! variant plus a capability record rather than a trait hierarchy: classic
//! bundle-RPC endpoints, matchmaker JSON-RPC variants, and vendor cloud APIs.

pub mod transport;

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    ClassicBundle,
    Matchmaker,
    Cloud,
}

/// What a relay of a given kind can do and how it wants requests shaped.
#[derive(Debug, Clone, Copy)]
pub struct RelayCaps {
    pub supports_simulate: bool,
    pub needs_header_signature: bool,
    /// Cloud APIs want raw txs without the `0x` prefix.
    pub strips_0x: bool,
}

impl RelayKind {
    pub fn caps(&self) -> RelayCaps {
        match self {
            RelayKind::ClassicBundle => RelayCaps {
                supports_simulate: true,
                needs_header_signature: true,
                strips_0x: false,
            },
            RelayKind::Matchmaker => RelayCaps {
                supports_simulate: true,
                needs_header_signature: true,
                strips_0x: false,
            },
            RelayKind::Cloud => RelayCaps {
                supports_simulate: true,
                needs_header_signature: false,
                strips_0x: true,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayDescriptor {
    pub url: String,
    pub kind: RelayKind,
    /// Static headers sent with every request to this relay.
    pub headers: HashMap<String, String>,
}

impl RelayDescriptor {
    pub fn caps(&self) -> RelayCaps {
        self.kind.caps()
    }

    fn host_contains(&self, needle: &str) -> bool {
        self.url.to_ascii_lowercase().contains(needle)
    }

    pub fn is_flashbots(&self) -> bool {
        self.host_contains("flashbots.net")
    }

    pub fn is_beaver(&self) -> bool {
        self.host_contains("beaverbuild.org")
    }

    /// Hosts that require the body-signature header on private sends.
    pub fn wants_private_send_signature(&self) -> bool {
        self.host_contains("flashbots")
            || self.host_contains("payload")
            || self.host_contains("buildernet")
    }
}

/// Optional per-attempt payload extensions. Any set knob flips the transport
/// into strategy mode (extra fields + method-name fallbacks).
#[derive(Debug, Clone, Default)]
pub struct StrategyKnobs {
    pub min_timestamp: u64,
    pub max_timestamp: u64,
    pub replacement_uuid: Option<String>,
    /// Flashbots-only builder allowlist.
    pub builders: Vec<String>,
    pub beaver_allow_buildernet_refunds: Option<bool>,
    pub beaver_refund_recipient: Option<String>,
}

impl StrategyKnobs {
    pub fn enabled(&self) -> bool {
        self.min_timestamp > 0
            || self.max_timestamp > 0
            || self.replacement_uuid.is_some()
            || !self.builders.is_empty()
            || self.beaver_allow_buildernet_refunds.is_some()
            || self
                .beaver_refund_recipient
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
    }
}

/// Classify raw relay URLs. Explicit prefixes win (`mm:`, `mev:`,
/// `classic:`); cloud hosts are detected by name; untagged hosts default to
/// classic unless they look like matchmakers.
pub fn classify_relays(
    raw_urls: &[String],
    extra_headers: &HashMap<String, HashMap<String, String>>,
    cloud_auth: Option<&(String, String)>,
) -> Vec<RelayDescriptor> {
    let mut out = Vec::with_capacity(raw_urls.len());
    for raw in raw_urls {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let low = trimmed.to_ascii_lowercase();

        let (url, kind) = if let Some(rest) = trimmed.strip_prefix("mm:") {
            (rest.to_string(), RelayKind::Matchmaker)
        } else if low.contains("blxrbdn.com") || low.contains("bloxroute") {
            (trimmed.to_string(), RelayKind::Cloud)
        } else if let Some(rest) = trimmed.strip_prefix("mev:") {
            (rest.to_string(), RelayKind::Matchmaker)
        } else if let Some(rest) = trimmed.strip_prefix("classic:") {
            (rest.to_string(), RelayKind::ClassicBundle)
        } else if low.contains("mev") || low.contains("matchmaker") {
            (trimmed.to_string(), RelayKind::Matchmaker)
        } else {
            (trimmed.to_string(), RelayKind::ClassicBundle)
        };

        let mut headers = extra_headers
            .get(&url)
            .or_else(|| extra_headers.get(trimmed))
            .cloned()
            .unwrap_or_default();
        if kind == RelayKind::Cloud {
            if let Some((name, value)) = cloud_auth {
                headers
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        out.push(RelayDescriptor { url, kind, headers });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(urls: &[&str]) -> Vec<RelayDescriptor> {
        let urls: Vec<String> = urls.iter().map(|s| s.to_string()).collect();
        classify_relays(&urls, &HashMap::new(), None)
    }

    #[test]
    fn test_prefix_classification() {
        let relays = classify(&[
            "mm:https://mm.example",
            "mev:https://relay.example",
            "classic:https://builder.example",
        ]);
        assert_eq!(relays[0].kind, RelayKind::Matchmaker);
        assert_eq!(relays[0].url, "https://mm.example");
        assert_eq!(relays[1].kind, RelayKind::Matchmaker);
        assert_eq!(relays[1].url, "https://relay.example");
        assert_eq!(relays[2].kind, RelayKind::ClassicBundle);
        assert_eq!(relays[2].url, "https://builder.example");
    }

    #[test]
    fn test_host_hint_classification() {
        let relays = classify(&[
            "https://relay.flashbots.net",
            "https://mev.api.blxrbdn.com",
            "https://rpc.beaverbuild.org",
            "https://matchmaker.example",
        ]);
        assert_eq!(relays[0].kind, RelayKind::ClassicBundle);
        // bloxroute wins over the "mev" substring heuristic
        assert_eq!(relays[1].kind, RelayKind::Cloud);
        assert_eq!(relays[2].kind, RelayKind::ClassicBundle);
        assert_eq!(relays[3].kind, RelayKind::Matchmaker);
    }

    #[test]
    fn test_blank_entries_dropped() {
        assert!(classify(&["", "  "]).is_empty());
    }

    #[test]
    fn test_cloud_auth_header_attached() {
        let urls = vec!["https://api.blxrbdn.com".to_string()];
        let auth = ("Authorization".to_string(), "secret-token".to_string());
        let relays = classify_relays(&urls, &HashMap::new(), Some(&auth));
        assert_eq!(relays[0].kind, RelayKind::Cloud);
        assert_eq!(
            relays[0].headers.get("Authorization").map(String::as_str),
            Some("secret-token")
        );
    }

    #[test]
    fn test_extra_headers_override() {
        let urls = vec!["mev:https://relay.example".to_string()];
        let mut extra = HashMap::new();
        extra.insert(
            "https://relay.example".to_string(),
            HashMap::from([("X-Custom".to_string(), "1".to_string())]),
        );
        let relays = classify_relays(&urls, &extra, None);
        assert_eq!(relays[0].headers.get("X-Custom").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_caps_by_kind() {
        assert!(RelayKind::ClassicBundle.caps().needs_header_signature);
        assert!(!RelayKind::Cloud.caps().needs_header_signature);
        assert!(RelayKind::Cloud.caps().strips_0x);
        assert!(!RelayKind::Matchmaker.caps().strips_0x);
    }

    #[test]
    fn test_strategy_knobs_enabled() {
        assert!(!StrategyKnobs::default().enabled());
        assert!(StrategyKnobs {
            min_timestamp: 10,
            ..Default::default()
        }
        .enabled());
        assert!(StrategyKnobs {
            builders: vec!["beaverbuild".to_string()],
            ..Default::default()
        }
        .enabled());
        assert!(StrategyKnobs {
            beaver_allow_buildernet_refunds: Some(false),
            ..Default::default()
        }
        .enabled());
        // whitespace-only refund recipient does not arm strategy mode
        assert!(!StrategyKnobs {
            beaver_refund_recipient: Some("  ".to_string()),
            ..Default::default()
        }
        .enabled());
    }

    #[test]
    fn test_private_send_signature_hosts() {
        let relays = classify(&[
            "https://relay.flashbots.net",
            "https://rpc.payload.de",
            "https://direct.buildernet.org",
            "https://rpc.beaverbuild.org",
        ]);
        assert!(relays[0].wants_private_send_signature());
        assert!(relays[1].wants_private_send_signature());
        assert!(relays[2].wants_private_send_signature());
        assert!(!relays[3].wants_private_send_signature());
    }
}
