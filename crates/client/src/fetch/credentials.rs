//! Per-candidate credentials policy.
//!
//! Cookies are sent only to hosts on an explicit allowlist. A URL is trusted
//! when its host equals an allowlisted host or is a subdomain of one; every
//! other candidate is fetched anonymously.

use url::Url;

/// Whether a request may carry cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsPolicy {
    Include,
    #[default]
    Omit,
}

/// Allowlist of hosts that receive credentials.
#[derive(Debug, Clone, Default)]
pub struct TrustedOrigins {
    hosts: Vec<String>,
}

impl TrustedOrigins {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts }
    }

    pub fn is_trusted(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        self.hosts.iter().any(|trusted| {
            host == trusted
                || host
                    .strip_suffix(trusted.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    pub fn policy_for(&self, url: &Url) -> CredentialsPolicy {
        if self.is_trusted(url) { CredentialsPolicy::Include } else { CredentialsPolicy::Omit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_exact_host_is_trusted() {
        let origins = TrustedOrigins::new(["cdn.example"]);
        assert_eq!(origins.policy_for(&url("https://cdn.example/x")), CredentialsPolicy::Include);
    }

    #[test]
    fn test_subdomain_is_trusted() {
        let origins = TrustedOrigins::new(["cdn.example"]);
        assert!(origins.is_trusted(&url("https://eu.cdn.example/x")));
    }

    #[test]
    fn test_suffix_without_dot_is_not_trusted() {
        let origins = TrustedOrigins::new(["cdn.example"]);
        assert!(!origins.is_trusted(&url("https://evilcdn.example/x")));
    }

    #[test]
    fn test_path_mentioning_host_is_not_trusted() {
        let origins = TrustedOrigins::new(["cdn.example"]);
        assert_eq!(origins.policy_for(&url("https://a.example/cdn.example")), CredentialsPolicy::Omit);
    }

    #[test]
    fn test_empty_allowlist_trusts_nothing() {
        let origins = TrustedOrigins::default();
        assert!(!origins.is_trusted(&url("https://a.example/x")));
    }

    #[test]
    fn test_allowlist_is_normalized() {
        let origins = TrustedOrigins::new([" .CDN.Example ", ""]);
        assert!(origins.is_trusted(&url("https://cdn.example/x")));
    }
}
