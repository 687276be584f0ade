//! URL canonicalization for cache keys and candidate lists.

use resfetch_core::Error;
use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for Error {
    fn from(err: UrlError) -> Self {
        match err {
            UrlError::Empty => Error::Configuration("url is required".into()),
            other => Error::InvalidUrl(other.to_string()),
        }
    }
}

/// Canonicalize a URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
///
/// Two spellings of the same resource therefore share one cache entry.
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Canonicalize the primary URL followed by its alternates, preserving order.
///
/// Duplicates are kept; each entry becomes its own racing candidate.
pub fn candidate_list<S: AsRef<str>>(primary: &str, alternates: &[S]) -> Result<Vec<Url>, Error> {
    let mut candidates = Vec::with_capacity(1 + alternates.len());
    candidates.push(canonicalize(primary)?);
    for alternate in alternates {
        let alternate = alternate.as_ref();
        let url = canonicalize(alternate).map_err(|e| match e {
            UrlError::Empty => Error::Configuration("alternate URLs must not be empty".into()),
            other => other.into(),
        })?;
        candidates.push(url);
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("a.example/x").unwrap();
        assert_eq!(url.as_str(), "https://a.example/x");
    }

    #[test]
    fn test_canonicalize_lowercase_host_keeps_path_case() {
        let url = canonicalize("https://A.Example/Data.JSON").unwrap();
        assert_eq!(url.as_str(), "https://a.example/Data.JSON");
    }

    #[test]
    fn test_canonicalize_remove_fragment_keep_query() {
        let url = canonicalize("  https://a.example/x?b=2&a=1#top  ").unwrap();
        assert_eq!(url.as_str(), "https://a.example/x?b=2&a=1");
    }

    #[test]
    fn test_canonicalize_http_allowed() {
        assert_eq!(canonicalize("http://a.example/x").unwrap().scheme(), "http");
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("ftp://a.example/x");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_empty_maps_to_configuration_error() {
        let err: Error = UrlError::Empty.into();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_candidate_list_order_and_duplicates() {
        let list = candidate_list("https://a.example/x", &["https://b.example/x", "https://a.example/x"]).unwrap();
        let list: Vec<&str> = list.iter().map(Url::as_str).collect();
        assert_eq!(list, vec!["https://a.example/x", "https://b.example/x", "https://a.example/x"]);
    }

    #[test]
    fn test_candidate_list_rejects_bad_alternate() {
        let result = candidate_list("https://a.example/x", &["file:///etc/passwd"]);
        assert!(matches!(result, Err(Error::InvalidUrl(_))));

        let result = candidate_list("https://a.example/x", &[""]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_candidate_list_missing_primary() {
        let result = candidate_list::<&str>("", &[]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
