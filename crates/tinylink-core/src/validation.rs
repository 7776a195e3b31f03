//! Input predicates applied before a URL is accepted for shortening.

use crate::error::ShortenerError;
use url::Url;

const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// Fragments that are never accepted anywhere in a URL, compared
/// case-insensitively against both the raw and the percent-decoded input.
const DISALLOWED_PATTERNS: [&str; 10] = [
    "<script",
    "</script",
    "javascript:",
    "vbscript:",
    "data:",
    "../",
    "..\\",
    " or 1=1",
    "&&",
    "||",
];

/// Checks that `url` is an absolute http(s) URL with a host and none of the
/// disallowed patterns.
pub fn validate_url(url: &str) -> Result<(), ShortenerError> {
    if url.trim().is_empty() {
        return Err(ShortenerError::InvalidUrl(
            "URL cannot be empty".to_string(),
        ));
    }

    let decoded = urlencoding::decode(url)
        .map_err(|e| ShortenerError::InvalidUrl(format!("URL is not valid UTF-8: {e}")))?;

    for candidate in [url, decoded.as_ref()] {
        let lowered = candidate.to_ascii_lowercase();
        if let Some(pattern) = DISALLOWED_PATTERNS.iter().find(|p| lowered.contains(*p)) {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL contains disallowed pattern '{pattern}'"
            )));
        }
    }

    let parsed = Url::parse(url).map_err(|e| ShortenerError::InvalidUrl(e.to_string()))?;

    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(ShortenerError::InvalidUrl(format!(
            "URL scheme must be http or https: {}",
            parsed.scheme()
        )));
    }

    // `Url` normalizes "http:///path" into a host of "path", so look at the raw input too.
    let has_authority = url
        .split_once("://")
        .is_some_and(|(_, rest)| !rest.is_empty() && !rest.starts_with('/'));
    if !has_authority || parsed.host_str().map_or(true, str::is_empty) {
        return Err(ShortenerError::InvalidUrl(format!(
            "URL must include a valid host: {url}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        for url in [
            "http://example.com",
            "https://example.com/path?query=1",
            "https://example.com/some%20path/ok",
            "https://eletronicos.mercadolivre.com.br/seguranca-casa/#menu=categories",
        ] {
            assert!(validate_url(url).is_ok(), "{url} should be accepted");
        }
    }

    #[test]
    fn rejects_other_schemes_and_missing_host() {
        for url in [
            "ftp://example.com",
            "http:///no-domain",
            "vbscript:malicious()",
            "not-a-url",
            "",
        ] {
            let err = validate_url(url).unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidUrl(_)), "{url}");
        }
    }

    #[test]
    fn rejects_disallowed_patterns() {
        for url in [
            "javascript:alert(1)",
            "http://example.com/<script>",
            "http://example.com/</script>",
            "http://example.com/image.png?data:image/png;base64,abcd",
            "http://example.com/../etc/passwd",
            "http://example.com/page?id=1 OR 1=1",
            "http://example.com/run?cmd=whoami&&rm -rf /",
        ] {
            assert!(validate_url(url).is_err(), "{url} should be rejected");
        }
    }

    #[test]
    fn rejects_percent_encoded_patterns() {
        for url in [
            "http://example.com/%3Cscript%3Ealert(1)%3C/script%3E",
            "http://example.com/img?data%3Aimage/png%3Bbase64%2Cabcd",
            "http://example.com/%2E%2E/%2E%2E/etc/passwd",
        ] {
            assert!(validate_url(url).is_err(), "{url} should be rejected");
        }
    }
}
