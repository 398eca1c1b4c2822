use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::utils::http::response_text_truncated;
use crate::{Result, VitaError};

const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Ordered, de-duplicated base URLs for one request: caller-preferred first,
/// then the configured base, then the built-in fallback list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCandidates {
    bases: Vec<String>,
}

impl EndpointCandidates {
    pub fn build(preferred: Option<&str>, configured: Option<&str>, fallback: &[String]) -> Self {
        let mut bases = Vec::<String>::new();
        let mut push = |raw: &str| {
            if let Some(base) = sanitize_base(raw) {
                if !bases.contains(&base) {
                    bases.push(base);
                }
            }
        };
        if let Some(preferred) = preferred {
            push(preferred);
        }
        if let Some(configured) = configured {
            push(configured);
        }
        for base in fallback {
            push(base);
        }
        Self { bases }
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.bases.iter().map(String::as_str)
    }
}

fn sanitize_base(raw: &str) -> Option<String> {
    let base = raw.trim().trim_end_matches('/');
    (!base.is_empty()).then(|| base.to_string())
}

/// Tries each candidate base in order until one accepts the request.
///
/// The request is rebuilt per attempt so consumed bodies (multipart forms)
/// stay fresh. A 404 means the route does not exist on that base and the next
/// candidate is tried; any other non-success status aborts the whole sequence,
/// since it would recur identically on every base (auth, quota, bad payload).
pub(crate) async fn attempt<F>(
    candidates: &EndpointCandidates,
    path: &str,
    mut build_request: F,
) -> Result<(reqwest::Response, String)>
where
    F: FnMut(&str) -> Result<reqwest::RequestBuilder>,
{
    if candidates.is_empty() {
        return Err(VitaError::NoCandidates);
    }

    let mut last_not_found: Option<(StatusCode, String)> = None;

    for base in candidates.iter() {
        let response = build_request(base)?.send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(base, path, "endpoint accepted request");
            return Ok((response, base.to_string()));
        }

        let body = response_text_truncated(response, MAX_ERROR_BODY_BYTES).await;

        if status != StatusCode::NOT_FOUND {
            return Err(VitaError::ProviderRejected { status, body });
        }

        warn!(base, path, "endpoint returned 404, trying next candidate");
        last_not_found = Some((status, body));
    }

    let (status, body) = last_not_found.unwrap_or((StatusCode::NOT_FOUND, String::new()));
    Err(VitaError::EndpointExhausted { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_base_comes_first() {
        let fallback = vec!["https://api.example.com/v1".to_string()];
        let candidates = EndpointCandidates::build(
            Some("https://shard-b.example.com/v1"),
            Some("https://configured.example.com/v1"),
            &fallback,
        );
        assert_eq!(
            candidates.iter().collect::<Vec<_>>(),
            vec![
                "https://shard-b.example.com/v1",
                "https://configured.example.com/v1",
                "https://api.example.com/v1",
            ]
        );
    }

    #[test]
    fn duplicates_removed_first_occurrence_wins() {
        let fallback = vec![
            "https://api.example.com/v1".to_string(),
            "https://api.example.com/v2".to_string(),
        ];
        let candidates = EndpointCandidates::build(
            Some("https://api.example.com/v1/"),
            None,
            &fallback,
        );
        assert_eq!(
            candidates.iter().collect::<Vec<_>>(),
            vec!["https://api.example.com/v1", "https://api.example.com/v2"]
        );
    }

    #[test]
    fn trailing_slashes_and_blanks_dropped() {
        let fallback = vec!["  ".to_string(), "https://api.example.com/v2///".to_string()];
        let candidates = EndpointCandidates::build(None, Some(""), &fallback);
        assert_eq!(
            candidates.iter().collect::<Vec<_>>(),
            vec!["https://api.example.com/v2"]
        );
    }

    #[test]
    fn empty_set_is_empty() {
        let candidates = EndpointCandidates::build(None, None, &[]);
        assert!(candidates.is_empty());
    }
}
