use std::future::Future;

use tracing::warn;

use crate::{Result, VitaError};

/// One vision-model variant: a model name plus the API version tag its route
/// lives under. Variants get deprecated, renamed, or quota-limited
/// independently, so callers hold an ordered preference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVariant {
    pub name: String,
    pub api_version: String,
}

impl ModelVariant {
    pub fn new(name: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_version: api_version.into(),
        }
    }

    /// Default preference order for vision-capable models.
    pub fn default_order() -> Vec<Self> {
        vec![
            Self::new("gemini-1.5-pro", "v1beta"),
            Self::new("gemini-pro-vision", "v1beta"),
            Self::new("gemini-2.0-flash-exp", "v1beta"),
            Self::new("gemini-1.5-flash", "v1beta"),
            Self::new("gemini-pro", "v1"),
        ]
    }
}

/// Calls `call` for each variant strictly in order and returns the first
/// success. Every failure class (connect, non-2xx, parse) moves on to the
/// next variant; exhaustion surfaces the last failure.
pub(crate) async fn first_success<T, F, Fut>(variants: &[ModelVariant], mut call: F) -> Result<T>
where
    F: FnMut(ModelVariant) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<VitaError> = None;

    for variant in variants {
        match call(variant.clone()).await {
            Ok(reply) => return Ok(reply),
            Err(err) => {
                warn!(model = %variant.name, error = %err, "model call failed, trying next variant");
                last_error = Some(err);
            }
        }
    }

    Err(match last_error {
        Some(err) => VitaError::AllModelsFailed(Box::new(err)),
        None => VitaError::NoCandidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_at_first_success() {
        let variants = ModelVariant::default_order();
        let mut calls = 0u32;
        let result = first_success(&variants, |variant| {
            calls += 1;
            async move {
                if variant.name == "gemini-2.0-flash-exp" {
                    Ok(variant.name)
                } else {
                    Err(VitaError::InvalidResponse("no text".to_string()))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "gemini-2.0-flash-exp");
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_failure() {
        let variants = vec![
            ModelVariant::new("a", "v1"),
            ModelVariant::new("b", "v1"),
        ];
        let err = first_success::<(), _, _>(&variants, |variant| async move {
            Err(VitaError::InvalidResponse(variant.name))
        })
        .await
        .unwrap_err();
        match err {
            VitaError::AllModelsFailed(inner) => {
                assert!(matches!(*inner, VitaError::InvalidResponse(ref name) if name == "b"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_order_is_no_candidates() {
        let err = first_success::<(), _, _>(&[], |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, VitaError::NoCandidates));
    }
}
