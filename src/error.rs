use thiserror::Error;

#[derive(Debug, Error)]
pub enum VitaError {
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),
    #[error("provider rejected request ({status}): {body}")]
    ProviderRejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("no endpoint accepted the request; last failure ({status}): {body}")]
    EndpointExhausted {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("no request candidates available")]
    NoCandidates,
    #[error("all candidate models failed: {0}")]
    AllModelsFailed(Box<VitaError>),
    #[error("status poll failed: {0}")]
    Polling(Box<VitaError>),
    #[error("{0} is not configured in the environment")]
    MissingApiKey(&'static str),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VitaError>;
