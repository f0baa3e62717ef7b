use thiserror::Error;

/// Failures of a single gateway request/response cycle. Everything that is
/// not an explicit rate-limit or billing signal collapses into `Transport`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("the gateway rejected the request with a rate limit")]
    RateLimited,
    #[error("the gateway requires additional credits")]
    PaymentRequired,
    #[error("gateway transport failure: {0}")]
    Transport(String),
}

/// Prompt rejections raised before any session state is touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("message text must not be empty")]
    EmptyPrompt,
    #[error("a reply is already in progress")]
    Busy,
}
