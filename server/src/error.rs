use thiserror::Error;

/// Failure modes of one refresh cycle. None are fatal to the process, and a
/// failed cycle leaves the previously published snapshot untouched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no CTFd API token is configured")]
    MissingCredential,

    #[error("request to the {endpoint} endpoint failed: {source}")]
    Network {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("the {endpoint} endpoint rejected the request: {message}")]
    Api {
        endpoint: &'static str,
        message: String,
    },

    #[error("the {endpoint} endpoint returned no data")]
    EmptyResult { endpoint: &'static str },
}
