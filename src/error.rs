use thiserror::Error;

/// Failures of a reconciliation pass or of a single status query.
#[derive(Debug, Error)]
pub enum Error {
    /// The API server or a pod could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response body did not have the expected JSON shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The endpoints object has no usable address.
    #[error("no endpoint information found: {0}")]
    NoEndpoints(String),

    /// A client could not be built at startup.
    #[error("client setup failed: {0}")]
    Client(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::SerdeError(e) => Error::Decode(e),
            kube::Error::Api(resp) if resp.code == 404 => Error::NoEndpoints(resp.message),
            other => Error::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
