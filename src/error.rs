use std::sync::Arc;

/// Result type used throughout the SDK.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// SDK-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the GrowthBook SDK.
///
/// Errors only ever surface from configuration and from the feature repository. Feature and
/// experiment evaluation never fails: evaluation problems are encoded in
/// [`FeatureResult::source`](crate::FeatureResult) and
/// [`ExperimentResult::in_experiment`](crate::ExperimentResult) instead.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Invalid client configuration (e.g., an empty client key).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The configured API host could not be parsed into a URL.
    #[error("invalid api_host configuration")]
    InvalidApiHost(#[source] url::ParseError),

    /// The feature endpoint responded with neither `features` nor `encryptedFeatures`.
    #[error("feature payload has neither features nor encryptedFeatures")]
    UnexpectedPayload,

    /// Failed to decrypt an encrypted feature payload.
    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    /// The first fetch did not settle within the initialization timeout. The fetch keeps running
    /// in the background and the repository may still become ready later.
    #[error("initialization did not complete within the timeout")]
    InitializationTimeout,

    /// The repository was shut down while waiting for initialization.
    #[error("repository is shutting down")]
    ShutdownInProgress,

    /// Indicates that the background refresh thread panicked. This should normally never happen.
    #[error("refresh thread panicked")]
    RefreshThreadPanicked,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

/// Reasons an encrypted feature payload could not be decrypted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecryptionError {
    /// The payload is encrypted but no decryption key is configured.
    #[error("payload is encrypted but no decryption_key is configured")]
    MissingKey,

    /// The payload is missing the `.` separating the initialization vector from the ciphertext.
    #[error("encrypted payload is missing the iv separator")]
    MalformedPayload,

    /// The key, iv, or ciphertext is not valid base64.
    #[error("invalid base64 in decryption key or payload")]
    InvalidBase64,

    /// The decoded key is not a valid AES-128 or AES-256 key.
    #[error("decryption key must be 16 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The decoded initialization vector is not a single AES block.
    #[error("initialization vector must be 16 bytes")]
    InvalidIv,

    /// The ciphertext did not decrypt to validly padded data (usually a wrong key).
    #[error("ciphertext failed to decrypt")]
    InvalidCiphertext,

    /// The decrypted plaintext is not valid UTF-8.
    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,

    /// The decrypted plaintext is not a JSON feature map.
    #[error("decrypted payload is not a JSON feature map")]
    InvalidJson,
}
