use thiserror::Error;

#[derive(Debug, Error)]
pub enum SalvageError {
    /// The bundle yielded no manifest candidates at all. Returned instead of
    /// an empty result so callers can tell "nothing embedded here" from
    /// "everything extracted fine".
    #[error("no manifest candidates found in bundle text")]
    NoCandidates,
    /// Manifest text failed the structural parse (region before any page
    /// header, unparseable scale value).
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, SalvageError>;
