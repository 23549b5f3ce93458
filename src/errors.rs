use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("no control matching {0}")]
    ControlNotFound(String),

    #[error("ambiguous match for {0}")]
    Ambiguity(String),

    #[error("index {index} out of range for {description}: only {found} match(es)")]
    IndexOutOfRange {
        description: String,
        index: usize,
        found: usize,
    },

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("item count error: {0}")]
    ItemCount(String),

    #[error("control '{0}' is readonly")]
    ReadOnly(String),

    #[error("control '{0}' is disabled")]
    Disabled(String),

    #[error("disabled item with value {0:?}")]
    ItemDisabled(String),

    #[error("this handle has expired: the browser has navigated since it was obtained")]
    Expired,

    #[error("browser state error: {0}")]
    BrowserState(String),

    #[error("link not found: {0}")]
    LinkNotFound(String),

    #[error("HTTP Error {status}: {reason} ({url})")]
    Http {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("host not allowed: {0}")]
    HostNotAllowed(String),

    #[error("request disallowed by robots.txt: {0}")]
    RobotExclusion(String),

    #[error("redirect chain exceeded {0} hops")]
    RedirectLimit(usize),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("cookie error: {0}")]
    Cookie(String),

    #[error("cookie already expired: {0}")]
    AlreadyExpired(String),

    #[error("no cookie named {0:?} for this url")]
    CookieNotFound(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error(transparent)]
    Application(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

impl BrowserError {
    /// Whether this error is one of the locator failures (nothing found,
    /// ambiguous, or index out of range).
    pub fn is_lookup_error(&self) -> bool {
        matches!(
            self,
            BrowserError::ControlNotFound(_)
                | BrowserError::Ambiguity(_)
                | BrowserError::IndexOutOfRange { .. }
                | BrowserError::LinkNotFound(_)
        )
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for BrowserError {
    fn from(err: reqwest::Error) -> Self {
        BrowserError::Transport(err.to_string())
    }
}
