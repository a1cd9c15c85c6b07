use thiserror::Error;

pub type Result<T> = std::result::Result<T, WebDriverError>;

#[derive(Debug, Error)]
pub enum WebDriverError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("WebDriver error `{error}` (status {status}): {message}")]
    Api {
        status: u16,
        /// W3C error code, e.g. "stale element reference".
        error: String,
        message: String,
    },

    #[error("Unexpected WebDriver response: {0}")]
    Protocol(String),
}

impl WebDriverError {
    /// The referenced element is no longer attached to the document.
    pub fn is_stale(&self) -> bool {
        matches!(self, WebDriverError::Api { error, .. } if error == "stale element reference")
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, WebDriverError::Api { error, .. }
            if error == "timeout" || error == "script timeout")
    }

    pub fn is_no_such_element(&self) -> bool {
        matches!(self, WebDriverError::Api { error, .. } if error == "no such element")
    }

    /// The whole automation session is gone: the browser crashed, the window
    /// was closed, or the driver dropped the connection.
    pub fn is_session_gone(&self) -> bool {
        match self {
            WebDriverError::Network(_) => true,
            WebDriverError::Api { error, .. } => {
                error == "invalid session id"
                    || error == "no such window"
                    || error == "unknown error"
            }
            WebDriverError::Protocol(_) => false,
        }
    }
}

impl From<reqwest::Error> for WebDriverError {
    fn from(err: reqwest::Error) -> Self {
        WebDriverError::Network(err.to_string())
    }
}
