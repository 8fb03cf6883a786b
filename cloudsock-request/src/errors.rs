use std::fmt;

/// Errors surfaced while parsing or dispatching one sub-request.
#[derive(Debug)]
pub enum RequestError {
    /// The request text did not parse under either accepted syntax.
    Syntax,
    /// Function-call syntax was used against a handler with
    /// `allow_python_syntax` disabled.
    Permission(String),
    /// No handler is registered under this name.
    UnknownRequest(String),
    /// A handler raised an ordinary (non-[`RequestError::ErrorMessage`])
    /// error.
    Handler(String),
    /// A handler raised its distinguished user-visible error; `0` becomes
    /// the response verbatim.
    ErrorMessage(String),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "the command syntax was wrong"),
            Self::Permission(name) => write!(f, "python syntax is not allowed for {name}"),
            Self::UnknownRequest(name) => write!(f, "no handler registered for {name}"),
            Self::Handler(e) => write!(f, "something went wrong: {e}"),
            Self::ErrorMessage(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    /// The literal text sent back to the client for this error, matching
    /// the three fixed response phrases plus the verbatim `ErrorMessage`.
    pub fn response_text(&self) -> String {
        match self {
            Self::Syntax | Self::Permission(_) | Self::UnknownRequest(_) => "The command syntax was wrong.".to_string(),
            Self::Handler(_) => "Something went wrong.".to_string(),
            Self::ErrorMessage(msg) => msg.clone(),
        }
    }
}
