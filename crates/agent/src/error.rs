use toolq_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The request never produced a response.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error envelope.
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AgentError {
    /// Whether the failure happened before the server could act on the
    /// request.
    pub fn is_transport(&self) -> bool {
        matches!(self, AgentError::Http(_) | AgentError::WebSocket(_))
    }
}
