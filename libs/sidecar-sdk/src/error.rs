use sidecar_transport::TransportError;

/// Errors surfaced by the SDK's client adapters.
#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SidecarError {
    /// gRPC status code of the underlying RPC failure, if any.
    #[must_use]
    pub fn grpc_code(&self) -> Option<tonic::Code> {
        match self {
            Self::Transport(e) => e.grpc_code(),
            Self::InvalidArgument(_) => None,
        }
    }
}
