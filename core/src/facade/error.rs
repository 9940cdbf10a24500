//! Facade error type

use crate::channel::ChannelError;
use crate::facade::request_log::RequestLogError;
use crate::hci::AddressError;
use crate::rpc::StatusCode;
use thiserror::Error;

/// Errors returned by facade RPCs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FacadeError {
    #[error("Only one outstanding {0} is supported")]
    Outstanding(&'static str),

    #[error("Connection handle 0x{0:03x} is still in use")]
    HandleInUse(u16),

    #[error("Invalid handle: 0x{0:03x}")]
    InvalidHandle(u16),

    #[error("Malformed peer: {0}")]
    MalformedPeer(#[from] AddressError),

    #[error("Stream unavailable: {0}")]
    StreamBusy(#[from] ChannelError),

    #[error("Send to handle 0x{0:03x} aborted: connection closed")]
    SendAborted(u16),

    #[error("Facade is shut down")]
    ShutDown,
}

impl FacadeError {
    /// RPC status reported to the caller
    pub fn status(&self) -> StatusCode {
        match self {
            FacadeError::Outstanding(_)
            | FacadeError::HandleInUse(_)
            | FacadeError::StreamBusy(_) => StatusCode::ResourceExhausted,
            FacadeError::InvalidHandle(_) => StatusCode::InvalidArgument,
            FacadeError::MalformedPeer(_) => StatusCode::Internal,
            FacadeError::SendAborted(_) => StatusCode::Aborted,
            FacadeError::ShutDown => StatusCode::Unavailable,
        }
    }
}

impl From<RequestLogError> for FacadeError {
    fn from(err: RequestLogError) -> Self {
        match err {
            RequestLogError::Outstanding(what) => FacadeError::Outstanding(what),
            RequestLogError::HandleInUse(handle) => FacadeError::HandleInUse(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            FacadeError::Outstanding("request").status(),
            StatusCode::ResourceExhausted
        );
        assert_eq!(
            FacadeError::InvalidHandle(0x10).status(),
            StatusCode::InvalidArgument
        );
        assert_eq!(
            FacadeError::MalformedPeer(AddressError::UnknownType(9)).status(),
            StatusCode::Internal
        );
        assert_eq!(FacadeError::SendAborted(0x10).status(), StatusCode::Aborted);
        assert_eq!(FacadeError::ShutDown.status(), StatusCode::Unavailable);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            FacadeError::Outstanding("request").to_string(),
            "Only one outstanding request is supported"
        );
        assert_eq!(
            FacadeError::InvalidHandle(0x10).to_string(),
            "Invalid handle: 0x010"
        );
    }

    #[test]
    fn test_from_request_log_error() {
        let err: FacadeError = RequestLogError::HandleInUse(0x20).into();
        assert_eq!(err, FacadeError::HandleInUse(0x20));
    }
}
