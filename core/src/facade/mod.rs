//! LE ACL manager facade
//!
//! Bridges a remote test driver to a [`ConnectionManager`](crate::manager::ConnectionManager):
//! requests become manager calls, manager callbacks become ordered event
//! streams.

pub mod error;
pub mod handle;
pub mod registry;
mod relay;
pub mod request_log;
pub mod service;

pub use error::FacadeError;
pub use handle::{to_handle, FAILED_CONNECTION_HANDLE, HANDLE_OFFSET, HANDLE_SPACE};
pub use registry::ConnectionRegistry;
pub use request_log::{Release, RequestKind, RequestLog, RequestLogError, SlotState};
pub use service::{AclDataStream, ConnectionEventStream, FacadeStatus, LeAclFacade};
