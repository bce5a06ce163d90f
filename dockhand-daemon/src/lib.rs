//! dockhand daemon: control socket + webhook in front of the reconciliation
//! controller.

mod dispatch;
mod error;
pub mod http;
pub mod paths;
pub mod protocol;
mod runtime;

pub use dispatch::{DaemonState, PassStats};
pub use error::DaemonError;
pub use http::build_router;
pub use protocol::{
    request_action, request_status, request_stop, request_update, send_request, DaemonRequest,
    DaemonResponse,
};
pub use runtime::{init_tracing, run, serve, start_blocking, HttpListener};
