//! Gateway: HTTP front end that runs route-bound commands.
//!
//! Each configured path accepts POST with optional JSON overrides. Results come back
//! inline, or, when the request names a callback URL, are POSTed there by a detached
//! task after an immediate acknowledgement.

pub mod callback;
mod context;
mod error;
mod protocol;
mod server;

pub use context::{RequestContext, REQUEST_ID_HEADER};
pub use error::GatewayError;
pub use protocol::{CallbackAck, ExecResult};
pub use server::{router, run_gateway, GatewayState};
