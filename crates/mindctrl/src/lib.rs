//! # Mindctrl
//!
//! RPC client for the mindctrl browser extension.
//!
//! The extension (the "server") is never reached directly. Both sides talk
//! to a shared MQTT broker: requests go to the server's inbox topic,
//! responses come back on the client's inbox topic, and the server
//! announces whether it is alive on a retained status topic. This crate
//! builds request/response correlation, liveness tracking and call
//! multiplexing on top of that.
//!
//! ```no_run
//! use mindctrl::{ping, SessionBuilder};
//!
//! # async fn run() -> mindctrl::Result<()> {
//! let mut router = SessionBuilder::new("mqtt://localhost:1883", "my-client", "firefox")
//!     .connect()
//!     .await?;
//!
//! ping().execute(&mut router).await?;
//! router.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use mindctrl_proto as proto;

/// Error types for the mindctrl library
pub mod error;

/// Transport options and their normalisation rules
pub mod options;

/// Session establishment and liveness probing
pub mod session;

/// Request/response correlation over one session
pub mod codec;

/// Call multiplexing over a single codec
pub mod router;

/// Typed operations with an explicit lifecycle
pub mod operation;

#[cfg(test)]
mod test_utils;

pub use error::MindctrlError;
pub use options::TransportOptions;
pub use session::{SessionBuilder, SessionState};
pub use codec::{Codec, ResponseHeader};
pub use router::{CallHandle, Router};
pub use operation::{get_browser_info, get_platform_info, ping, Operation, OperationState};

/// Result type alias for mindctrl operations
pub type Result<T> = std::result::Result<T, MindctrlError>;
