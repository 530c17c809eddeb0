//! Client for the SSO transport: one long-lived TCP connection that
//! multiplexes sequence-numbered RPCs and server pushes.

pub mod crypto;
pub mod error;
pub mod identity;
pub mod service;
pub mod sign;
pub mod transport;

pub use error::{FrameError, LinkError, SsoError};
pub use identity::{AppInfo, SessionHandle, SessionStore};
pub use transport::{
    ConnectionState, PushReceiver, SsoResponse, TransportOptions, TransportSession,
};
