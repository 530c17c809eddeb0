pub mod binary;
pub mod codec;
pub mod compress;
pub mod pending;
pub mod proto;
pub mod push;
pub mod sequence;
mod session;
mod state;

pub use codec::{AuthFlag, SsoFrame, SsoResponse};
pub use push::{PushReceiver, PushSink};
pub use session::{DEFAULT_HOST, DEFAULT_PORT, TransportOptions, TransportSession};
pub use state::ConnectionState;
