mod connection;
mod route;
mod session;

pub use connection::ProxyConnection;
pub use route::{Route, Target};
pub use session::{SessionState, TunnelSession};
