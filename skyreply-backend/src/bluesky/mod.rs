//! Bluesky (AT Protocol) feed service access: wire types, the XRPC client,
//! and the session cache that gates every call.

pub mod client;
pub mod session;
pub mod types;

pub use client::{Credentials, FeedError, FeedService, Session, XrpcClient};
pub use session::SessionManager;
