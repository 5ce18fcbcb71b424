//! Postgres wire protocol (frontend/backend v3), limited to what a
//! connection needs: startup, authentication, simple and extended queries,
//! and termination.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use decode::decode_message;
pub use encode::encode_message;
pub use message::{AuthenticationMessage, BackendMessage, ErrorFields, FrontendMessage};
