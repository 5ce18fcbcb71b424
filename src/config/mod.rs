//! Connection configuration
//!
//! This module handles:
//! * Endpoint descriptors and connection string parsing
//! * Login credentials
//! * Credential providers (YAML files, in-memory)

mod credentials;
mod endpoint;
mod provider;

pub use credentials::Credentials;
pub(crate) use endpoint::construct_socket_path;
pub use endpoint::{ConnectionInfo, EndpointDescriptor, Target, DEFAULT_PORT};
pub use provider::{
    CredentialProvider, DatabaseInfo, StaticCredentialProvider, YamlCredentialProvider,
    DEFAULT_DATABASE_FILE, DEFAULT_ENVIRONMENT_FILE,
};
