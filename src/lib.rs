#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod batch;
pub mod client;
pub mod config;
pub mod connection;
pub mod encoding;
pub mod error;
pub mod filter;
pub mod logging;
pub mod model;
pub mod ops;
pub mod template;
pub mod utils;
pub mod walk;

pub use batch::BatchEngine;
pub use client::{ConnectorFactory, ObjectType, ProtocolConnectors, StorageConnector};
pub use connection::{ConnectionDescriptor, ConnectionType, ConnectorPool, ServerParams};
pub use encoding::FileEncoding;
pub use error::{RemoteFsError, Result};
pub use filter::FilterKind;
pub use ops::FileOps;
pub use walk::WalkRequest;
