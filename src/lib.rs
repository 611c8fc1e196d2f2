pub mod config;
pub mod connectors;
pub mod crypto;
pub mod db;
pub mod error;
pub mod server;
pub mod sync;

pub use connectors::{Connector, ConnectorRegistry, CredentialBundle, FileSummary, Provider, RefreshOutcome};
pub use crypto::CredentialCodec;
pub use db::{Account, AccountStore};
pub use error::HubError;
pub use sync::{SyncReport, SyncService};
