pub mod schema;

pub use schema::{AuthenticatorConfig, Config, StoreConfig};
