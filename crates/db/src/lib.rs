pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{demo_catalog, seed_demo_inquiry};
pub use repositories::{RepositoryError, SqlActivityLog, SqlOfferStore};
