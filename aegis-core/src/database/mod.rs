//! Persistence: repository ports and their adapters.

pub mod infrastructure;
pub mod ports;

pub use infrastructure::memory::InMemoryAuthStore;
#[cfg(feature = "database")]
pub use infrastructure::postgres::PostgresDatabase;
