//! Database repositories
//!
//! Repositories encapsulate data access logic and provide a clean API for
//! business logic to interact with the database.

pub mod diagram;
pub mod user;

pub use diagram::{DiagramRepository, DiagramRepositoryError};
pub use user::{UserRepository, UserRepositoryError};
