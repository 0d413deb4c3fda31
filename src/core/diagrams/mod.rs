//! Diagrams module
//!
//! REST endpoints over the diagram store: save (create-or-update), list,
//! open and delete, all scoped to the authenticated owner.

pub mod api;

pub use api::{DiagramApiState, diagram_api_router};
