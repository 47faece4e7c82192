//! # varia-core: Project document model for Varia
//!
//! The shared document every collaborator edits, and the pure operations
//! that change it.
//!
//! ```text
//! Project
//!   └── ProductLine*
//!         └── DomainEngineering
//!               └── Model*
//!                     ├── Cell*        (wire: "elements")
//!                     └── Connection*  (wire: "relationships")
//! ```
//!
//! ## Modules
//!
//! - [`document`]: serde model of the project tree (camelCase JSON)
//! - [`mutation`]: deterministic, I/O-free edit operations

pub mod document;
pub mod mutation;

pub use document::{
    Cell, Connection, DomainEngineering, Extra, GeometryPatch, Model, ModelHeader,
    ProductLine, ProductLineHeader, Project,
};
pub use mutation::{EntityKind, Mutation, MutationError};
