// Candidate profiles: the data model consumed by the pipeline, a JSON-file
// store behind the `ProfileStore` trait, and the CRUD handlers.

pub mod handlers;
pub mod models;
pub mod store;

pub use store::{JsonFileProfileStore, ProfileStore, StoreError};
