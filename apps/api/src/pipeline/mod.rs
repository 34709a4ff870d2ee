// Letter pipeline: Classifier → (Research ∥ Experience) → Assembly → Render.
// Every external call goes through a port trait in `ports` so each stage can be
// driven by fakes in tests. The orchestrator owns all run-scoped state.

pub mod artifacts;
pub mod assembly;
pub mod classifier;
pub mod errors;
pub mod experience;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod ports;
pub mod prompts;
pub mod render;
pub mod research;
pub mod stage;
pub mod text_bounds;
pub mod writers;

#[cfg(test)]
pub mod test_support;

pub use orchestrator::{Collaborators, Orchestrator, PipelineConfig};
