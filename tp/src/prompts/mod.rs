//! Prompt templates for the decision-action loop

mod embedded;
mod loader;

pub use embedded::{DECISION_GUIDANCE, STEP_PROMPT};
pub use loader::PromptSet;
