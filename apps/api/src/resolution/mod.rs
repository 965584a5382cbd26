// Role resolution: prompt -> phrases -> KB suggestions -> operator-finalized roles.

pub mod extractor;
pub mod handlers;
pub mod matcher;
pub mod prompts;
pub mod session;
