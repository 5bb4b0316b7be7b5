pub mod identity;
pub mod pipeline;

pub use identity::{IdentityError, IdentityProvider, IdentityResult, Principal};
pub use pipeline::StagePipeline;
