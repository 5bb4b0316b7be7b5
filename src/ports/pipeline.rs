use std::sync::Arc;

use crate::core::middleware::{Middleware, Surface};

/// Port for a surface's request pipeline: the "register a pipeline stage"
/// primitive the orchestrator attaches middleware through.
///
/// Stages are registered in execution order; the first registered stage sees
/// the request first.
pub trait StagePipeline {
    /// The surface this pipeline serves.
    fn surface(&self) -> Surface;

    /// Append a stage to the pipeline.
    fn register_stage(&mut self, middleware: Arc<dyn Middleware>);
}
