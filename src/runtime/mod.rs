pub mod side_effects;

pub use side_effects::{
    CounterSnapshot, SideEffectHandler, SideEffectJob, SideEffectQueue, SideEffectQueueConfig,
    Submission,
};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
