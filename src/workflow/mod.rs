pub mod scheduler;
pub mod session;

pub use scheduler::{GenerationScheduler, GeneratorPool, SchedulerState, SchedulerTiming};
pub use session::QuizSession;
