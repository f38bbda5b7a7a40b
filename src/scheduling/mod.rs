mod compiler;

pub use compiler::{CompiledSchedule, PENDING_NOTIFICATION_CEILING, compile, next_occurrence};
