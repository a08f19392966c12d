//! The streaming pipeline core: queues, stages, coordination, assembly.

pub mod coordination;
pub mod coordinator;
pub mod messages;
pub mod queue;
pub mod stage;

pub use coordination::Coordination;
pub use coordinator::{Collaborators, Pipeline};
pub use messages::{Segment, StageMessage, TurnControl};
pub use queue::{QueueReceiver, QueueSender, Received, queue};
pub use stage::{ExecutionMode, POLL_TIMEOUT, Stage, StageContext, StageRunner};
