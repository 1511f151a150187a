//! 核心编排层：错误与恢复、Step 状态机、任务锁、构建器与 Step 编排器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod state;
pub mod task_scheduler;

pub use builder::EngineBuilder;
pub use error::{preview, AgentError, MalformedKind, RecoveryAction};
pub use orchestrator::{EngineSettings, StepOrchestrator};
pub use recovery::RecoveryEngine;
pub use state::{StepCycle, StepPhase};
pub use task_scheduler::TaskLocks;
