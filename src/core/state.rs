//! Step 状态机
//!
//! CREATED → PROMPTING → AWAITING_MODEL → PARSING → DISPATCHING → RECORDING → DONE；
//! FAILED 可由 AWAITING_MODEL（超时）、PARSING、DISPATCHING 进入，之后仍转入 DONE。

use serde::Serialize;

use crate::core::AgentError;

/// 单个 Step 执行周期所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepPhase {
    Created,
    Prompting,
    AwaitingModel,
    Parsing,
    Dispatching,
    Recording,
    Failed,
    Done,
}

impl StepPhase {
    /// 是否允许从当前阶段转入 next
    pub fn can_transition_to(self, next: StepPhase) -> bool {
        use StepPhase::*;
        matches!(
            (self, next),
            (Created, Prompting)
                | (Prompting, AwaitingModel)
                | (AwaitingModel, Parsing)
                | (Parsing, Dispatching)
                | (Dispatching, Recording)
                | (Recording, Done)
                | (AwaitingModel, Failed)
                | (Parsing, Failed)
                | (Dispatching, Failed)
                | (Failed, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == StepPhase::Done
    }
}

/// 一次 Step 周期的阶段轨迹与失败原因
#[derive(Clone, Debug)]
pub struct StepCycle {
    phase: StepPhase,
    trace: Vec<StepPhase>,
    failure: Option<AgentError>,
}

impl StepCycle {
    pub fn new() -> Self {
        Self {
            phase: StepPhase::Created,
            trace: vec![StepPhase::Created],
            failure: None,
        }
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn trace(&self) -> &[StepPhase] {
        &self.trace
    }

    pub fn failure(&self) -> Option<&AgentError> {
        self.failure.as_ref()
    }

    pub fn advance(&mut self, next: StepPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "invalid step transition {:?} -> {:?}",
            self.phase,
            next
        );
        tracing::debug!(from = ?self.phase, to = ?next, "step phase");
        self.phase = next;
        self.trace.push(next);
    }

    /// 进入 FAILED 并记录原因
    pub fn fail(&mut self, err: AgentError) {
        self.advance(StepPhase::Failed);
        self.failure = Some(err);
    }
}

impl Default for StepCycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut cycle = StepCycle::new();
        for next in [
            StepPhase::Prompting,
            StepPhase::AwaitingModel,
            StepPhase::Parsing,
            StepPhase::Dispatching,
            StepPhase::Recording,
            StepPhase::Done,
        ] {
            cycle.advance(next);
        }
        assert!(cycle.phase().is_terminal());
        assert!(cycle.failure().is_none());
        assert_eq!(cycle.trace().len(), 7);
    }

    #[test]
    fn test_failed_path_still_reaches_done() {
        let mut cycle = StepCycle::new();
        cycle.advance(StepPhase::Prompting);
        cycle.advance(StepPhase::AwaitingModel);
        cycle.advance(StepPhase::Parsing);
        cycle.fail(AgentError::malformed(crate::core::MalformedKind::Decode, "bad"));
        cycle.advance(StepPhase::Done);
        assert!(cycle.failure().is_some());
        assert_eq!(cycle.phase(), StepPhase::Done);
        assert!(cycle.trace().contains(&StepPhase::Failed));
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(!StepPhase::Created.can_transition_to(StepPhase::Done));
        assert!(!StepPhase::Prompting.can_transition_to(StepPhase::Failed));
        assert!(!StepPhase::Recording.can_transition_to(StepPhase::Failed));
        assert!(!StepPhase::Done.can_transition_to(StepPhase::Prompting));
        assert!(StepPhase::Dispatching.can_transition_to(StepPhase::Failed));
    }
}
