//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供 Step 编排器决定是写入失败输出还是中止。

use crate::core::{AgentError, MalformedKind, RecoveryAction};

const FORMAT_HINT: &str =
    "The reply must be a single JSON object with \"ability\" and \"thoughts\".";

/// 语义化错误恢复：将错误映射为 Step 输出文本或中止
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 根据错误类型返回建议的恢复动作
    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::MalformedResponse {
                kind: MalformedKind::Decode,
                detail,
            } => RecoveryAction::ReportToStep(format!("Error in decoding JSON: {detail}. {FORMAT_HINT}")),
            AgentError::MalformedResponse {
                kind: MalformedKind::Shape,
                detail,
            } => RecoveryAction::ReportToStep(format!(
                "Reply does not match the response format: {detail}. {FORMAT_HINT}"
            )),
            AgentError::UnknownAbility(name) => {
                RecoveryAction::ReportToStep(format!("Ability not recognized: {name}"))
            }
            AgentError::InvalidArguments { ability, reason } => RecoveryAction::ReportToStep(
                format!("Invalid arguments for ability {ability}: {reason}"),
            ),
            AgentError::AbilityFailed(msg) => {
                RecoveryAction::ReportToStep(format!("Ability failed: {msg}"))
            }
            AgentError::AbilityTimeout(name) => {
                RecoveryAction::ReportToStep(format!("Ability {name} timed out"))
            }
            AgentError::ModelTimeout(secs) => RecoveryAction::ReportToStep(format!(
                "Unable to generate chat response: model did not answer within {secs}s"
            )),
            AgentError::Llm(msg) => {
                RecoveryAction::ReportToStep(format!("Unable to generate chat response: {msg}"))
            }
            AgentError::ProfileResolution(_)
            | AgentError::MemoryBackend(_)
            | AgentError::PathEscape(_) => RecoveryAction::ReportToStep(err.to_string()),
            AgentError::TaskCreation(_)
            | AgentError::TaskNotFound(_)
            | AgentError::Persistence(_)
            | AgentError::Prompt(_)
            | AgentError::Config(_) => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_malformed_response() {
        let engine = RecoveryEngine::new();
        let err = AgentError::malformed(MalformedKind::Decode, "expected value at line 1");
        match engine.handle(&err) {
            RecoveryAction::ReportToStep(msg) => {
                assert!(msg.starts_with("Error in decoding JSON"));
                assert!(msg.contains("line 1"));
            }
            _ => panic!("Expected ReportToStep"),
        }
    }

    #[test]
    fn test_recovery_shape_mismatch_is_not_a_decode_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::malformed(MalformedKind::Shape, "missing ability.name");
        match engine.handle(&err) {
            RecoveryAction::ReportToStep(msg) => {
                assert!(msg.starts_with("Reply does not match the response format"));
                assert!(msg.contains("missing ability.name"));
                assert!(!msg.contains("decoding"));
            }
            _ => panic!("Expected ReportToStep"),
        }
    }

    #[test]
    fn test_recovery_unknown_ability() {
        let engine = RecoveryEngine::new();
        let err = AgentError::UnknownAbility("Teleport".to_string());
        match engine.handle(&err) {
            RecoveryAction::ReportToStep(msg) => assert!(msg.contains("Teleport")),
            _ => panic!("Expected ReportToStep"),
        }
    }

    #[test]
    fn test_recovery_invalid_arguments() {
        let engine = RecoveryEngine::new();
        let err = AgentError::InvalidArguments {
            ability: "WriteFile".to_string(),
            reason: "missing required keyword argument 'filename'".to_string(),
        };
        match engine.handle(&err) {
            RecoveryAction::ReportToStep(msg) => {
                assert!(msg.contains("WriteFile"));
                assert!(msg.contains("filename"));
            }
            _ => panic!("Expected ReportToStep"),
        }
    }

    #[test]
    fn test_recovery_timeouts_are_reported() {
        let engine = RecoveryEngine::new();
        assert!(matches!(
            engine.handle(&AgentError::ModelTimeout(60)),
            RecoveryAction::ReportToStep(_)
        ));
        assert!(matches!(
            engine.handle(&AgentError::AbilityTimeout("ReadFile".to_string())),
            RecoveryAction::ReportToStep(_)
        ));
    }

    #[test]
    fn test_recovery_aborts_on_persistence() {
        let engine = RecoveryEngine::new();
        let err = AgentError::TaskNotFound("t-1".to_string());
        assert_eq!(engine.handle(&err), RecoveryAction::Abort);
        assert!(!err.is_recoverable());
        assert!(AgentError::Llm("boom".to_string()).is_recoverable());
    }
}
