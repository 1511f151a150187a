//! Stepwise - Rust 自主智能体 Step 执行引擎
//!
//! 模块划分：
//! - **abilities**: 能力注册表、参数绑定、执行器与默认能力（文件读写、Finish）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: Step 编排器、状态机、错误恢复、任务锁、构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **memory**: 按任务去重的对话存储、长期记忆后端与记忆桥、对话归档
//! - **observability**: 日志初始化
//! - **prompt**: Prompt 模板引擎
//! - **react**: 模型回复契约、专家画像推断
//! - **task**: Task / Step 数据模型与持久化接口

pub mod abilities;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompt;
pub mod react;
pub mod task;

pub use crate::core::{AgentError, EngineBuilder, EngineSettings, StepOrchestrator};
