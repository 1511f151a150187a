//! 认知层：模型回复契约与专家画像推断

pub mod contract;
pub mod profile;

pub use contract::{parse_reply, response_schema_json, AbilityInvocation, ModelReply, Thoughts};
pub use profile::{parse_profile, ExpertProfile, ProfileResolver};
