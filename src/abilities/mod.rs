pub mod executor;
pub mod filesystem;
pub mod finish;
pub mod registry;

pub use executor::{render_result, AbilityExecutor};
pub use filesystem::{ListFilesAbility, ReadFileAbility, WriteFileAbility, Workspace};
pub use finish::FinishAbility;
pub use registry::{Ability, AbilityArgs, AbilityParameter, AbilityRegistry, ParamKind};
