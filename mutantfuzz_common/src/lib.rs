//! Data model shared between the mutation engine (`mutantfuzz_core`) and
//! the CLI driver (`mutantfuzz`), the way `fuzzcheck_common` is shared
//! between `fuzzcheck` and `cargo-fuzzcheck`.

pub mod event;
pub mod function_map;
pub mod jump;
pub mod plan;
pub mod settings;

pub use event::{FunctionStats, OrchestratorEvent};
pub use function_map::FunctionMap;
pub use jump::{Encoding, JumpSite, Mnemonic};
pub use plan::{MutantArtifact, MutationPlan, PlanEntry, Replacement};
pub use settings::Settings;
