use crate::jump::Mnemonic;

/// The tagged variant the mutation policy (C3) actually samples from,
/// resolved to bytes only at synthesis time (C4). Keeping the tag separate
/// from the bytes is what makes the probability distribution in spec §4.3
/// testable independently of byte emission (spec §9, design note).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Replacement {
    /// Flip the condition to its logical complement.
    Flip,
    /// Erase the jump: a no-op sled of the original length.
    Erase,
    /// Force the branch to always be taken: an unconditional jump.
    ForceUnconditional,
    /// Substitute a different conditional of the same encoding.
    OtherConditional(Mnemonic),
}

/// One chosen-and-resolved mutation: a site plus the bytes that will
/// overwrite it. `replacement_bytes.len()` always equals the original
/// site's byte length (spec §3 invariant).
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub function_name: String,
    pub site_offset: u64,
    pub replacement: Replacement,
    pub replacement_bytes: Vec<u8>,
}

/// The replayable unit of mutation: an ordered list of `k` site edits
/// (spec §3, `MutationPlan`). Order `k == 1` except when `order` is raised
/// on the command line to produce higher-order mutants.
pub type MutationPlan = Vec<PlanEntry>;

/// The three byte buffers derived from a base image and a plan (spec §3,
/// `MutantArtifact`).
#[derive(Debug, Clone)]
pub struct MutantArtifact {
    /// Base image with each site's bytes overwritten by its replacement.
    pub mutant: Vec<u8>,
    /// Base image with each site's first byte set to `0xF4` (halt) and the
    /// rest set to `0x90` (no-op).
    pub jump_probe: Vec<u8>,
    /// Base image with the entry byte of every plan function set to halt.
    pub function_probe: Vec<u8>,
}
