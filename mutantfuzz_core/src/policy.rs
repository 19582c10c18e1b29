//! C3 — Mutation Policy.
//!
//! Chooses a [`Replacement`] for a site under the fixed probability mixture
//! from spec §4.3, grounded on `mutate.py::different_jump`. The tagged
//! variant is resolved into bytes by [`crate::patch`], so the probability
//! cascade itself can be tested (spec §8, "Policy distribution") without
//! touching byte emission.

use mutantfuzz_common::{Encoding, Mnemonic, Replacement};

/// Sampling source for the policy. An explicit trait (rather than reading
/// global PRNG state) is what lets the distribution test in this module
/// drive the policy deterministically, mirroring the teacher's mutators
/// taking an explicit RNG parameter instead of a thread-local.
pub trait Rng {
    /// Uniform float in `[0.0, 1.0)`.
    fn f64(&mut self) -> f64;
    fn usize(&mut self, bound: std::ops::Range<usize>) -> usize;
}

/// [`Rng`] backed by `fastrand`, the engine's default source of randomness.
pub struct FastRng(pub fastrand::Rng);

impl FastRng {
    pub fn new() -> Self {
        FastRng(fastrand::Rng::new())
    }

    pub fn with_seed(seed: u64) -> Self {
        FastRng(fastrand::Rng::with_seed(seed))
    }
}

impl Default for FastRng {
    fn default() -> Self {
        Self::new()
    }
}

impl Rng for FastRng {
    fn f64(&mut self) -> f64 {
        self.0.f64()
    }

    fn usize(&mut self, bound: std::ops::Range<usize>) -> usize {
        self.0.usize(bound)
    }
}

/// P(flip the condition) — the highest-yield mutation (spec §4.3, branch 1).
pub const P_FLIP: f64 = 0.70;
/// P(erase | not flip) — "don't care" branch taken as a no-op sled.
pub const P_ERASE_GIVEN_NOT_FLIP: f64 = 0.40;
/// P(force-unconditional | not flip, not erase).
pub const P_FORCE_GIVEN_REMAINDER: f64 = 0.40 / 0.60;

/// Sample a [`Replacement`] for `mnemonic` under the fixed mixture.
/// `encoding` only matters for the "other conditional" branch, which must
/// pick from the same encoding's alternatives.
pub fn choose_replacement(mnemonic: Mnemonic, _encoding: Encoding, rng: &mut impl Rng) -> Replacement {
    if rng.f64() <= P_FLIP {
        return Replacement::Flip;
    }
    if rng.f64() <= P_ERASE_GIVEN_NOT_FLIP {
        return Replacement::Erase;
    }
    if rng.f64() <= P_FORCE_GIVEN_REMAINDER {
        return Replacement::ForceUnconditional;
    }
    let others: Vec<Mnemonic> = mnemonic.others().collect();
    let pick = others[rng.usize(0..others.len())];
    Replacement::OtherConditional(pick)
}

/// Resolve a [`Replacement`] into concrete bytes of the same length as
/// `original_bytes`, for `mnemonic`/`encoding` at a site.
///
/// Branches 3 and 4 must never reproduce the original opcode (spec §4.3's
/// "must not produce a replacement identical to the original... in
/// branches (3) and (4)"): branch 3 always emits an unconditional jump
/// (never itself one of the six conditionals), and branch 4 draws only
/// from `mnemonic.others()`, which excludes `mnemonic` itself.
pub fn resolve_bytes(replacement: Replacement, mnemonic: Mnemonic, encoding: Encoding, original_bytes: &[u8]) -> Vec<u8> {
    let len = original_bytes.len();
    let mut out = vec![0x90u8; len]; // no-op filler, overwritten below except for Erase
    match replacement {
        Replacement::Erase => {}
        Replacement::Flip => {
            let opcode = encoding.opcode_bytes(mnemonic.complement());
            out[..opcode.len()].copy_from_slice(opcode);
            out[opcode.len()..].copy_from_slice(&original_bytes[opcode.len()..]);
        }
        Replacement::OtherConditional(other) => {
            let opcode = encoding.opcode_bytes(other);
            out[..opcode.len()].copy_from_slice(opcode);
            out[opcode.len()..].copy_from_slice(&original_bytes[opcode.len()..]);
        }
        Replacement::ForceUnconditional => {
            let opcode = encoding.unconditional_opcode_bytes();
            out[..opcode.len()].copy_from_slice(opcode);
            // Displacement bytes are copied verbatim; for the near
            // encoding the unconditional opcode is 2 bytes (leading noop +
            // E9) just like the conditional it replaces, so the
            // displacement still starts at the same index.
            out[opcode.len()..].copy_from_slice(&original_bytes[opcode.len()..]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ForcedRng(Vec<f64>, usize);
    impl Rng for ForcedRng {
        fn f64(&mut self) -> f64 {
            let v = self.0[self.1.min(self.0.len() - 1)];
            self.1 += 1;
            v
        }
        fn usize(&mut self, bound: std::ops::Range<usize>) -> usize {
            bound.start
        }
    }

    #[test]
    fn scenario_flip_only() {
        // je at 0x1000, bytes 74 05 -> flip should give 75 05
        let mut rng = ForcedRng(vec![0.0], 0);
        let replacement = choose_replacement(Mnemonic::Je, Encoding::Short, &mut rng);
        assert_eq!(replacement, Replacement::Flip);
        let bytes = resolve_bytes(replacement, Mnemonic::Je, Encoding::Short, &[0x74, 0x05]);
        assert_eq!(bytes, vec![0x75, 0x05]);
    }

    #[test]
    fn scenario_erase() {
        let mut rng = ForcedRng(vec![1.0, 0.0], 0);
        let replacement = choose_replacement(Mnemonic::Je, Encoding::Short, &mut rng);
        assert_eq!(replacement, Replacement::Erase);
        let bytes = resolve_bytes(replacement, Mnemonic::Je, Encoding::Short, &[0x74, 0x05]);
        assert_eq!(bytes, vec![0x90, 0x90]);
    }

    #[test]
    fn scenario_force_unconditional_near() {
        let mut rng = ForcedRng(vec![1.0, 1.0, 0.0], 0);
        let replacement = choose_replacement(Mnemonic::Je, Encoding::Near, &mut rng);
        assert_eq!(replacement, Replacement::ForceUnconditional);
        let original = [0x0F, 0x84, 0x10, 0x00, 0x00, 0x00];
        let bytes = resolve_bytes(replacement, Mnemonic::Je, Encoding::Near, &original);
        assert_eq!(bytes, vec![0x90, 0xE9, 0x10, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn other_conditional_never_reproduces_original() {
        let mut rng = ForcedRng(vec![1.0, 1.0, 1.0], 0);
        let replacement = choose_replacement(Mnemonic::Je, Encoding::Short, &mut rng);
        match replacement {
            Replacement::OtherConditional(m) => assert_ne!(m, Mnemonic::Je),
            other => panic!("expected OtherConditional, got {other:?}"),
        }
    }

    #[test]
    fn distribution_matches_spec_within_tolerance() {
        let mut rng = FastRng::with_seed(42);
        let n = 20_000;
        let (mut flips, mut erases, mut forces, mut others) = (0, 0, 0, 0);
        for _ in 0..n {
            match choose_replacement(Mnemonic::Je, Encoding::Short, &mut rng) {
                Replacement::Flip => flips += 1,
                Replacement::Erase => erases += 1,
                Replacement::ForceUnconditional => forces += 1,
                Replacement::OtherConditional(_) => others += 1,
            }
        }
        // flip=0.70; erase=0.30*0.40=0.12; force=0.30*0.60*(0.40/0.60)=0.12;
        // other=0.30*0.60*(1-0.40/0.60)=0.06 (spec §4.3's exact cascade).
        let freq = |c: i32| c as f64 / n as f64;
        assert!((freq(flips) - 0.70).abs() < 0.02, "flip freq {}", freq(flips));
        assert!((freq(erases) - 0.12).abs() < 0.02, "erase freq {}", freq(erases));
        assert!((freq(forces) - 0.12).abs() < 0.02, "force freq {}", freq(forces));
        assert!((freq(others) - 0.06).abs() < 0.02, "other freq {}", freq(others));
    }
}
