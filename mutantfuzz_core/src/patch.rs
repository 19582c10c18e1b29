//! C4 — Patch Synthesizer.
//!
//! Produces the three byte buffers of a [`MutantArtifact`] from a base
//! image and a resolved [`MutationPlan`], plus the line-delimited replay
//! metadata format of spec §4.4. Grounded on `mutate.py::mutant_from`'s
//! single pass over `(loc, new_data)` pairs, generalized to emit all three
//! buffers and a textual format instead of two in-memory byte arrays.

use mutantfuzz_common::{FunctionMap, MutantArtifact, MutationPlan};

use crate::error::{MutantFuzzError, Result};

const HALT_OPCODE: u8 = 0xF4;
const NOP_OPCODE: u8 = 0x90;

/// Apply `plan` to `base_image`, producing the mutant, jump-reachability
/// probe, and function-reachability probe (spec §4.4).
pub fn synthesize(base_image: &[u8], function_map: &FunctionMap, plan: &MutationPlan) -> Result<MutantArtifact> {
    let mut mutant = base_image.to_vec();
    let mut jump_probe = base_image.to_vec();
    let mut function_probe = base_image.to_vec();

    for entry in plan {
        let start = entry.site_offset as usize;
        let end = start + entry.replacement_bytes.len();
        if end > base_image.len() {
            return Err(MutantFuzzError::Other(format!(
                "site offset 0x{:x} with length {} falls outside a {}-byte image",
                entry.site_offset,
                entry.replacement_bytes.len(),
                base_image.len()
            )));
        }
        mutant[start..end].copy_from_slice(&entry.replacement_bytes);

        jump_probe[start] = HALT_OPCODE;
        for byte in &mut jump_probe[start + 1..end] {
            *byte = NOP_OPCODE;
        }

        let entry_offset = function_map
            .entry_offset(&entry.function_name)
            .ok_or_else(|| MutantFuzzError::MissingFunctionEntry(entry.function_name.clone()))?;
        let entry_offset = entry_offset as usize;
        if entry_offset >= function_probe.len() {
            return Err(MutantFuzzError::Other(format!(
                "entry offset 0x{entry_offset:x} for `{}` falls outside the image",
                entry.function_name
            )));
        }
        function_probe[entry_offset] = HALT_OPCODE;
    }

    Ok(MutantArtifact {
        mutant,
        jump_probe,
        function_probe,
    })
}

/// Serialize `plan` into the replayable line-delimited format of spec
/// §4.4: per site, the function name, the site offset *relative to its
/// function's entry*, the replacement length, then one decimal byte value
/// per line.
pub fn serialize_metadata(function_map: &FunctionMap, plan: &MutationPlan) -> Result<String> {
    let mut out = String::new();
    for entry in plan {
        let entry_offset = function_map
            .entry_offset(&entry.function_name)
            .ok_or_else(|| MutantFuzzError::MissingFunctionEntry(entry.function_name.clone()))?;
        let relative_offset = entry.site_offset - entry_offset;
        out.push_str(&entry.function_name);
        out.push('\n');
        out.push_str(&relative_offset.to_string());
        out.push('\n');
        out.push_str(&entry.replacement_bytes.len().to_string());
        out.push('\n');
        for byte in &entry.replacement_bytes {
            out.push_str(&byte.to_string());
            out.push('\n');
        }
    }
    Ok(out)
}

/// One replayed edit: enough to reconstruct a `PlanEntry` given the
/// function map (to resolve the absolute offset).
#[derive(Debug, Clone)]
pub struct ReplayedEdit {
    pub function_name: String,
    pub relative_offset: u64,
    pub replacement_bytes: Vec<u8>,
}

/// Parse the metadata format emitted by [`serialize_metadata`] back into
/// edits. Round-trips bit-for-bit with the writer (spec §8, "Metadata
/// round-trip").
pub fn parse_metadata(text: &str) -> Result<Vec<ReplayedEdit>> {
    let mut lines = text.lines();
    let mut edits = Vec::new();
    loop {
        let Some(function_name) = lines.next() else {
            break;
        };
        if function_name.is_empty() {
            continue;
        }
        let relative_offset: u64 = lines
            .next()
            .ok_or_else(|| MutantFuzzError::MetadataParse("missing site offset line".to_string()))?
            .parse()
            .map_err(|_| MutantFuzzError::MetadataParse("site offset is not a number".to_string()))?;
        let length: usize = lines
            .next()
            .ok_or_else(|| MutantFuzzError::MetadataParse("missing length line".to_string()))?
            .parse()
            .map_err(|_| MutantFuzzError::MetadataParse("length is not a number".to_string()))?;
        let mut replacement_bytes = Vec::with_capacity(length);
        for _ in 0..length {
            let byte: u8 = lines
                .next()
                .ok_or_else(|| MutantFuzzError::MetadataParse("truncated byte list".to_string()))?
                .parse()
                .map_err(|_| MutantFuzzError::MetadataParse("byte value is not a number".to_string()))?;
            replacement_bytes.push(byte);
        }
        edits.push(ReplayedEdit {
            function_name: function_name.to_string(),
            relative_offset,
            replacement_bytes,
        });
    }
    Ok(edits)
}

/// Resolve replayed edits against the current function map and base image
/// into a synthesizable [`MutationPlan`], without consulting the
/// original's jump index (replay doesn't require rediscovering sites).
pub fn plan_from_replay(function_map: &FunctionMap, edits: &[ReplayedEdit]) -> Result<MutationPlan> {
    edits
        .iter()
        .map(|edit| {
            let entry_offset = function_map
                .entry_offset(&edit.function_name)
                .ok_or_else(|| MutantFuzzError::MissingFunctionEntry(edit.function_name.clone()))?;
            Ok(mutantfuzz_common::PlanEntry {
                function_name: edit.function_name.clone(),
                site_offset: entry_offset + edit.relative_offset,
                // The replacement tag is not recoverable from bytes alone
                // (and is not needed to reconstruct the image); callers
                // that need it for reporting can re-derive it from
                // `replacement_bytes` against the jump index.
                replacement: mutantfuzz_common::Replacement::Erase,
                replacement_bytes: edit.replacement_bytes.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mutantfuzz_common::PlanEntry;

    fn sample_function_map() -> FunctionMap {
        let mut fm = FunctionMap::new();
        fm.record_entry("f", 0x1000);
        fm.record_site("f", 0x1005);
        fm
    }

    fn sample_plan() -> MutationPlan {
        vec![PlanEntry {
            function_name: "f".to_string(),
            site_offset: 0x1005,
            replacement: mutantfuzz_common::Replacement::Flip,
            replacement_bytes: vec![0x75, 0x05],
        }]
    }

    #[test]
    fn mutant_applies_replacement_bytes() {
        let base = vec![0u8; 0x1010];
        let artifact = synthesize(&base, &sample_function_map(), &sample_plan()).unwrap();
        assert_eq!(&artifact.mutant[0x1005..0x1007], &[0x75, 0x05]);
    }

    #[test]
    fn jump_probe_halts_first_byte_nops_rest() {
        let base = vec![0u8; 0x1010];
        let artifact = synthesize(&base, &sample_function_map(), &sample_plan()).unwrap();
        assert_eq!(artifact.jump_probe[0x1005], 0xF4);
        assert_eq!(artifact.jump_probe[0x1006], 0x90);
        // Everywhere else the jump probe equals the base image.
        for i in 0..0x1010 {
            if i != 0x1005 && i != 0x1006 {
                assert_eq!(artifact.jump_probe[i], base[i]);
            }
        }
    }

    #[test]
    fn function_probe_halts_only_entry_byte() {
        let base = vec![0u8; 0x1010];
        let artifact = synthesize(&base, &sample_function_map(), &sample_plan()).unwrap();
        assert_eq!(artifact.function_probe[0x1000], 0xF4);
        for i in 0..0x1010 {
            if i != 0x1000 {
                assert_eq!(artifact.function_probe[i], base[i]);
            }
        }
    }

    #[test]
    fn metadata_round_trips() {
        let fm = sample_function_map();
        let plan = sample_plan();
        let text = serialize_metadata(&fm, &plan).unwrap();
        let edits = parse_metadata(&text).unwrap();
        let replayed_plan = plan_from_replay(&fm, &edits).unwrap();

        let base = vec![0u8; 0x1010];
        let original = synthesize(&base, &fm, &plan).unwrap();
        let replayed = synthesize(&base, &fm, &replayed_plan).unwrap();
        assert_eq!(original.mutant, replayed.mutant);
    }

    #[test]
    fn missing_function_entry_is_fatal() {
        let fm = FunctionMap::new(); // no entries recorded
        let plan = sample_plan();
        let err = synthesize(&vec![0u8; 0x1010], &fm, &plan).unwrap_err();
        assert!(matches!(err, MutantFuzzError::MissingFunctionEntry(_)));
    }
}
