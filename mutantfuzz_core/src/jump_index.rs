//! C2 — Jump Index.
//!
//! Consumes the [`DisasmRecord`](crate::disasm::DisasmRecord) stream,
//! classifies instructions, applies the function-name/source-location
//! filters, and builds the `JumpSite` table plus the `FunctionMap`.

use mutantfuzz_common::{Encoding, FunctionMap, JumpSite};

use crate::disasm::{DisasmParser, DisasmRecord};
use crate::error::{MutantFuzzError, Result};

/// Default function-name substrings excluded unless the caller opts out
/// (spec §4.2, "default excludes ... unless disabled"). Covers fuzzer and
/// sanitizer glue plus common libc wrappers.
pub const DEFAULT_EXCLUDE_FUNCTIONS: &[&str] = &[
    "Fuzz",
    "asan",
    "sanitizer",
    "interceptor",
    "printf",
    "memcpy",
    "strcmp",
    "operator new",
    "_init",
    "_fini",
    "_start",
];

/// Demangled-name prefixes treated as standard-library/Boost code, excluded
/// unless `mutate_standard_libraries` is set. Grounded on `mutate.py`'s
/// `"std::" in just_name` / `"boost::" in just_name` checks.
pub const STDLIB_NAMESPACE_PREFIXES: &[&str] = &["std::", "boost::", "__gnu_cxx::", "__cxxabiv1::"];

/// Markers identifying instrumentation lines that must never be mutated,
/// regardless of which function they're in (spec §4.2, "instrumentation
/// line filter"). Grounded on `mutate.py`'s `INST_SET`.
pub const INSTRUMENTATION_MARKERS: &[&str] = &[
    "__afl",
    "__asan",
    "__ubsan",
    "__sanitizer",
    "__lsan",
    "__sancov",
    "AFL_",
    "DeepState",
    "deepstate",
];

/// The filtering configuration for one discovery pass (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    pub only_mutate: Vec<String>,
    pub avoid_mutating: Vec<String>,
    pub mutate_standard_libraries: bool,
    pub source_include: Vec<String>,
    pub source_exclude: Vec<String>,
    pub use_default_excludes: bool,
}

impl FilterConfig {
    fn function_excluded(&self, function_name: &str) -> bool {
        if !self.mutate_standard_libraries
            && STDLIB_NAMESPACE_PREFIXES.iter().any(|p| function_name.contains(p))
        {
            return true;
        }
        if self.use_default_excludes && DEFAULT_EXCLUDE_FUNCTIONS.iter().any(|p| function_name.contains(p)) {
            return true;
        }
        if self.avoid_mutating.iter().any(|p| function_name.contains(p.as_str())) {
            return true;
        }
        if !self.only_mutate.is_empty() && !self.only_mutate.iter().any(|p| function_name.contains(p.as_str())) {
            return true;
        }
        false
    }

    fn source_excluded(&self, source_tag: &str) -> bool {
        if self.source_exclude.iter().any(|p| source_tag.contains(p.as_str())) {
            return true;
        }
        if !self.source_include.is_empty() && !self.source_include.iter().any(|p| source_tag.contains(p.as_str())) {
            return true;
        }
        false
    }

    fn instrumentation_line(line: &str) -> bool {
        INSTRUMENTATION_MARKERS.iter().any(|m| line.contains(m))
    }
}

/// The result of discovery: every mutable site keyed by its absolute file
/// offset, plus the function map.
#[derive(Debug, Clone, Default)]
pub struct JumpIndex {
    sites: Vec<JumpSite>,
    function_map: FunctionMap,
}

impl JumpIndex {
    pub fn sites(&self) -> &[JumpSite] {
        &self.sites
    }

    pub fn function_map(&self) -> &FunctionMap {
        &self.function_map
    }

    pub fn site_at(&self, offset: u64) -> Option<&JumpSite> {
        self.sites.iter().find(|s| s.file_offset == offset)
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Build a jump index from raw disassembler lines under `filter`.
    pub fn build(lines: &[String], filter: &FilterConfig) -> Result<Self> {
        let mut index = JumpIndex::default();
        let mut parser = DisasmParser::new();
        let mut current_function: Option<String> = None;
        let mut function_excluded = false;
        let mut source_tag = String::new();

        parser.parse_stream(lines, |record| match record {
            DisasmRecord::FunctionHeader {
                function_name,
                header_file_offset,
            } => {
                function_excluded = filter.function_excluded(&function_name);
                if let Some(offset) = header_file_offset {
                    // Recorded unconditionally, even for excluded
                    // functions (spec §9, resolved open question).
                    index.function_map.record_entry(&function_name, offset);
                }
                current_function = Some(function_name);
            }
            DisasmRecord::SourceAnnotation(tag) => {
                source_tag = tag;
            }
            DisasmRecord::Instruction {
                file_offset,
                raw_bytes,
                disasm_line,
            } => {
                let Some(function_name) = current_function.clone() else {
                    return;
                };
                // The entry offset may only be knowable from the first
                // instruction if the header line carried none; record it
                // the same way regardless of filtering status.
                index.function_map.record_entry(&function_name, {
                    index.function_map.entry_offset(&function_name).unwrap_or(file_offset)
                });

                if function_excluded || FilterConfig::instrumentation_line(&disasm_line) {
                    return;
                }
                if filter.source_excluded(&source_tag) {
                    return;
                }
                let Some((encoding, mnemonic)) = Encoding::classify(&raw_bytes) else {
                    return;
                };
                index.function_map.record_site(&function_name, file_offset);
                index.sites.push(JumpSite {
                    file_offset,
                    mnemonic,
                    encoding,
                    raw_bytes,
                    function_name,
                    source_tag: source_tag.clone(),
                    disasm_line,
                });
            }
        });

        if index.is_empty() {
            return Err(MutantFuzzError::EmptyJumpIndex(
                "target has no mutable jumps".to_string(),
            ));
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn default_filter() -> FilterConfig {
        FilterConfig {
            use_default_excludes: true,
            ..Default::default()
        }
    }

    #[test]
    fn finds_one_site_and_records_function_entry() {
        let raw = lines(&[
            "0000000000001149 <target>: (File Offset: 0x1149)",
            "    1149:\t55\tpush %rbp",
            "    114a:\t74 05\tje 1151",
        ]);
        let index = JumpIndex::build(&raw, &default_filter()).unwrap();
        assert_eq!(index.sites().len(), 1);
        assert_eq!(index.function_map().entry_offset("target"), Some(0x1149));
        assert_eq!(index.function_map().sites_of("target"), &[0x114a]);
    }

    #[test]
    fn excludes_stdlib_functions_but_keeps_their_entry() {
        let raw = lines(&[
            "0000000000001000 <std::vector<int>::push_back>: (File Offset: 0x1000)",
            "    1000:\t55\tpush %rbp",
            "    1001:\t74 05\tje 1008",
        ]);
        let index = JumpIndex::build(&raw, &default_filter());
        // no sites survive, but the function exists -> empty jump index is fatal
        assert!(matches!(index, Err(MutantFuzzError::EmptyJumpIndex(_))));
    }

    #[test]
    fn avoid_mutating_excludes_matching_function_entry_still_recorded() {
        let raw = lines(&[
            "0000000000001000 <keep_me>: (File Offset: 0x1000)",
            "    1000:\t74 05\tje 1007",
            "0000000000002000 <skip_me>: (File Offset: 0x2000)",
            "    2000:\t74 05\tje 2007",
        ]);
        let mut filter = default_filter();
        filter.avoid_mutating.push("skip_me".to_string());
        let index = JumpIndex::build(&raw, &filter).unwrap();
        assert_eq!(index.sites().len(), 1);
        assert_eq!(index.sites()[0].function_name, "keep_me");
        assert_eq!(index.function_map().entry_offset("skip_me"), Some(0x2000));
        assert!(index.function_map().sites_of("skip_me").is_empty());
    }

    #[test]
    fn instrumentation_lines_are_skipped() {
        let raw = lines(&[
            "0000000000001000 <target>: (File Offset: 0x1000)",
            "    1000:\t74 05\tje 1007 <__afl_maybe_log>",
        ]);
        let index = JumpIndex::build(&raw, &default_filter());
        assert!(matches!(index, Err(MutantFuzzError::EmptyJumpIndex(_))));
    }

    #[test]
    fn source_location_filters_apply() {
        let raw = lines(&[
            "0000000000001000 <target>: (File Offset: 0x1000)",
            "src/vendor/zlib.c:5",
            "    1000:\t74 05\tje 1007",
            "src/app/core.c:9",
            "    1005:\t75 05\tjne 100c",
        ]);
        let mut filter = default_filter();
        filter.source_exclude.push("vendor".to_string());
        let index = JumpIndex::build(&raw, &filter).unwrap();
        assert_eq!(index.sites().len(), 1);
        assert_eq!(index.sites()[0].file_offset, 0x1005);
    }
}
