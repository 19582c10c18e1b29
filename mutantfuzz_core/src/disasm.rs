//! C1 — Disassembly Ingest.
//!
//! Drives an external disassembler (by default `objdump -d -C
//! --file-offsets`) and streams its textual output into typed records.
//! Grounded on `mutate.py::get_jumps`'s line-by-line parsing, generalized
//! per spec §4.1 into three record kinds instead of one ad hoc dict.
//!
//! Malformed lines are skipped, never fatal (spec §7): a disassembler's
//! output is free-form text and this parser only recognizes the shapes it
//! understands.

use std::process::{Command, Stdio};

use object::{Object, ObjectKind};

use crate::error::{MutantFuzzError, Result};

/// Parse `image` far enough to confirm it's a format `object` recognizes
/// and return its entry-point address, as a bootstrap sanity check before
/// handing the path to the external disassembler (spec §6, "Path to an
/// ELF-style executable"). A format `object` can't parse at all is the
/// same fatal bootstrap condition as an empty jump index: better to fail
/// here with a clear message than after already spawning the disassembler.
pub fn validate_executable(image: &[u8]) -> Result<u64> {
    let file = object::File::parse(image).map_err(|e| MutantFuzzError::Other(format!("not a recognized executable: {e}")))?;
    // `Dynamic` covers position-independent executables, which modern
    // toolchains emit by default even for non-library binaries.
    if file.kind() != ObjectKind::Executable && file.kind() != ObjectKind::Dynamic {
        return Err(MutantFuzzError::Other(format!(
            "expected an executable or PIE image, found {:?}",
            file.kind()
        )));
    }
    Ok(file.entry())
}

/// One parsed row of disassembler output.
#[derive(Debug, Clone)]
pub enum DisasmRecord {
    /// A new function's header line, e.g. `0000000000001149 <main>:
    /// (File Offset: 0x1149)`.
    FunctionHeader {
        function_name: String,
        /// Absolute file offset of this function's first byte, as reported
        /// by the disassembler itself (used as a fallback if no
        /// instruction line follows before the next header).
        header_file_offset: Option<u64>,
    },
    /// A source-location annotation line (e.g. `src/main.c:42`), attached
    /// to every instruction until the next annotation or function header.
    SourceAnnotation(String),
    /// A single disassembled instruction.
    Instruction {
        file_offset: u64,
        raw_bytes: Vec<u8>,
        disasm_line: String,
    },
}

/// Spawn the external disassembler against `executable_path` and return its
/// stdout lines. Split out from the parser so tests can feed canned text
/// directly to [`parse_stream`].
pub fn run_disassembler(disassembler: &str, executable_path: &str) -> Result<Vec<String>> {
    let output = Command::new(disassembler)
        .args(["-d", "-C", "--file-offsets", executable_path])
        .stdin(Stdio::null())
        .output()
        .map_err(MutantFuzzError::DisasmSpawn)?;
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text.lines().map(str::to_owned).collect())
}

/// Parses disassembler output lines into [`DisasmRecord`]s, maintaining the
/// per-function `address -> file_offset` delta and the most recent source
/// annotation across lines (spec §4.1, "state kept while streaming").
pub struct DisasmParser {
    /// `file_offset_of_header - symbol_address` for the function currently
    /// being parsed.
    current_delta: i64,
    current_function: Option<String>,
}

impl DisasmParser {
    pub fn new() -> Self {
        Self {
            current_delta: 0,
            current_function: None,
        }
    }

    /// Parse every line, calling `on_record` for each recognized record in
    /// order. Unparseable lines are silently skipped.
    pub fn parse_stream(&mut self, lines: &[String], mut on_record: impl FnMut(DisasmRecord)) {
        for line in lines {
            if let Some(record) = self.parse_line(line) {
                on_record(record);
            }
        }
    }

    fn parse_line(&mut self, line: &str) -> Option<DisasmRecord> {
        if let Some((name, addr, file_offset)) = parse_function_header(line) {
            self.current_function = Some(name.clone());
            self.current_delta = file_offset.map(|fo| fo as i64 - addr as i64).unwrap_or(0);
            return Some(DisasmRecord::FunctionHeader {
                function_name: name,
                header_file_offset: file_offset,
            });
        }

        if self.current_function.is_none() {
            // Outside of any function (section banners, file headers):
            // nothing in spec §4.1 cares about these lines.
            if let Some(tag) = parse_source_annotation(line) {
                return Some(DisasmRecord::SourceAnnotation(tag));
            }
            return None;
        }

        if let Some((addr, raw_bytes, disasm_text)) = parse_instruction(line) {
            let file_offset = (addr as i64 + self.current_delta) as u64;
            return Some(DisasmRecord::Instruction {
                file_offset,
                raw_bytes,
                disasm_line: disasm_text,
            });
        }

        if let Some(tag) = parse_source_annotation(line) {
            return Some(DisasmRecord::SourceAnnotation(tag));
        }

        None
    }
}

impl Default for DisasmParser {
    fn default() -> Self {
        Self::new()
    }
}

/// `ADDR <NAME>: (File Offset: 0xOFFSET)` -> `(NAME, ADDR, Some(OFFSET))`.
/// `ADDR <NAME>:` with no file-offset annotation -> `(NAME, ADDR, None)`.
fn parse_function_header(line: &str) -> Option<(String, u64, Option<u64>)> {
    let line = line.trim_end();
    let mut parts = line.splitn(2, char::is_whitespace);
    let addr_token = parts.next()?;
    let rest = parts.next()?.trim_start();
    if !rest.starts_with('<') {
        return None;
    }
    let addr = u64::from_str_radix(addr_token, 16).ok()?;

    let close = rest.find(">:")?;
    let name = rest[1..close].to_string();
    if name.is_empty() {
        return None;
    }
    let after = &rest[close + 2..];

    let file_offset = after.find("File Offset:").and_then(|pos| {
        let tail = &after[pos + "File Offset:".len()..];
        let tail = tail.trim_start().trim_start_matches("0x");
        let hex_end = tail.find(|c: char| !c.is_ascii_hexdigit()).unwrap_or(tail.len());
        u64::from_str_radix(&tail[..hex_end], 16).ok()
    });

    Some((name, addr, file_offset))
}

/// `  1149:\t55                   \tpush   %rbp` -> `(0x1149, [0x55], "push %rbp")`.
/// Mirrors `mutate.py::get_jumps`'s `line.split("\t")` field layout.
fn parse_instruction(line: &str) -> Option<(u64, Vec<u8>, String)> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 3 {
        return None;
    }
    let addr_field = fields[0].trim();
    let addr_hex = addr_field.strip_suffix(':')?.trim();
    if addr_hex.is_empty() || !addr_hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let addr = u64::from_str_radix(addr_hex, 16).ok()?;

    let raw_bytes: Vec<u8> = fields[1]
        .split_whitespace()
        .map(|byte| u8::from_str_radix(byte, 16))
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if raw_bytes.is_empty() {
        return None;
    }

    Some((addr, raw_bytes, fields[2].trim().to_string()))
}

/// A bare `path:line` annotation line: no tab-separated hex-byte field,
/// contains a colon, and ends with a run of digits.
fn parse_source_annotation(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.contains('\t') {
        return None;
    }
    let colon = trimmed.rfind(':')?;
    let (path, line_no) = (&trimmed[..colon], &trimmed[colon + 1..]);
    if path.is_empty() || line_no.is_empty() || !line_no.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_instruction_and_source_line() {
        let lines: Vec<String> = vec![
            "0000000000001149 <main>: (File Offset: 0x1149)".into(),
            "src/main.c:10".into(),
            "    1149:\t55                   \tpush   %rbp".into(),
            "    114a:\t74 05                \tje     1151 <main+0x8>".into(),
        ]
        .into_iter()
        .collect();

        let mut parser = DisasmParser::new();
        let mut records = Vec::new();
        parser.parse_stream(&lines, |r| records.push(r));

        assert!(matches!(&records[0], DisasmRecord::FunctionHeader { function_name, header_file_offset }
            if function_name == "main" && *header_file_offset == Some(0x1149)));
        assert!(matches!(&records[1], DisasmRecord::SourceAnnotation(s) if s == "src/main.c:10"));
        assert!(matches!(&records[2], DisasmRecord::Instruction { file_offset, raw_bytes, .. }
            if *file_offset == 0x1149 && raw_bytes == &[0x55]));
        assert!(matches!(&records[3], DisasmRecord::Instruction { file_offset, raw_bytes, .. }
            if *file_offset == 0x114a && raw_bytes == &[0x74, 0x05]));
    }

    #[test]
    fn absolute_offset_accounts_for_pic_delta() {
        // Symbol address 0x2000, but the disassembler reports its file
        // offset as 0x1000 (loaded at a different address than it sits on
        // disk), so every later instruction must subtract 0x1000.
        let lines: Vec<String> = vec![
            "0000000000002000 <f>: (File Offset: 0x1000)".into(),
            "    2005:\t74 05\tje 200c".into(),
        ]
        .into_iter()
        .collect();

        let mut parser = DisasmParser::new();
        let mut records = Vec::new();
        parser.parse_stream(&lines, |r| records.push(r));

        assert!(matches!(&records[1], DisasmRecord::Instruction { file_offset, .. } if *file_offset == 0x1005));
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let lines: Vec<String> = vec![
            "0000000000001149 <main>: (File Offset: 0x1149)".into(),
            "this is garbage \t that looks \t like three \t fields".into(),
            "    114a:\t90\tnop".into(),
        ]
        .into_iter()
        .collect();

        let mut parser = DisasmParser::new();
        let mut records = Vec::new();
        parser.parse_stream(&lines, |r| records.push(r));
        // garbage line's "addr" field fails hex parsing and is dropped.
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn validate_executable_rejects_non_object_bytes() {
        let err = validate_executable(b"not an executable at all").unwrap_err();
        assert!(matches!(err, MutantFuzzError::Other(_)));
    }
}
