//! The site-level data model (spec §3, `JumpSite`).

use std::fmt;

/// One of the six mutable conditional mnemonics. Unconditional jumps
/// (`jmp`) are never discovered as a `JumpSite`; they only ever appear as
/// a *replacement*.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Mnemonic {
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
}

impl Mnemonic {
    pub const ALL: [Mnemonic; 6] = [
        Mnemonic::Je,
        Mnemonic::Jne,
        Mnemonic::Jl,
        Mnemonic::Jle,
        Mnemonic::Jg,
        Mnemonic::Jge,
    ];

    /// Textual mnemonic as it appears in disassembly output.
    pub fn as_str(self) -> &'static str {
        match self {
            Mnemonic::Je => "je",
            Mnemonic::Jne => "jne",
            Mnemonic::Jl => "jl",
            Mnemonic::Jle => "jle",
            Mnemonic::Jg => "jg",
            Mnemonic::Jge => "jge",
        }
    }

    pub fn from_str(s: &str) -> Option<Mnemonic> {
        Some(match s {
            "je" => Mnemonic::Je,
            "jne" => Mnemonic::Jne,
            "jl" => Mnemonic::Jl,
            "jle" => Mnemonic::Jle,
            "jg" => Mnemonic::Jg,
            "jge" => Mnemonic::Jge,
            _ => return None,
        })
    }

    /// The logical complement within the same encoding: `je <-> jne`,
    /// `jl <-> jge`, `jle <-> jg`. Grounded on `mutate.py`'s
    /// `SHORT_FLIP`/`NEAR_FLIP` tables.
    pub fn complement(self) -> Mnemonic {
        match self {
            Mnemonic::Je => Mnemonic::Jne,
            Mnemonic::Jne => Mnemonic::Je,
            Mnemonic::Jl => Mnemonic::Jge,
            Mnemonic::Jge => Mnemonic::Jl,
            Mnemonic::Jle => Mnemonic::Jg,
            Mnemonic::Jg => Mnemonic::Jle,
        }
    }

    /// All mnemonics other than `self`, for the "substitute a different
    /// conditional" branch of the mutation policy.
    pub fn others(self) -> impl Iterator<Item = Mnemonic> {
        Mnemonic::ALL.into_iter().filter(move |m| *m != self)
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a conditional jump is encoded as the 2-byte short form or the
/// 6-byte near form. Both encodings keep their total length under any
/// replacement (spec §3, length preservation invariant).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Encoding {
    /// 1-byte opcode (`74`..`7F`) + 1-byte displacement.
    Short,
    /// 2-byte opcode (`0F 84`..`0F 8F`) + 4-byte displacement.
    Near,
}

impl Encoding {
    pub fn byte_len(self) -> usize {
        match self {
            Encoding::Short => 2,
            Encoding::Near => 6,
        }
    }

    /// Opcode byte(s) for `mnemonic` in this encoding (displacement bytes
    /// are not part of the opcode and are always copied verbatim from the
    /// original site).
    pub fn opcode_bytes(self, mnemonic: Mnemonic) -> &'static [u8] {
        match (self, mnemonic) {
            (Encoding::Short, Mnemonic::Je) => &[0x74],
            (Encoding::Short, Mnemonic::Jne) => &[0x75],
            (Encoding::Short, Mnemonic::Jl) => &[0x7C],
            (Encoding::Short, Mnemonic::Jge) => &[0x7D],
            (Encoding::Short, Mnemonic::Jle) => &[0x7E],
            (Encoding::Short, Mnemonic::Jg) => &[0x7F],
            (Encoding::Near, Mnemonic::Je) => &[0x0F, 0x84],
            (Encoding::Near, Mnemonic::Jne) => &[0x0F, 0x85],
            (Encoding::Near, Mnemonic::Jl) => &[0x0F, 0x8C],
            (Encoding::Near, Mnemonic::Jge) => &[0x0F, 0x8D],
            (Encoding::Near, Mnemonic::Jle) => &[0x0F, 0x8E],
            (Encoding::Near, Mnemonic::Jg) => &[0x0F, 0x8F],
        }
    }

    /// Classify a site's raw opcode bytes, returning the encoding and
    /// mnemonic, or `None` if these bytes are not one of the six mutable
    /// conditional jumps in either encoding.
    pub fn classify(raw_bytes: &[u8]) -> Option<(Encoding, Mnemonic)> {
        match raw_bytes.first().copied()? {
            0x74 => Some((Encoding::Short, Mnemonic::Je)),
            0x75 => Some((Encoding::Short, Mnemonic::Jne)),
            0x7C => Some((Encoding::Short, Mnemonic::Jl)),
            0x7D => Some((Encoding::Short, Mnemonic::Jge)),
            0x7E => Some((Encoding::Short, Mnemonic::Jle)),
            0x7F => Some((Encoding::Short, Mnemonic::Jg)),
            0x0F => match raw_bytes.get(1).copied()? {
                0x84 => Some((Encoding::Near, Mnemonic::Je)),
                0x85 => Some((Encoding::Near, Mnemonic::Jne)),
                0x8C => Some((Encoding::Near, Mnemonic::Jl)),
                0x8D => Some((Encoding::Near, Mnemonic::Jge)),
                0x8E => Some((Encoding::Near, Mnemonic::Jle)),
                0x8F => Some((Encoding::Near, Mnemonic::Jg)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Byte sequence for an unconditional jump of this encoding: `EB disp`
    /// for short, a leading no-op plus `E9 disp32` for near (the no-op
    /// keeps total length parity with the 6-byte conditional form it
    /// replaces). Matches `mutate.py`'s `SHORT_JUMPS[-1]`/`NEAR_JUMPS[-1]`.
    pub fn unconditional_opcode_bytes(self) -> &'static [u8] {
        match self {
            Encoding::Short => &[0xEB],
            Encoding::Near => &[0x90, 0xE9],
        }
    }
}

/// A single mutable conditional-jump site, immutable once discovered.
#[derive(Debug, Clone)]
pub struct JumpSite {
    /// Absolute byte offset of this instruction in the executable image.
    pub file_offset: u64,
    pub mnemonic: Mnemonic,
    pub encoding: Encoding,
    /// Original opcode + displacement bytes. Any replacement must have the
    /// same length.
    pub raw_bytes: Vec<u8>,
    /// Demangled function name, including signature, that owns this site.
    pub function_name: String,
    /// Most recent "path:line" annotation preceding this instruction, or
    /// empty if the disassembler did not emit one.
    pub source_tag: String,
    /// The original disassembly row, kept only for logging.
    pub disasm_line: String,
}

impl JumpSite {
    pub fn byte_len(&self) -> usize {
        self.raw_bytes.len()
    }
}
