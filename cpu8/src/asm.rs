// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

//! Two-pass assembler from mnemonic source to a binary image.
//!
//! Source is line oriented. `;` starts a comment, `name:` defines a label at
//! the current output offset and `.byte v0 v1 ...` emits raw bytes. Mnemonics
//! and register names are case-insensitive. Operands are written as `R0`
//! (register), `#12` (immediate), `[R0]` (register-indirect) or `[#12]`
//! (absolute memory); a bare identifier refers to a label, before or after its
//! definition.
//!
//! Any token that is not otherwise recognized is taken to be a label that may
//! still be defined further down. It only fails once the whole source has been
//! read and the label never appeared, so misspelled mnemonics are reported as
//! unresolved symbols rather than as unknown tokens.

use std::{collections::HashMap, num::ParseIntError};

use crate::{
    coding::normalize_byte,
    op::Opcode,
    operand::{Mode, Register},
};

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';
const BYTE_DIRECTIVE: &str = ".byte";
const IMMEDIATE_PREFIX: char = '#';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    #[error("line {line}: unknown token `{token}`")]
    UnknownToken { line: usize, token: String },

    #[error("line {line}: invalid literal `{token}`: {source}")]
    InvalidLiteral {
        line: usize,
        token: String,
        source: ParseIntError,
    },

    #[error("line {line}: unresolved symbol `{token}`")]
    UnresolvedSymbol { line: usize, token: String },

    #[error("line {line}: duplicate label `{label}`")]
    DuplicateLabel { line: usize, label: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind<'a> {
    Text(&'a str),
    EndOfLine,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind<'a>,
    /// 1-based source line.
    line: usize,
}

/// Splits `source` into whitespace-separated tokens, dropping comments. Every
/// line, including the last, ends with an end-of-line token.
fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = vec![];
    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        let code = line.split(COMMENT_CHAR).next().unwrap_or_default().trim();
        tokens.extend(
            code.split([' ', '\t'])
                .filter(|text| !text.is_empty())
                .map(|text| Token {
                    kind: TokenKind::Text(text),
                    line: line_no,
                }),
        );
        tokens.push(Token {
            kind: TokenKind::EndOfLine,
            line: line_no,
        });
    }
    tokens
}

/// Parses an integer literal with an optional sign and an optional `0x`,
/// `0o` or `0b` radix prefix. Underscores may separate digits. The sign is
/// put back in front of the bare digits so a second sign is rejected as a
/// digit.
fn parse_literal(text: &str) -> Result<i64, ParseIntError> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (radix, digits) = match unsigned.get(..2) {
        Some("0x" | "0X") => (16, &unsigned[2..]),
        Some("0o" | "0O") => (8, &unsigned[2..]),
        Some("0b" | "0B") => (2, &unsigned[2..]),
        _ => (10, unsigned),
    };
    let sign = if negative { '-' } else { '+' };
    let signed = format!("{}{}", sign, digits.replace('_', ""));
    i64::from_str_radix(&signed, radix)
}

/// A placeholder byte waiting for a label definition.
#[derive(Debug)]
struct Fixup<'a> {
    offset: usize,
    symbol: &'a str,
    line: usize,
}

/// State of one assembly run. Bytes are kept wide until the end so literals
/// can be written naturally and normalized once.
#[derive(Debug, Default)]
struct Pass<'a> {
    bytes: Vec<i64>,
    labels: HashMap<String, usize>,
    fixups: Vec<Fixup<'a>>,
}

impl<'a> Pass<'a> {
    fn literal(text: &str, line: usize) -> Result<i64, AssemblyError> {
        parse_literal(text).map_err(|source| AssemblyError::InvalidLiteral {
            line,
            token: text.to_string(),
            source,
        })
    }

    fn emit_operand(&mut self, mode: Mode, value: i64) {
        self.bytes.push(mode.tag() as i64);
        self.bytes.push(value);
    }

    fn define_label(
        &mut self,
        label: &str,
        line: usize,
    ) -> Result<(), AssemblyError> {
        if self.labels.contains_key(label) {
            return Err(AssemblyError::DuplicateLabel {
                line,
                label: label.to_string(),
            });
        }
        log::debug!("label `{}` at {:#04x}", label, self.bytes.len());
        self.labels.insert(label.to_string(), self.bytes.len());
        Ok(())
    }

    /// `[R0]`, `[3]` or `[#12]`.
    fn emit_bracketed(
        &mut self,
        token: &str,
        line: usize,
    ) -> Result<(), AssemblyError> {
        let unknown = || AssemblyError::UnknownToken {
            line,
            token: token.to_string(),
        };
        let inner = token
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(unknown)?;

        if let Some(address) = inner.strip_prefix(IMMEDIATE_PREFIX) {
            let address = Self::literal(address, line)?;
            self.emit_operand(Mode::Ram, address);
        } else if let Some(register) = Register::from_tag_name(inner) {
            self.emit_operand(Mode::Ind, register.tag() as i64);
        } else {
            let index = parse_literal(inner).map_err(|_| unknown())?;
            self.emit_operand(Mode::Ind, index);
        }
        Ok(())
    }

    /// Pass 1: emits bytes left to right, recording labels as they are
    /// defined and a fix-up for every reference to a label not seen yet.
    fn parse(&mut self, tokens: &[Token<'a>]) -> Result<(), AssemblyError> {
        let mut tokens = tokens.iter();
        while let Some(&Token { kind, line }) = tokens.next() {
            let TokenKind::Text(text) = kind else {
                continue;
            };

            if let Some(label) = text.strip_suffix(LABEL_SUFFIX) {
                self.define_label(label, line)?;
            } else if text == BYTE_DIRECTIVE {
                for token in tokens.by_ref() {
                    match token.kind {
                        TokenKind::EndOfLine => break,
                        TokenKind::Text(literal) => {
                            let byte = Self::literal(literal, token.line)?;
                            self.bytes.push(byte);
                        }
                    }
                }
            } else if let Some(opcode) = Opcode::from_mnemonic(text) {
                self.bytes.push(opcode.tag() as i64);
            } else if let Some(register) = Register::from_tag_name(text) {
                self.emit_operand(Mode::Reg, register.tag() as i64);
            } else if let Some(value) = text.strip_prefix(IMMEDIATE_PREFIX) {
                let value = Self::literal(value, line)?;
                self.emit_operand(Mode::Imm, value);
            } else if text.starts_with('[') {
                self.emit_bracketed(text, line)?;
            } else if let Some(&offset) = self.labels.get(text) {
                self.emit_operand(Mode::Imm, offset as i64);
            } else {
                self.emit_operand(Mode::Imm, 0);
                self.fixups.push(Fixup {
                    offset: self.bytes.len() - 1,
                    symbol: text,
                    line,
                });
            }
        }
        Ok(())
    }

    /// Pass 2: patches every fix-up, then normalizes the bytes and makes sure
    /// the image ends in `HALT`.
    fn resolve(
        mut self,
    ) -> Result<(Vec<u8>, HashMap<String, usize>), AssemblyError> {
        for fixup in &self.fixups {
            let Some(&target) = self.labels.get(fixup.symbol) else {
                return Err(AssemblyError::UnresolvedSymbol {
                    line: fixup.line,
                    token: fixup.symbol.to_string(),
                });
            };
            log::debug!(
                "resolved `{}` at {:#04x} to {:#04x}",
                fixup.symbol,
                fixup.offset,
                target
            );
            self.bytes[fixup.offset] = target as i64;
        }

        let mut image: Vec<u8> =
            self.bytes.iter().map(|&byte| normalize_byte(byte)).collect();
        if image.last() != Some(&(Opcode::HALT_TAG as u8)) {
            image.push(Opcode::HALT_TAG as u8);
        }
        Ok((image, self.labels))
    }
}

/// Assembles source text into an image, keeping the label table of the last
/// successful run.
#[derive(Debug, Default)]
pub struct Assembler {
    labels: HashMap<String, usize>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assembles `source`. Nothing is produced unless every symbol resolves.
    pub fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblyError> {
        let tokens = tokenize(source);
        let mut pass = Pass::default();
        pass.parse(&tokens)?;
        let (image, labels) = pass.resolve()?;
        self.labels = labels;
        Ok(image)
    }

    /// Byte offset of `label` in the last assembled image.
    pub fn label(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn labels(&self) -> &HashMap<String, usize> {
        &self.labels
    }
}

/// Assembles `source` into a binary image.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblyError> {
    Assembler::new().assemble(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Image;

    const REG: u8 = Mode::REG_TAG as u8;
    const IMM: u8 = Mode::IMM_TAG as u8;
    const IND: u8 = Mode::IND_TAG as u8;
    const RAM: u8 = Mode::RAM_TAG as u8;
    const HALT: u8 = Opcode::HALT_TAG as u8;

    #[test]
    fn tokenizes_lines_with_comments() {
        let tokens = tokenize("  add R0\t#1 R0 ; comment\n\n; only comment");
        let kinds: Vec<_> = tokens.iter().map(|token| token.kind).collect();
        assert_eq!(
            vec![
                TokenKind::Text("add"),
                TokenKind::Text("R0"),
                TokenKind::Text("#1"),
                TokenKind::Text("R0"),
                TokenKind::EndOfLine,
                TokenKind::EndOfLine,
                TokenKind::EndOfLine,
            ],
            kinds
        );
        assert_eq!(3, tokens.last().map_or(0, |token| token.line));
    }

    #[test]
    fn parses_literals_with_prefixes() {
        assert_eq!(Ok(42), parse_literal("42"));
        assert_eq!(Ok(-1), parse_literal("-1"));
        assert_eq!(Ok(0xff), parse_literal("0xFF"));
        assert_eq!(Ok(8), parse_literal("0o10"));
        assert_eq!(Ok(5), parse_literal("0b101"));
        assert_eq!(Ok(1000), parse_literal("1_000"));
        assert_eq!(Ok(-0x80), parse_literal("-0x80"));
        assert_eq!(Ok(i64::MIN), parse_literal("-0x8000000000000000"));
        assert!(parse_literal("12ab").is_err());
        assert!(parse_literal("").is_err());
        assert!(parse_literal("-").is_err());
        assert!(parse_literal("--5").is_err());
        assert!(parse_literal("+-5").is_err());
        assert!(parse_literal("0x-5").is_err());
        assert!(parse_literal("-0x-8000000000000000").is_err());
    }

    #[test]
    fn encodes_every_operand_syntax() {
        let image = assemble("ADD R1 #0x10 [R2]\nCOPY [#0x80] OUTPUT")
            .expect("valid source");
        assert_eq!(
            vec![
                Opcode::ADD_TAG as u8,
                REG,
                1,
                IMM,
                0x10,
                IND,
                2,
                Opcode::COPY_TAG as u8,
                RAM,
                0x80,
                REG,
                Register::OUTPUT_TAG as u8,
                HALT,
            ],
            image
        );
    }

    #[test]
    fn accepts_numeric_indirect_registers() {
        assert_eq!(
            vec![Opcode::INC_TAG as u8, IND, 3, HALT],
            assemble("inc [3]").expect("valid source")
        );
    }

    #[test]
    fn mnemonics_and_registers_ignore_case() {
        assert_eq!(
            assemble("COPY R0 SP").expect("valid source"),
            assemble("copy r0 sp").expect("valid source")
        );
    }

    #[test]
    fn resolves_forward_references() {
        let mut assembler = Assembler::new();
        let image = assembler
            .assemble("JUMP target\ntarget: HALT")
            .expect("valid source");
        assert_eq!(vec![Opcode::JUMP_TAG as u8, IMM, 3, HALT], image);
        assert_eq!(Some(3), assembler.label("target"));
    }

    #[test]
    fn forward_and_backward_references_agree() {
        let forward =
            assemble("NOP\nJUMP end\nNOP\nend: HALT").expect("valid source");
        let literal = assemble("NOP\nJUMP #5\nNOP\nend: HALT")
            .expect("valid source");
        assert_eq!(literal, forward);

        let backward =
            assemble("start: NOP\nJUMP start").expect("valid source");
        assert_eq!(
            vec![Opcode::NOP_TAG as u8, Opcode::JUMP_TAG as u8, IMM, 0, HALT],
            backward
        );
    }

    #[test]
    fn labels_mark_the_next_byte() {
        let mut assembler = Assembler::new();
        assembler
            .assemble("a: b:\n.byte 1 2\nc:")
            .expect("valid source");
        assert_eq!(Some(0), assembler.label("a"));
        assert_eq!(Some(0), assembler.label("b"));
        assert_eq!(Some(2), assembler.label("c"));
    }

    #[test]
    fn appends_halt_when_missing() {
        assert_eq!(
            vec![Opcode::NOP_TAG as u8, HALT],
            assemble("nop").expect("valid source")
        );
        assert_eq!(vec![HALT], assemble("halt").expect("valid source"));
        assert_eq!(vec![HALT], assemble("").expect("valid source"));
        assert_eq!(vec![HALT], assemble("; nothing").expect("valid source"));
    }

    #[test]
    fn normalizes_byte_literals() {
        assert_eq!(vec![255, HALT], assemble(".byte -1").expect("valid source"));
        assert_eq!(vec![0u8], assemble(".byte 256").expect("valid source"));
        assert_eq!(
            vec![1, 2, 0x7f, HALT],
            assemble(".byte 1 0x2 0b1111111").expect("valid source")
        );
    }

    #[test]
    fn byte_directive_stops_at_end_of_line() {
        assert_eq!(
            vec![7, Opcode::NOP_TAG as u8, HALT],
            assemble(".byte 7\nNOP").expect("valid source")
        );
    }

    #[test]
    fn reports_unresolved_symbols_after_the_whole_source() {
        assert_eq!(
            Err(AssemblyError::UnresolvedSymbol {
                line: 2,
                token: "nowhere".to_string()
            }),
            assemble("NOP\nJUMP nowhere\nNOP")
        );
        // a misspelled mnemonic is an optimistic label reference too
        assert!(matches!(
            assemble("MOVE R0 R1"),
            Err(AssemblyError::UnresolvedSymbol { line: 1, ref token }) if token == "MOVE"
        ));
    }

    #[test]
    fn reports_malformed_brackets_immediately() {
        assert_eq!(
            Err(AssemblyError::UnknownToken {
                line: 1,
                token: "[R0".to_string()
            }),
            assemble("INC [R0")
        );
        assert!(matches!(
            assemble("INC [bogus]"),
            Err(AssemblyError::UnknownToken { line: 1, .. })
        ));
    }

    #[test]
    fn reports_bad_literals() {
        assert!(matches!(
            assemble("COPY #zz R0"),
            Err(AssemblyError::InvalidLiteral { line: 1, ref token, .. }) if token == "zz"
        ));
        assert!(matches!(
            assemble("NOP\n.byte 1 two"),
            Err(AssemblyError::InvalidLiteral { line: 2, .. })
        ));
        assert!(matches!(
            assemble("COPY [#] R0"),
            Err(AssemblyError::InvalidLiteral { .. })
        ));
        for doubly_signed in ["--5", "0x-5", "-0x-8000000000000000"] {
            assert!(
                matches!(
                    assemble(&format!(".byte {}", doubly_signed)),
                    Err(AssemblyError::InvalidLiteral { line: 1, ref token, .. })
                        if token == doubly_signed
                ),
                "{}",
                doubly_signed
            );
        }
        assert!(matches!(
            assemble("COPY #0x-1 R0"),
            Err(AssemblyError::InvalidLiteral { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_labels() {
        assert_eq!(
            Err(AssemblyError::DuplicateLabel {
                line: 3,
                label: "again".to_string()
            }),
            assemble("again:\nNOP\nagain:")
        );
    }

    #[test]
    fn disassembles_back_to_the_source() {
        let source = "COPY INPUT R0\nADD R0 #3 [R1]\nSUB [#40] R2 R3\nPUSH R0\nPOP OUTPUT\nRET\nHALT";
        let image: Image = assemble(source).expect("valid source").into();
        let lines: Vec<String> =
            image.listing().into_iter().map(|(_, text)| text).collect();
        assert_eq!(
            vec![
                "COPY INPUT R0 ",
                "ADD R0 #03 [R1] ",
                "SUB [#28] R2 R3 ",
                "PUSH R0 ",
                "POP OUTPUT ",
                "RET ",
                "HALT ",
            ],
            lines
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn byte_literals_wrap_into_a_byte(value in -100_000i64..100_000) {
                let image = assemble(&format!(".byte {}", value)).expect("valid source");
                prop_assert_eq!(value.rem_euclid(256) as u8, image[0]);
            }

            #[test]
            fn every_image_ends_in_halt(bytes in prop::collection::vec(any::<u8>(), 0..32)) {
                let literals: Vec<String> = bytes.iter().map(u8::to_string).collect();
                let image = assemble(&format!(".byte {}", literals.join(" "))).expect("valid source");
                prop_assert_eq!(Some(&HALT), image.last());
                prop_assert_eq!(&bytes[..], &image[..bytes.len()]);
            }
        }
    }
}
