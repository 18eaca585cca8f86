// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use std::fmt;

use enum_tags::enum_tags;
use num_traits::AsPrimitive;
use static_assertions::const_assert;

use crate::{
    arch::{Word, DESCRIPTOR_WORDS, MAX_OPERANDS, MIN_WORD_BITS, REGISTER_COUNT},
    op::Opcode,
};

/// A named cell of the register file. The discriminant is its index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[enum_tags(public, repr(Word))]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    /// Condition flags, see [`crate::op::Status`].
    Status,
    /// Return address saved by `CALL`.
    Link,
    /// Input port; reading it raises the input-read signal.
    Input,
    /// Output port; cleared every cycle it is not written.
    Output,
    Pc,
    Sp,
    /// Retired cycle count.
    Tick,
}

const_assert!(Register::ALL.len() == REGISTER_COUNT);

impl Register {
    pub const fn index(self) -> usize {
        self.tag() as usize
    }

    /// Canonical name of a register index, or the index in hexadecimal when
    /// it names no register.
    pub fn name_of(index: Word) -> String {
        match Self::from_tag(index) {
            Some(register) => register.tag_name().to_string(),
            None => format!("{:02X}", index),
        }
    }
}

/// Addressing mode tag, the first word of an operand descriptor. Tags are
/// numbered directly after the last register index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[enum_tags(public, repr(Word))]
pub enum Mode {
    /// `R0`: the register itself.
    Reg = 15,
    /// `#12`: the value itself.
    Imm,
    /// `[R0]`: memory at the address held by the register.
    Ind,
    /// `[#12]`: memory at the value.
    Ram,
}

const_assert!(Mode::REG_TAG as usize == REGISTER_COUNT);
const_assert!(Mode::RAM_TAG < 1 << MIN_WORD_BITS);

/// A decoded operand descriptor. Register indices are kept raw; whether they
/// name a register is checked on access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Reg(Word),
    Imm(Word),
    Ind(Word),
    Ram(Word),
}

impl Operand {
    /// Decodes a `(mode, value)` descriptor, if `mode` is a mode tag.
    pub const fn decode(mode: Word, value: Word) -> Option<Self> {
        match Mode::from_tag(mode) {
            Some(Mode::Reg) => Some(Self::Reg(value)),
            Some(Mode::Imm) => Some(Self::Imm(value)),
            Some(Mode::Ind) => Some(Self::Ind(value)),
            Some(Mode::Ram) => Some(Self::Ram(value)),
            None => None,
        }
    }

    pub const fn encode(self) -> [Word; DESCRIPTOR_WORDS] {
        [self.mode().tag(), self.value()]
    }

    pub const fn mode(self) -> Mode {
        match self {
            Self::Reg(_) => Mode::Reg,
            Self::Imm(_) => Mode::Imm,
            Self::Ind(_) => Mode::Ind,
            Self::Ram(_) => Mode::Ram,
        }
    }

    pub const fn value(self) -> Word {
        match self {
            Self::Reg(value)
            | Self::Imm(value)
            | Self::Ind(value)
            | Self::Ram(value) => value,
        }
    }
}

impl From<Register> for Operand {
    fn from(register: Register) -> Self {
        Self::Reg(register.tag())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Reg(index) => write!(f, "{}", Register::name_of(index)),
            Self::Imm(value) => write!(f, "#{:02X}", value),
            Self::Ind(index) => write!(f, "[{}]", Register::name_of(index)),
            Self::Ram(address) => write!(f, "[#{:02X}]", address),
        }
    }
}

/// An opcode with its declared operand slots. A slot whose descriptor carries
/// no valid mode tag is `None`; slots past the opcode's operand count are
/// always `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: [Option<Operand>; MAX_OPERANDS],
}

impl Instruction {
    /// Decodes the instruction at the start of `window`. Words missing from
    /// the end of `window` read as zero. Returns `None` for an undefined
    /// opcode.
    pub fn decode<W: AsPrimitive<Word>>(window: &[W]) -> Option<Self> {
        let word = |index: usize| window.get(index).map_or(0, |word| word.as_());

        let opcode = Opcode::decode(word(0))?;
        let mut operands = [None; MAX_OPERANDS];
        for (slot, operand) in
            operands.iter_mut().take(opcode.operand_count()).enumerate()
        {
            let offset = 1 + slot * DESCRIPTOR_WORDS;
            *operand = Operand::decode(word(offset), word(offset + 1));
        }

        Some(Self { opcode, operands })
    }

    /// Appends the encoding of this instruction to `stream`. Undecodable
    /// slots encode as a zero descriptor.
    pub fn encode_into(&self, stream: &mut Vec<Word>) {
        stream.push(self.opcode.tag());
        for operand in self.operands.iter().take(self.opcode.operand_count()) {
            match operand {
                Some(operand) => stream.extend(operand.encode()),
                None => stream.extend([0; DESCRIPTOR_WORDS]),
            }
        }
    }

    pub const fn encoded_len(&self) -> usize {
        self.opcode.encoded_len()
    }
}

/// Renders as `"<OPNAME> <operand> ... "`: every declared operand with a valid
/// mode is followed by one space.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.opcode.mnemonic())?;
        for operand in self.operands.iter().flatten() {
            write!(f, "{} ", operand)?;
        }
        Ok(())
    }
}

/// Renders the instruction at the start of `window` for tracing. An undefined
/// opcode renders as its value in hexadecimal with no operands.
pub fn disassemble<W: AsPrimitive<Word>>(window: &[W]) -> String {
    match Instruction::decode(window) {
        Some(instruction) => instruction.to_string(),
        None => {
            let raw: Word = window.first().map_or(0, |word| word.as_());
            format!("{:02X} ", raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_registers_then_modes() {
        assert_eq!(0, Register::R0_TAG);
        assert_eq!(8, Register::STATUS_TAG);
        assert_eq!(10, Register::INPUT_TAG);
        assert_eq!(12, Register::PC_TAG);
        assert_eq!(14, Register::TICK_TAG);
        assert_eq!(15, Mode::REG_TAG);
        assert_eq!(16, Mode::IMM_TAG);
        assert_eq!(17, Mode::IND_TAG);
        assert_eq!(18, Mode::RAM_TAG);
    }

    #[test]
    fn names_registers() {
        assert_eq!(Some(Register::Sp), Register::from_tag_name("sp"));
        assert_eq!(Some(Register::Output), Register::from_tag_name("Output"));
        assert_eq!(None, Register::from_tag_name("R8"));
        assert_eq!("LINK", Register::name_of(9));
        assert_eq!("13", Register::name_of(0x13));
    }

    #[test]
    fn decodes_only_mode_tags() {
        assert_eq!(Some(Operand::Ind(3)), Operand::decode(Mode::IND_TAG, 3));
        assert_eq!(None, Operand::decode(Register::TICK_TAG, 3));
        assert_eq!(None, Operand::decode(19, 3));
        assert_eq!([17, 3], Operand::Ind(3).encode());
    }

    #[test]
    fn disassembles_every_mode() {
        let window: [u8; 7] = [
            Opcode::ADD_TAG as u8,
            Mode::REG_TAG as u8,
            Register::R1_TAG as u8,
            Mode::IMM_TAG as u8,
            0x2a,
            Mode::IND_TAG as u8,
            Register::SP_TAG as u8,
        ];
        assert_eq!("ADD R1 #2A [SP] ", disassemble(&window));

        let window: [u8; 5] = [
            Opcode::COPY_TAG as u8,
            Mode::RAM_TAG as u8,
            0x80,
            Mode::REG_TAG as u8,
            Register::OUTPUT_TAG as u8,
        ];
        assert_eq!("COPY [#80] OUTPUT ", disassemble(&window));
    }

    #[test]
    fn ignores_descriptors_past_the_operand_count() {
        let window: [u8; 7] =
            [Opcode::INC_TAG as u8, 15, 0, 15, 1, 15, 2];
        assert_eq!("INC R0 ", disassemble(&window));
        assert_eq!("HALT ", disassemble(&window[..0]));
        assert_eq!("RET ", disassemble(&[Opcode::RET_TAG as u8]));
    }

    #[test]
    fn disassembles_undefined_opcodes_as_hex() {
        assert_eq!("C8 ", disassemble(&[200u32, 15, 0]));
    }

    #[test]
    fn skips_operands_with_invalid_modes() {
        let window: [u8; 5] = [Opcode::COPY_TAG as u8, 3, 0, 15, 1];
        assert_eq!("COPY R1 ", disassemble(&window));
    }

    #[test]
    fn reencodes_decoded_instructions() {
        let window: [Word; 5] = [Opcode::NOT_TAG, 16, 0x0f, 15, 2];
        let instruction = Instruction::decode(&window).expect("NOT is defined");
        let mut stream = vec![];
        instruction.encode_into(&mut stream);
        assert_eq!(window.to_vec(), stream);
        assert_eq!(5, instruction.encoded_len());
    }
}
