// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use bitflags::bitflags;
use enum_tags::enum_tags;
use static_assertions::const_assert;

use crate::arch::{instruction_len, Word, MIN_WORD_BITS};

bitflags! {
    /// Condition flags held in the low bits of the `STATUS` register.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Status: Word {
        /// Unsigned carry out of an addition, or borrow of a subtraction.
        const CARRY = 1 << 0;
        /// Signed overflow.
        const OVERFLOW = 1 << 1;
        /// Most significant bit of the result.
        const SIGN = 1 << 2;
        /// Result is zero.
        const ZERO = 1 << 3;
    }
}

impl Status {
    /// Flags updated by operations that only produce a value.
    pub const RESULT: Self = Self::SIGN.union(Self::ZERO);
    /// Flags updated by additions and subtractions.
    pub const ARITHMETIC: Self = Self::all();
}

/// A machine operation. The discriminant is the opcode word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[enum_tags(public, repr(Word))]
pub enum Opcode {
    /// `HALT` stops the machine.
    Halt,
    /// `NOP` has no effect.
    Nop,
    /// `AND a b d` stores `a & b` in `d`.
    And,
    /// `OR a b d` stores `a | b` in `d`.
    Or,
    /// `XOR a b d` stores `a ^ b` in `d`.
    Xor,
    /// `NOT a d` stores `!a` in `d`.
    Not,
    /// `NEG a d` stores `-a` in `d`.
    Neg,
    /// `ABS a d` stores `|a|` in `d`, reading `a` as signed.
    Abs,
    /// `ADD a b d` stores `a + b` in `d`.
    Add,
    /// `SUB a b d` stores `a - b` in `d`.
    Sub,
    /// `MULL a b d` stores the low word of `a * b` in `d`.
    Mull,
    /// `MULH a b d` stores the high word of `a * b` in `d`.
    Mulh,
    /// `DIV a b d` stores `a / b` in `d`.
    Div,
    /// `MOD a b d` stores `a % b` in `d`.
    Mod,
    /// `CMP a b` sets the flags of `a - b` and stores nothing.
    Cmp,
    /// `INC a` adds one to `a`.
    Inc,
    /// `DEC a` subtracts one from `a`.
    Dec,
    /// `MIN a b d` stores the smaller of `a` and `b` in `d`.
    Min,
    /// `MAX a b d` stores the larger of `a` and `b` in `d`.
    Max,
    /// `ASHR a b d` stores `a >> b` in `d`, shifting in the sign bit.
    Ashr,
    /// `SHR a b d` stores `a >> b` in `d`, shifting in zeros.
    Shr,
    /// `SHL a b d` stores `a << b` in `d`.
    Shl,
    /// `COPY a d` stores `a` in `d`.
    Copy,
    /// `JUMP a` continues at `a`.
    Jump,
    Jc,
    Jnc,
    Jo,
    Jno,
    Js,
    Jns,
    Jz,
    Jnz,
    /// `CALL a` saves the address of the next instruction in `LINK` and
    /// continues at `a`.
    Call,
    /// `RET` continues at `LINK`.
    Ret,
    /// `PUSH a` stores `a` at `SP` and decrements `SP`.
    Push,
    /// `POP d` increments `SP` and stores the word there in `d`.
    Pop,
}

// every opcode has to fit in the narrowest word
const_assert!(Opcode::POP_TAG < 1 << MIN_WORD_BITS);

/// Static shape of an opcode: how many operand descriptors follow it, which
/// of them receives the result, and which flags the result updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    pub operands: usize,
    pub result: Option<usize>,
    pub flags: Status,
}

macro_rules! signatures {
    ($($($opcode:ident)|+ => ($operands:literal, $result:tt, $flags:expr);)*) => {
        impl Opcode {
            pub const fn signature(self) -> Signature {
                match self {
                    $(
                        $(Self::$opcode)|+ => Signature {
                            operands: $operands,
                            result: signatures!(@slot $result),
                            flags: $flags,
                        },
                    )*
                }
            }
        }
    };
    (@slot -) => { None };
    (@slot $slot:literal) => { Some($slot) };
}

signatures! {
    Halt | Nop | Ret => (0, -, Status::empty());
    And | Or | Xor => (3, 2, Status::RESULT);
    Not | Neg | Abs => (2, 1, Status::RESULT);
    Add | Sub => (3, 2, Status::ARITHMETIC);
    Mull | Mulh | Div | Mod => (3, 2, Status::RESULT);
    Cmp => (2, -, Status::ARITHMETIC);
    Inc | Dec => (1, 0, Status::ARITHMETIC);
    Min | Max | Ashr | Shr | Shl => (3, 2, Status::RESULT);
    Copy => (2, 1, Status::RESULT);
    Jump | Jc | Jnc | Jo | Jno | Js | Jns | Jz | Jnz => (1, -, Status::empty());
    Call | Push => (1, -, Status::empty());
    Pop => (1, 0, Status::empty());
}

impl Opcode {
    /// Decodes an opcode word, if it names an operation.
    pub const fn decode(word: Word) -> Option<Self> {
        Self::from_tag(word)
    }

    /// Looks up a mnemonic, ignoring ASCII case.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        Self::from_tag_name(mnemonic)
    }

    pub const fn mnemonic(&self) -> &'static str {
        self.tag_name()
    }

    pub const fn operand_count(self) -> usize {
        self.signature().operands
    }

    pub const fn result_slot(self) -> Option<usize> {
        self.signature().result
    }

    pub const fn flags(self) -> Status {
        self.signature().flags
    }

    /// Length of the encoded instruction in words.
    pub const fn encoded_len(self) -> usize {
        instruction_len(self.operand_count())
    }

    /// For conditional jumps, the flag tested and the value that takes the
    /// jump.
    pub const fn condition(self) -> Option<(Status, bool)> {
        match self {
            Self::Jc => Some((Status::CARRY, true)),
            Self::Jnc => Some((Status::CARRY, false)),
            Self::Jo => Some((Status::OVERFLOW, true)),
            Self::Jno => Some((Status::OVERFLOW, false)),
            Self::Js => Some((Status::SIGN, true)),
            Self::Jns => Some((Status::SIGN, false)),
            Self::Jz => Some((Status::ZERO, true)),
            Self::Jnz => Some((Status::ZERO, false)),
            _ => None,
        }
    }
}

/// Canonical name of an opcode word, or the word in hexadecimal when it names
/// no operation.
pub fn opcode_name(word: Word) -> String {
    match Opcode::decode(word) {
        Some(opcode) => opcode.mnemonic().to_string(),
        None => format!("{:02X}", word),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_opcodes_in_table_order() {
        assert_eq!(0, Opcode::HALT_TAG);
        assert_eq!(1, Opcode::NOP_TAG);
        assert_eq!(8, Opcode::ADD_TAG);
        assert_eq!(22, Opcode::COPY_TAG);
        assert_eq!(23, Opcode::JUMP_TAG);
        assert_eq!(35, Opcode::POP_TAG);
        assert_eq!(36, Opcode::ALL.len());
    }

    #[test]
    fn decodes_every_tag_back() {
        for opcode in Opcode::ALL {
            assert_eq!(Some(opcode), Opcode::decode(opcode.tag()));
        }
        assert_eq!(None, Opcode::decode(36));
        assert_eq!(None, Opcode::decode(0xff));
    }

    #[test]
    fn looks_up_mnemonics_ignoring_case() {
        assert_eq!(Some(Opcode::Mulh), Opcode::from_mnemonic("mulh"));
        assert_eq!(Some(Opcode::Jnz), Opcode::from_mnemonic("JnZ"));
        assert_eq!(Some(Opcode::Copy), Opcode::from_mnemonic("COPY"));
        assert_eq!(None, Opcode::from_mnemonic("MOV"));
        assert_eq!("ASHR", Opcode::Ashr.mnemonic());
    }

    #[test]
    fn signatures_fix_instruction_lengths() {
        assert_eq!(1, Opcode::Halt.encoded_len());
        assert_eq!(7, Opcode::Add.encoded_len());
        assert_eq!(5, Opcode::Copy.encoded_len());
        assert_eq!(3, Opcode::Jump.encoded_len());
        assert_eq!(Some(2), Opcode::Xor.result_slot());
        assert_eq!(Some(0), Opcode::Pop.result_slot());
        assert_eq!(None, Opcode::Cmp.result_slot());
        assert_eq!(Status::all(), Opcode::Inc.flags());
        assert_eq!(Status::SIGN | Status::ZERO, Opcode::Shl.flags());
    }

    #[test]
    fn names_unknown_opcodes_in_hex() {
        assert_eq!("SUB", opcode_name(9));
        assert_eq!("2A", opcode_name(0x2a));
    }
}
