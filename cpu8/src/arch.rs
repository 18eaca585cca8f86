// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use static_assertions::const_assert;

/// Storage for one machine word. Only the low `word_bits` bits of a stored
/// word are ever set.
pub type Word = u32;

/// Double-width intermediate for products, carries and sign handling.
pub type WideWord = u64;

pub type Address = usize;

pub const MIN_WORD_BITS: u32 = 8;
pub const MAX_WORD_BITS: u32 = 32;
const_assert!(MAX_WORD_BITS <= Word::BITS);
const_assert!(2 * MAX_WORD_BITS <= WideWord::BITS);

pub const DEFAULT_WORD_BITS: u32 = 8;
pub const DEFAULT_RAM_DEPTH: usize = 256;
pub const DEFAULT_CYCLE_BUDGET: u64 = 10_000;

/// Named cells in the register file, `R0` through `TICK`.
pub const REGISTER_COUNT: usize = 15;

pub const MAX_OPERANDS: usize = 3;

/// Words per operand descriptor: `(mode, value)`.
pub const DESCRIPTOR_WORDS: usize = 2;

/// Words spanned by the longest instruction.
pub const INSTRUCTION_WINDOW: usize = instruction_len(MAX_OPERANDS);
const_assert!(INSTRUCTION_WINDOW == 7);

/// Length in words of an instruction declaring `operands` slots.
pub const fn instruction_len(operands: usize) -> usize {
    1 + operands * DESCRIPTOR_WORDS
}
