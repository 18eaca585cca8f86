// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use crate::arch::{WideWord, Word};

/// Mask with the low `bits` bits set.
pub const fn bitmask(bits: u32) -> WideWord {
    if bits >= WideWord::BITS {
        WideWord::MAX
    } else {
        ((1 as WideWord) << bits) - 1
    }
}

/// Reduces an assembler value into a byte: negative values wrap around 256,
/// larger ones keep their low 8 bits.
pub fn normalize_byte(value: i64) -> u8 {
    value.rem_euclid(1 << u8::BITS) as u8
}

/// The result of an ALU operation together with the conditions it raised.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Arith {
    pub value: Word,
    pub carry: bool,
    pub overflow: bool,
}

impl Arith {
    pub const fn of(value: Word) -> Self {
        Self {
            value,
            carry: false,
            overflow: false,
        }
    }
}

/// Word width of a machine. Every operation takes and returns words already
/// truncated to this width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Width {
    bits: u32,
}

impl Width {
    /// `bits` must be non-zero; [`crate::config::MachineConfig::validate`]
    /// guarantees it for machine widths.
    pub const fn new(bits: u32) -> Self {
        Self { bits }
    }

    pub const fn bits(self) -> u32 {
        self.bits
    }

    pub const fn mask(self) -> WideWord {
        bitmask(self.bits)
    }

    pub const fn truncate(self, value: WideWord) -> Word {
        (value & self.mask()) as Word
    }

    pub const fn is_negative(self, word: Word) -> bool {
        (word as WideWord >> (self.bits - 1)) & 1 == 1
    }

    /// Reads `word` as a two's complement number of this width.
    pub fn to_signed(self, word: Word) -> i64 {
        sign_extend_to::<WideWord, WideWord>(word as WideWord, self.bits as usize)
            as i64
    }

    pub fn add(self, a: Word, b: Word) -> Arith {
        let sum = a as WideWord + b as WideWord;
        let value = self.truncate(sum);
        Arith {
            value,
            carry: sum > self.mask(),
            overflow: self.is_negative(a) == self.is_negative(b)
                && self.is_negative(value) != self.is_negative(a),
        }
    }

    pub fn sub(self, a: Word, b: Word) -> Arith {
        let value = self.truncate((a as WideWord).wrapping_sub(b as WideWord));
        Arith {
            value,
            carry: b > a,
            overflow: self.is_negative(a) != self.is_negative(b)
                && self.is_negative(value) != self.is_negative(a),
        }
    }

    pub fn neg(self, a: Word) -> Arith {
        self.sub(0, a)
    }

    pub fn abs(self, a: Word) -> Arith {
        if self.is_negative(a) {
            self.neg(a)
        } else {
            Arith::of(a)
        }
    }

    pub fn mul_low(self, a: Word, b: Word) -> Arith {
        Arith::of(self.truncate(a as WideWord * b as WideWord))
    }

    pub fn mul_high(self, a: Word, b: Word) -> Arith {
        Arith::of(self.truncate((a as WideWord * b as WideWord) >> self.bits))
    }

    /// Unsigned division; a zero divisor yields zero.
    pub fn div(self, a: Word, b: Word) -> Arith {
        Arith::of(a.checked_div(b).unwrap_or(0))
    }

    /// Unsigned remainder; a zero divisor yields zero.
    pub fn rem(self, a: Word, b: Word) -> Arith {
        Arith::of(a.checked_rem(b).unwrap_or(0))
    }

    pub fn shl(self, a: Word, amount: Word) -> Arith {
        if amount >= self.bits {
            Arith::of(0)
        } else {
            Arith::of(self.truncate((a as WideWord) << amount))
        }
    }

    pub fn shr(self, a: Word, amount: Word) -> Arith {
        if amount >= self.bits {
            Arith::of(0)
        } else {
            Arith::of(a >> amount)
        }
    }

    /// Shifts in copies of the sign bit.
    pub fn ashr(self, a: Word, amount: Word) -> Arith {
        let shift = amount.min(self.bits - 1);
        Arith::of(self.truncate((self.to_signed(a) >> shift) as WideWord))
    }
}

/// Sign-extends the low `bits` bits of `value` to the full width of `Out`.
pub fn sign_extend_to<
    In: num_traits::Unsigned + num_traits::PrimInt + num_traits::AsPrimitive<Out>,
    Out: 'static
        + num_traits::Unsigned
        + num_traits::PrimInt
        + num_traits::WrappingShl,
>(
    value: In,
    bits: usize,
) -> Out {
    let sign_bit = In::one() << (bits - 1);
    if value & sign_bit != In::zero() {
        let extension = Out::max_value().wrapping_shl(bits as u32);
        value.as_() | extension
    } else {
        value.as_()
    }
}
