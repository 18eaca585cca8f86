// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use crate::{
    arch::{
        DEFAULT_CYCLE_BUDGET, DEFAULT_RAM_DEPTH, DEFAULT_WORD_BITS,
        MAX_WORD_BITS, MIN_WORD_BITS,
    },
    coding::Width,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported word width of {0} bits")]
    UnsupportedWordBits(u32),

    #[error("RAM depth must be at least one word")]
    EmptyRam,

    #[error("RAM depth {depth} is not addressable by a {word_bits}-bit word")]
    RamNotAddressable { depth: usize, word_bits: u32 },
}

/// Sizing of a machine and the bound on how long [`crate::vm::Machine::run`]
/// may go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    pub word_bits: u32,
    pub ram_depth: usize,
    pub cycle_budget: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            word_bits: DEFAULT_WORD_BITS,
            ram_depth: DEFAULT_RAM_DEPTH,
            cycle_budget: DEFAULT_CYCLE_BUDGET,
        }
    }
}

impl MachineConfig {
    pub fn with_word_bits(mut self, word_bits: u32) -> Self {
        self.word_bits = word_bits;
        self
    }

    pub fn with_ram_depth(mut self, ram_depth: usize) -> Self {
        self.ram_depth = ram_depth;
        self
    }

    pub fn with_cycle_budget(mut self, cycle_budget: u64) -> Self {
        self.cycle_budget = cycle_budget;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_WORD_BITS..=MAX_WORD_BITS).contains(&self.word_bits) {
            return Err(ConfigError::UnsupportedWordBits(self.word_bits));
        }
        if self.ram_depth == 0 {
            return Err(ConfigError::EmptyRam);
        }
        // every address, including the initial SP, has to fit in a word
        if self.ram_depth as u128 > 1u128 << self.word_bits {
            return Err(ConfigError::RamNotAddressable {
                depth: self.ram_depth,
                word_bits: self.word_bits,
            });
        }
        Ok(())
    }

    pub fn width(&self) -> Width {
        Width::new(self.word_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_the_reference_sizing() {
        let config = MachineConfig::default();
        assert_eq!(8, config.word_bits);
        assert_eq!(256, config.ram_depth);
        assert_eq!(Ok(()), config.validate());
    }

    #[test]
    fn rejects_unsupported_widths() {
        assert_eq!(
            Err(ConfigError::UnsupportedWordBits(4)),
            MachineConfig::default().with_word_bits(4).validate()
        );
        assert_eq!(
            Err(ConfigError::UnsupportedWordBits(33)),
            MachineConfig::default().with_word_bits(33).validate()
        );
        assert_eq!(
            Ok(()),
            MachineConfig::default().with_word_bits(32).validate()
        );
    }

    #[test]
    fn rejects_unaddressable_ram() {
        assert_eq!(
            Err(ConfigError::EmptyRam),
            MachineConfig::default().with_ram_depth(0).validate()
        );
        assert_eq!(
            Err(ConfigError::RamNotAddressable {
                depth: 257,
                word_bits: 8
            }),
            MachineConfig::default().with_ram_depth(257).validate()
        );
        assert_eq!(
            Ok(()),
            MachineConfig::default()
                .with_word_bits(16)
                .with_ram_depth(4096)
                .validate()
        );
    }
}
