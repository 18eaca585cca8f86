// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use crate::{
    arch::{Address, Word, INSTRUCTION_WINDOW},
    config::ConfigError,
    op::Opcode,
    operand::disassemble,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("image of {len} words does not fit in {depth} words of RAM")]
    ImageTooLarge { len: usize, depth: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A binary image: a flat byte sequence loaded verbatim at address 0, one
/// byte per word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    bytes: Vec<u8>,
}

impl From<Vec<u8>> for Image {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl From<&[u8]> for Image {
    fn from(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

impl Image {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The image widened to machine words.
    pub fn words(&self) -> impl Iterator<Item = Word> + '_ {
        self.bytes.iter().map(|&byte| byte as Word)
    }

    pub fn check_fits(&self, ram_depth: usize) -> Result<(), LoadError> {
        if self.len() > ram_depth {
            Err(LoadError::ImageTooLarge {
                len: self.len(),
                depth: ram_depth,
            })
        } else {
            Ok(())
        }
    }

    /// Walks the image one instruction at a time. Bytes that are not an
    /// opcode are listed on their own.
    pub fn listing(&self) -> Vec<(Address, String)> {
        let mut listing = vec![];
        let mut offset = 0;
        while offset < self.bytes.len() {
            let end = (offset + INSTRUCTION_WINDOW).min(self.bytes.len());
            let window = &self.bytes[offset..end];
            listing.push((offset, disassemble(window)));
            offset += Opcode::decode(window[0] as Word)
                .map_or(1, Opcode::encoded_len);
        }
        listing
    }
}
