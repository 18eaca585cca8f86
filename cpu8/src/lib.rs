// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

//! An 8-bit register machine. [`asm`] turns mnemonic source into an
//! [`program::Image`], and [`vm::Machine`] runs images one instruction per
//! cycle.

#![forbid(unsafe_code)]

pub mod arch;
pub mod asm;
pub mod coding;
pub mod config;
pub mod op;
pub mod operand;
pub mod program;
pub mod vm;
