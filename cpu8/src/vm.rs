// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use std::{collections::VecDeque, fmt};

use bitflags::bitflags;

use crate::{
    arch::{
        Address, WideWord, Word, INSTRUCTION_WINDOW, MAX_OPERANDS,
        REGISTER_COUNT,
    },
    coding::{Arith, Width},
    config::MachineConfig,
    op::{Opcode, Status},
    operand::{disassemble, Instruction, Operand, Register},
    program::{Image, LoadError},
};

bitflags! {
    /// Handshake lines between the machine and whatever drives it. They
    /// describe the last completed cycle only.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Signals: u8 {
        const HALT = 1 << 0;
        /// The opcode, or the operand receiving the result, could not be
        /// decoded.
        const ILLEGAL_OPCODE = 1 << 1;
        /// `INPUT` was consumed; a fresh value is due before the next cycle.
        const INPUT_READ = 1 << 2;
        /// `OUTPUT` holds a value for this cycle only.
        const OUTPUT_WRITTEN = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Running,
    /// Stopped by `HALT`.
    Halted,
    /// Stopped by an illegal opcode or operand.
    Faulted,
}

/// The two byte ports of a machine.
pub trait IoPort {
    /// Supplies the next value of `INPUT`.
    fn read_input(&mut self) -> Word;

    /// Receives a value written to `OUTPUT`.
    fn write_output(&mut self, value: Word);
}

/// Serves inputs from a queue and collects outputs. An exhausted queue
/// supplies zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueuePort {
    inputs: VecDeque<Word>,
    outputs: Vec<Word>,
}

impl QueuePort {
    pub fn new(inputs: impl IntoIterator<Item = Word>) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
            outputs: vec![],
        }
    }

    pub fn outputs(&self) -> &[Word] {
        &self.outputs
    }

    pub fn pending_inputs(&self) -> usize {
        self.inputs.len()
    }
}

impl IoPort for QueuePort {
    fn read_input(&mut self) -> Word {
        self.inputs.pop_front().unwrap_or(0)
    }

    fn write_output(&mut self, value: Word) {
        self.outputs.push(value);
    }
}

/// Where a result is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Register(Register),
    Memory(Address),
}

/// Everything one cycle changes, computed from the state at the start of the
/// cycle. [`Machine::commit`] applies the fields in declaration order, so a
/// later field wins over an earlier one touching the same register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Effects {
    /// Signals raised this cycle. `OUTPUT_WRITTEN` is added on commit.
    pub signals: Signals,
    /// `None` leaves `PC` where it is.
    pub pc: Option<Word>,
    pub link: Option<Word>,
    pub sp: Option<Word>,
    /// Memory store made by `PUSH`.
    pub store: Option<(Address, Word)>,
    pub write_back: Option<(Target, Word)>,
    /// Flags this cycle updates.
    pub flags: Status,
    /// New values of the updated flags; bits outside `flags` are ignored.
    pub status: Status,
}

impl Effects {
    fn advance(pc: Word, signals: Signals) -> Self {
        Self {
            signals,
            pc: Some(pc),
            link: None,
            sp: None,
            store: None,
            write_back: None,
            flags: Status::empty(),
            status: Status::empty(),
        }
    }

    /// A cycle that only raises the fault and counts the tick.
    fn fault(signals: Signals) -> Self {
        let signals = signals | Signals::HALT | Signals::ILLEGAL_OPCODE;
        Self {
            pc: None,
            ..Self::advance(0, signals)
        }
    }
}

/// One retired cycle as seen by [`Machine::run`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    /// `TICK` before the cycle.
    pub tick: Word,
    /// `PC` before the cycle.
    pub pc: Word,
    pub instruction: String,
    /// Register file after the cycle.
    pub registers: [Word; REGISTER_COUNT],
    /// Signals after the cycle.
    pub signals: Signals,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>6} {:02X}  {:<24}",
            self.tick, self.pc, self.instruction
        )?;
        for register in Register::ALL {
            write!(
                f,
                " {}={:02X}",
                register.tag_name(),
                self.registers[register.index()]
            )?;
        }
        write!(f, " {:?}", self.signals)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Halted,
    Faulted,
    BudgetExhausted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trace {
    pub entries: Vec<TraceEntry>,
    pub stop: StopReason,
}

/// A register file and a RAM, stepped one instruction per cycle.
#[derive(Debug, Clone)]
pub struct Machine {
    config: MachineConfig,
    width: Width,
    registers: [Word; REGISTER_COUNT],
    memory: Vec<Word>,
    signals: Signals,
}

impl Machine {
    /// Loads `image` at address 0 of an otherwise zeroed RAM. `SP` starts at
    /// the last address, and `INPUT_READ` is raised so that the first input is
    /// supplied before the first cycle.
    pub fn new(
        config: MachineConfig,
        image: impl Into<Image>,
    ) -> Result<Self, LoadError> {
        config.validate()?;
        let image = image.into();
        image.check_fits(config.ram_depth)?;

        let mut memory = vec![0; config.ram_depth];
        for (cell, word) in memory.iter_mut().zip(image.words()) {
            *cell = word;
        }

        let mut registers = [0; REGISTER_COUNT];
        registers[Register::Sp.index()] = (config.ram_depth - 1) as Word;

        Ok(Self {
            config,
            width: config.width(),
            registers,
            memory,
            signals: Signals::INPUT_READ,
        })
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn register(&self, register: Register) -> Word {
        self.registers[register.index()]
    }

    /// Stores `value`, truncated to the word width.
    pub fn set_register(&mut self, register: Register, value: Word) {
        self.registers[register.index()] =
            self.width.truncate(value as WideWord);
    }

    pub fn registers(&self) -> &[Word; REGISTER_COUNT] {
        &self.registers
    }

    pub fn memory(&self) -> &[Word] {
        &self.memory
    }

    pub fn signals(&self) -> Signals {
        self.signals
    }

    pub fn status(&self) -> Status {
        Status::from_bits_retain(self.register(Register::Status))
    }

    pub fn state(&self) -> State {
        if self.signals.contains(Signals::ILLEGAL_OPCODE) {
            State::Faulted
        } else if self.signals.contains(Signals::HALT) {
            State::Halted
        } else {
            State::Running
        }
    }

    pub fn is_halted(&self) -> bool {
        self.state() != State::Running
    }

    /// Decodes the instruction at `pc`, wrapping around the end of RAM.
    pub fn decode_at(&self, pc: Address) -> Option<Instruction> {
        Instruction::decode(&self.window(pc))
    }

    pub fn disassemble_at(&self, pc: Address) -> String {
        disassemble(&self.window(pc))
    }

    fn window(&self, pc: Address) -> [Word; INSTRUCTION_WINDOW] {
        let depth = self.memory.len();
        std::array::from_fn(|offset| self.memory[(pc % depth + offset) % depth])
    }

    /// Memory addresses wrap modulo the RAM depth.
    fn address(&self, word: Word) -> Address {
        word as Address % self.memory.len()
    }

    fn read(&self, operand: Operand, signals: &mut Signals) -> Word {
        match operand {
            Operand::Imm(value) => value,
            Operand::Reg(index) => match Register::from_tag(index) {
                Some(register) => {
                    if register == Register::Input {
                        *signals |= Signals::INPUT_READ;
                    }
                    self.register(register)
                }
                None => 0,
            },
            Operand::Ind(_) | Operand::Ram(_) => match self.target(operand) {
                Some(Target::Memory(address)) => self.memory[address],
                _ => 0,
            },
        }
    }

    /// Resolves a destination. Immediates and register indices past `TICK`
    /// name none.
    fn target(&self, operand: Operand) -> Option<Target> {
        match operand {
            Operand::Imm(_) => None,
            Operand::Reg(index) => {
                Register::from_tag(index).map(Target::Register)
            }
            Operand::Ind(index) => Register::from_tag(index).map(|register| {
                Target::Memory(self.address(self.register(register)))
            }),
            Operand::Ram(address) => Some(Target::Memory(self.address(address))),
        }
    }

    /// Computes the effects of the instruction at `PC` without changing
    /// anything.
    pub fn execute(&self) -> Effects {
        let pc = self.register(Register::Pc);
        let Some(instruction) = self.decode_at(self.address(pc)) else {
            return Effects::fault(Signals::empty());
        };

        let mut signals = Signals::empty();
        let mut values = [0; MAX_OPERANDS];
        // undeclared slots are never read, so they cannot raise INPUT_READ
        for (value, operand) in values.iter_mut().zip(instruction.operands) {
            if let Some(operand) = operand {
                *value = self.read(operand, &mut signals);
            }
        }
        let [a, b, _] = values;

        let width = self.width;
        let opcode = instruction.opcode;
        let next =
            width.truncate(pc as WideWord + opcode.encoded_len() as WideWord);
        let mut effects = Effects::advance(next, signals);

        let result = match opcode {
            Opcode::Halt => {
                effects.signals |= Signals::HALT;
                effects.pc = None;
                None
            }
            Opcode::Nop => None,
            Opcode::And => Some(Arith::of(a & b)),
            Opcode::Or => Some(Arith::of(a | b)),
            Opcode::Xor => Some(Arith::of(a ^ b)),
            Opcode::Not => Some(Arith::of(width.truncate(!(a as WideWord)))),
            Opcode::Neg => Some(width.neg(a)),
            Opcode::Abs => Some(width.abs(a)),
            Opcode::Add => Some(width.add(a, b)),
            Opcode::Sub | Opcode::Cmp => Some(width.sub(a, b)),
            Opcode::Mull => Some(width.mul_low(a, b)),
            Opcode::Mulh => Some(width.mul_high(a, b)),
            Opcode::Div => Some(width.div(a, b)),
            Opcode::Mod => Some(width.rem(a, b)),
            Opcode::Inc => Some(width.add(a, 1)),
            Opcode::Dec => Some(width.sub(a, 1)),
            Opcode::Min => Some(Arith::of(a.min(b))),
            Opcode::Max => Some(Arith::of(a.max(b))),
            Opcode::Ashr => Some(width.ashr(a, b)),
            Opcode::Shr => Some(width.shr(a, b)),
            Opcode::Shl => Some(width.shl(a, b)),
            Opcode::Copy => Some(Arith::of(a)),
            Opcode::Jump => {
                effects.pc = Some(a);
                None
            }
            Opcode::Jc
            | Opcode::Jnc
            | Opcode::Jo
            | Opcode::Jno
            | Opcode::Js
            | Opcode::Jns
            | Opcode::Jz
            | Opcode::Jnz => {
                if let Some((flag, taken)) = opcode.condition() {
                    if self.status().contains(flag) == taken {
                        effects.pc = Some(a);
                    }
                }
                None
            }
            Opcode::Call => {
                effects.link = Some(next);
                effects.pc = Some(a);
                None
            }
            Opcode::Ret => {
                effects.pc = Some(self.register(Register::Link));
                None
            }
            Opcode::Push => {
                let sp = self.register(Register::Sp);
                effects.store = Some((self.address(sp), a));
                effects.sp = Some(width.sub(sp, 1).value);
                None
            }
            Opcode::Pop => {
                let sp = width.add(self.register(Register::Sp), 1).value;
                effects.sp = Some(sp);
                Some(Arith::of(self.memory[self.address(sp)]))
            }
        };

        let Some(result) = result else {
            return effects;
        };

        effects.flags = opcode.flags();
        effects.status = self.flags_of(result);

        if let Some(slot) = opcode.result_slot() {
            let target = instruction.operands[slot]
                .and_then(|operand| self.target(operand));
            match target {
                Some(target) => {
                    effects.write_back = Some((target, result.value));
                }
                None => return Effects::fault(effects.signals),
            }
        }
        effects
    }

    fn flags_of(&self, result: Arith) -> Status {
        let mut status = Status::empty();
        status.set(Status::CARRY, result.carry);
        status.set(Status::OVERFLOW, result.overflow);
        status.set(Status::SIGN, self.width.is_negative(result.value));
        status.set(Status::ZERO, result.value == 0);
        status
    }

    /// Applies the effects of one cycle at the cycle boundary.
    pub fn commit(&mut self, effects: Effects) {
        self.signals = effects.signals;
        self.registers[Register::Output.index()] = 0;

        if let Some(pc) = effects.pc {
            self.registers[Register::Pc.index()] = pc;
        }
        if let Some(link) = effects.link {
            self.registers[Register::Link.index()] = link;
        }
        if let Some(sp) = effects.sp {
            self.registers[Register::Sp.index()] = sp;
        }
        if let Some((address, value)) = effects.store {
            self.memory[address] = value;
        }

        match effects.write_back {
            Some((Target::Register(register), value)) => {
                self.registers[register.index()] = value;
                if register == Register::Output {
                    self.signals |= Signals::OUTPUT_WRITTEN;
                }
            }
            Some((Target::Memory(address), value)) => {
                self.memory[address] = value;
            }
            None => {}
        }

        let status = self
            .status()
            .difference(effects.flags)
            .union(effects.status.intersection(effects.flags));
        self.registers[Register::Status.index()] = status.bits();

        let tick = self.register(Register::Tick);
        self.registers[Register::Tick.index()] =
            self.width.truncate(tick as WideWord + 1);
    }

    /// Runs one cycle. Once the machine has stopped this does nothing.
    pub fn step(&mut self) -> State {
        if self.is_halted() {
            return self.state();
        }

        let pc = self.register(Register::Pc);
        log::trace!(
            "{:>6} {:02X}  {}",
            self.register(Register::Tick),
            pc,
            self.disassemble_at(self.address(pc))
        );

        let effects = self.execute();
        if effects.signals.contains(Signals::ILLEGAL_OPCODE) {
            log::warn!(
                "illegal instruction `{}` at {:#04x}",
                self.disassemble_at(self.address(pc)),
                pc
            );
        }
        self.commit(effects);
        self.state()
    }

    /// Steps until the machine stops or the cycle budget runs out, serving
    /// the handshake through `port` around every cycle.
    pub fn run(&mut self, port: &mut impl IoPort) -> Trace {
        let mut entries = vec![];
        let stop = loop {
            match self.state() {
                State::Halted => break StopReason::Halted,
                State::Faulted => break StopReason::Faulted,
                State::Running => {}
            }
            if entries.len() as u64 >= self.config.cycle_budget {
                log::warn!(
                    "cycle budget of {} exhausted at pc {:#04x}",
                    self.config.cycle_budget,
                    self.register(Register::Pc)
                );
                break StopReason::BudgetExhausted;
            }

            if self.signals.contains(Signals::INPUT_READ) {
                let input = port.read_input();
                self.set_register(Register::Input, input);
            }

            let tick = self.register(Register::Tick);
            let pc = self.register(Register::Pc);
            let instruction = self.disassemble_at(self.address(pc));
            self.step();

            if self.signals.contains(Signals::OUTPUT_WRITTEN) {
                port.write_output(self.register(Register::Output));
            }

            entries.push(TraceEntry {
                tick,
                pc,
                instruction,
                registers: self.registers,
                signals: self.signals,
            });
        };

        log::debug!("stopped after {} cycles: {:?}", entries.len(), stop);
        Trace { entries, stop }
    }
}
