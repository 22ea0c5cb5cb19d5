//! The switch-dispatched stack interpreter.
//!
//! State is a single linear byte stack plus `instruction_pointer`,
//! `base_pointer` and a return-value scratch buffer. The stack grows
//! upward; `CALL` advances the base pointer past the caller's argument
//! area and the 16-byte return-address/saved-base pair, `RETURN`
//! restores both. Every opcode executes in O(1) except the memory
//! copies, which are O(size).
//!
//! Pointers are 64-bit values carrying their region in the upper bits:
//! stack, constant data, globals, or one of the heap allocations made by
//! `malloc_size_i32`. A failed access traps with an [`ExitCode`] and
//! halts execution; there is no unwinding and no resumption.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::bytecode::{BinaryOpKind, BytecodeProgram, Instruction, UnaryOpKind, VmType};
use crate::hardcoded::{HardcodedFunction, Host};

/// Wire-stable exit codes of a VM run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitCode {
    Success,
    DivByZero,
    StackOverflow,
    NullDeref,
    OutOfBounds,
    AssertionFailed,
    TypeErrorAtRuntime,
    InternalError,
}

impl ExitCode {
    /// The single enumerated integer used on the wire.
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::DivByZero => 1,
            ExitCode::StackOverflow => 2,
            ExitCode::NullDeref => 3,
            ExitCode::OutOfBounds => 4,
            ExitCode::AssertionFailed => 5,
            ExitCode::TypeErrorAtRuntime => 6,
            ExitCode::InternalError => 7,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::DivByZero => "DIV_BY_ZERO",
            ExitCode::StackOverflow => "STACK_OVERFLOW",
            ExitCode::NullDeref => "NULL_DEREF",
            ExitCode::OutOfBounds => "OUT_OF_BOUNDS",
            ExitCode::AssertionFailed => "ASSERTION_FAILED",
            ExitCode::TypeErrorAtRuntime => "TYPE_ERROR_AT_RUNTIME",
            ExitCode::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(name)
    }
}

const STACK_SIZE: usize = 1 << 20;
const STACK_BASE: u64 = 0x0000_0001_0000_0000;
const CONST_BASE: u64 = 0x0000_0002_0000_0000;
const GLOBAL_BASE: u64 = 0x0000_0003_0000_0000;
const HEAP_BASE: u64 = 0x0000_0004_0000_0000;

pub struct Interpreter<'a> {
    program: &'a BytecodeProgram,
    host: &'a mut dyn Host,
    stack: Vec<u8>,
    base: usize,
    ip: usize,
    return_scratch: Vec<u8>,
    heap: FxHashMap<u64, Vec<u8>>,
    next_heap: u64,
    globals: Vec<u8>,
    /// entry instruction → (frame size, parameter bytes)
    frames: FxHashMap<usize, (usize, usize)>,
    /// Optional fuel for comptime execution.
    max_instructions: Option<u64>,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a BytecodeProgram, host: &'a mut dyn Host) -> Interpreter<'a> {
        let mut globals = vec![0u8; program.globals_size];
        for (offset, bytes) in &program.global_initializers {
            globals[*offset..*offset + bytes.len()].copy_from_slice(bytes);
        }
        let frames = program
            .functions
            .iter()
            .map(|f| (f.entry, (f.frame_size, f.parameter_bytes)))
            .collect();
        Interpreter {
            program,
            host,
            stack: vec![0u8; STACK_SIZE],
            base: 0,
            ip: program.entry_point,
            return_scratch: Vec::new(),
            heap: FxHashMap::default(),
            next_heap: HEAP_BASE,
            globals,
            frames,
            max_instructions: None,
        }
    }

    /// Bounds the number of executed instructions; exceeding it halts
    /// with `INTERNAL_ERROR`. Used for comptime evaluation.
    pub fn with_instruction_limit(mut self, limit: u64) -> Interpreter<'a> {
        self.max_instructions = Some(limit);
        self
    }

    /// The raw bytes of the last returned value.
    pub fn return_value_bytes(&self) -> &[u8] {
        &self.return_scratch
    }

    pub fn return_value_i32(&self) -> i32 {
        let mut bytes = [0u8; 4];
        let len = self.return_scratch.len().min(4);
        bytes[..len].copy_from_slice(&self.return_scratch[..len]);
        i32::from_le_bytes(bytes)
    }

    /// Runs to completion, a trap, or fuel exhaustion.
    pub fn run(&mut self) -> ExitCode {
        let mut executed: u64 = 0;
        loop {
            if let Some(limit) = self.max_instructions {
                executed += 1;
                if executed > limit {
                    return ExitCode::InternalError;
                }
            }
            match self.step() {
                Ok(None) => {}
                Ok(Some(code)) => return code,
                Err(trap) => return trap,
            }
        }
    }

    fn step(&mut self) -> Result<Option<ExitCode>, ExitCode> {
        let Some(instruction) = self.program.instructions.get(self.ip) else {
            return Err(ExitCode::InternalError);
        };
        let instruction = instruction.clone();
        self.ip += 1;

        match instruction {
            Instruction::LoadConstantInt { dst, value, size } => {
                let bytes = value.to_le_bytes();
                self.write_slot(dst, &bytes[..size as usize])?;
            }
            Instruction::LoadConstantF32 { dst, value } => {
                self.write_slot(dst, &value.to_le_bytes())?;
            }
            Instruction::LoadConstantBool { dst, value } => {
                self.write_slot(dst, &[value as u8])?;
            }
            Instruction::LoadConstantDataAddress { dst, offset } => {
                let address = CONST_BASE + offset as u64;
                self.write_slot(dst, &address.to_le_bytes())?;
            }
            Instruction::LoadStackAddress { dst, offset } => {
                let absolute = self.slot_index(offset, 1)?;
                let address = STACK_BASE + absolute as u64;
                self.write_slot(dst, &address.to_le_bytes())?;
            }
            Instruction::LoadGlobalAddress { dst, offset } => {
                let address = GLOBAL_BASE + offset as u64;
                self.write_slot(dst, &address.to_le_bytes())?;
            }
            Instruction::Move { dst, src, size } => {
                let from = self.slot_index(src, size as usize)?;
                let to = self.slot_index(dst, size as usize)?;
                self.stack.copy_within(from..from + size as usize, to);
            }
            Instruction::ReadMemory { dst, address, size } => {
                let pointer = self.read_slot_u64(address)?;
                let bytes = self.read_memory(pointer, size as usize)?;
                self.write_slot(dst, &bytes)?;
            }
            Instruction::WriteMemory { address, src, size } => {
                let pointer = self.read_slot_u64(address)?;
                let from = self.slot_index(src, size as usize)?;
                let bytes = self.stack[from..from + size as usize].to_vec();
                self.write_memory(pointer, &bytes)?;
            }
            Instruction::MemoryCopy {
                dst_address,
                src_address,
                size,
            } => {
                let src_pointer = self.read_slot_u64(src_address)?;
                let dst_pointer = self.read_slot_u64(dst_address)?;
                let bytes = self.read_memory(src_pointer, size as usize)?;
                self.write_memory(dst_pointer, &bytes)?;
            }
            Instruction::Binary {
                op,
                ty,
                dst,
                left,
                right,
            } => {
                self.execute_binary(op, ty, dst, left, right)?;
            }
            Instruction::Unary { op, ty, dst, operand } => {
                self.execute_unary(op, ty, dst, operand)?;
            }
            Instruction::Convert { dst, src, from, to } => {
                self.execute_convert(dst, src, from, to)?;
            }
            Instruction::PointerAdd { dst, base, offset } => {
                let pointer = self.read_slot_u64(base)?;
                let result = pointer.wrapping_add_signed(offset);
                self.write_slot(dst, &result.to_le_bytes())?;
            }
            Instruction::PointerIndex {
                dst,
                base,
                index,
                stride,
            } => {
                let pointer = self.read_slot_u64(base)?;
                let index = self.read_slot_i64(index, 4)?;
                let result = pointer.wrapping_add_signed(index * stride as i64);
                self.write_slot(dst, &result.to_le_bytes())?;
            }
            Instruction::Jump { target } => self.ip = target,
            Instruction::JumpOnTrue { condition, target } => {
                if self.read_slot_bool(condition)? {
                    self.ip = target;
                }
            }
            Instruction::JumpOnFalse { condition, target } => {
                if !self.read_slot_bool(condition)? {
                    self.ip = target;
                }
            }
            Instruction::Call {
                target,
                argument_offset,
            } => {
                let &(frame_size, parameter_bytes) = self
                    .frames
                    .get(&target)
                    .ok_or(ExitCode::InternalError)?;
                let callee_base = self
                    .base
                    .checked_add_signed(argument_offset as isize)
                    .ok_or(ExitCode::InternalError)?
                    + parameter_bytes
                    + 16;
                if callee_base + frame_size > self.stack.len() {
                    return Err(ExitCode::StackOverflow);
                }
                let return_address = self.ip as u64;
                self.stack[callee_base - 16..callee_base - 8]
                    .copy_from_slice(&return_address.to_le_bytes());
                self.stack[callee_base - 8..callee_base]
                    .copy_from_slice(&(self.base as u64).to_le_bytes());
                self.base = callee_base;
                self.ip = target;
            }
            Instruction::CallHardcoded {
                function,
                argument_offset,
            } => {
                self.execute_hardcoded(function, argument_offset)?;
            }
            Instruction::Return { value_offset, size } => {
                if self.base < 16 {
                    return Err(ExitCode::InternalError);
                }
                self.return_scratch.clear();
                if size > 0 {
                    let from = self.slot_index(value_offset, size as usize)?;
                    self.return_scratch
                        .extend_from_slice(&self.stack[from..from + size as usize]);
                }
                let mut ra = [0u8; 8];
                ra.copy_from_slice(&self.stack[self.base - 16..self.base - 8]);
                let mut saved = [0u8; 8];
                saved.copy_from_slice(&self.stack[self.base - 8..self.base]);
                self.ip = u64::from_le_bytes(ra) as usize;
                self.base = u64::from_le_bytes(saved) as usize;
            }
            Instruction::LoadReturnValue { dst, size } => {
                if size > 0 {
                    let bytes = self.return_scratch.clone();
                    let take = (size as usize).min(bytes.len());
                    self.write_slot(dst, &bytes[..take])?;
                }
            }
            Instruction::Exit { code } => return Ok(Some(code)),
        }
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Stack slot access
    // ------------------------------------------------------------------

    fn slot_index(&self, offset: i32, size: usize) -> Result<usize, ExitCode> {
        let index = self.base as i64 + offset as i64;
        if index < 0 || index as usize + size > self.stack.len() {
            return Err(ExitCode::StackOverflow);
        }
        Ok(index as usize)
    }

    fn write_slot(&mut self, offset: i32, bytes: &[u8]) -> Result<(), ExitCode> {
        let index = self.slot_index(offset, bytes.len())?;
        self.stack[index..index + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_slot_u64(&self, offset: i32) -> Result<u64, ExitCode> {
        let index = self.slot_index(offset, 8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.stack[index..index + 8]);
        Ok(u64::from_le_bytes(bytes))
    }

    fn read_slot_bool(&self, offset: i32) -> Result<bool, ExitCode> {
        let index = self.slot_index(offset, 1)?;
        Ok(self.stack[index] != 0)
    }

    /// Reads a slot as a sign- or zero-extended integer.
    fn read_slot_int(&self, offset: i32, ty: VmType) -> Result<i64, ExitCode> {
        let size = ty.size();
        let index = self.slot_index(offset, size)?;
        let mut bytes = [0u8; 8];
        bytes[..size].copy_from_slice(&self.stack[index..index + size]);
        let raw = u64::from_le_bytes(bytes);
        Ok(match ty {
            VmType::I8 => raw as u8 as i8 as i64,
            VmType::I16 => raw as u16 as i16 as i64,
            VmType::I32 => raw as u32 as i32 as i64,
            VmType::I64 => raw as i64,
            _ => raw as i64,
        })
    }

    fn read_slot_i64(&self, offset: i32, size: usize) -> Result<i64, ExitCode> {
        let ty = match size {
            1 => VmType::I8,
            2 => VmType::I16,
            4 => VmType::I32,
            _ => VmType::I64,
        };
        self.read_slot_int(offset, ty)
    }

    fn read_slot_f32(&self, offset: i32) -> Result<f32, ExitCode> {
        let index = self.slot_index(offset, 4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.stack[index..index + 4]);
        Ok(f32::from_le_bytes(bytes))
    }

    fn write_slot_int(&mut self, offset: i32, value: i64, size: usize) -> Result<(), ExitCode> {
        let bytes = value.to_le_bytes();
        self.write_slot(offset, &bytes[..size])
    }

    // ------------------------------------------------------------------
    // Typed operations
    // ------------------------------------------------------------------

    fn execute_binary(
        &mut self,
        op: BinaryOpKind,
        ty: VmType,
        dst: i32,
        left: i32,
        right: i32,
    ) -> Result<(), ExitCode> {
        match ty {
            VmType::F32 => {
                let l = self.read_slot_f32(left)?;
                let r = self.read_slot_f32(right)?;
                match op {
                    BinaryOpKind::Add => self.write_slot(dst, &(l + r).to_le_bytes()),
                    BinaryOpKind::Sub => self.write_slot(dst, &(l - r).to_le_bytes()),
                    BinaryOpKind::Mul => self.write_slot(dst, &(l * r).to_le_bytes()),
                    BinaryOpKind::Div => self.write_slot(dst, &(l / r).to_le_bytes()),
                    BinaryOpKind::Mod => self.write_slot(dst, &(l % r).to_le_bytes()),
                    BinaryOpKind::Equal => self.write_slot(dst, &[(l == r) as u8]),
                    BinaryOpKind::NotEqual => self.write_slot(dst, &[(l != r) as u8]),
                    BinaryOpKind::Less => self.write_slot(dst, &[(l < r) as u8]),
                    BinaryOpKind::LessEqual => self.write_slot(dst, &[(l <= r) as u8]),
                    BinaryOpKind::Greater => self.write_slot(dst, &[(l > r) as u8]),
                    BinaryOpKind::GreaterEqual => self.write_slot(dst, &[(l >= r) as u8]),
                    BinaryOpKind::And | BinaryOpKind::Or => Err(ExitCode::InternalError),
                }
            }
            VmType::Bool => {
                let l = self.read_slot_bool(left)?;
                let r = self.read_slot_bool(right)?;
                match op {
                    BinaryOpKind::And => self.write_slot(dst, &[(l && r) as u8]),
                    BinaryOpKind::Or => self.write_slot(dst, &[(l || r) as u8]),
                    BinaryOpKind::Equal => self.write_slot(dst, &[(l == r) as u8]),
                    BinaryOpKind::NotEqual => self.write_slot(dst, &[(l != r) as u8]),
                    _ => Err(ExitCode::InternalError),
                }
            }
            _ => {
                // Integer types, signed and unsigned, with wrapping
                // two's-complement arithmetic.
                let size = ty.size();
                let signed = matches!(ty, VmType::I8 | VmType::I16 | VmType::I32 | VmType::I64);
                let l = self.read_slot_int(left, ty)?;
                let r = self.read_slot_int(right, ty)?;
                let (lu, ru) = (l as u64, r as u64);
                match op {
                    BinaryOpKind::Add => self.write_slot_int(dst, l.wrapping_add(r), size),
                    BinaryOpKind::Sub => self.write_slot_int(dst, l.wrapping_sub(r), size),
                    BinaryOpKind::Mul => self.write_slot_int(dst, l.wrapping_mul(r), size),
                    BinaryOpKind::Div => {
                        if r == 0 {
                            return Err(ExitCode::DivByZero);
                        }
                        let result = if signed {
                            l.wrapping_div(r)
                        } else {
                            (lu.wrapping_div(ru)) as i64
                        };
                        self.write_slot_int(dst, result, size)
                    }
                    BinaryOpKind::Mod => {
                        if r == 0 {
                            return Err(ExitCode::DivByZero);
                        }
                        let result = if signed {
                            l.wrapping_rem(r)
                        } else {
                            (lu.wrapping_rem(ru)) as i64
                        };
                        self.write_slot_int(dst, result, size)
                    }
                    BinaryOpKind::Equal => self.write_slot(dst, &[(l == r) as u8]),
                    BinaryOpKind::NotEqual => self.write_slot(dst, &[(l != r) as u8]),
                    BinaryOpKind::Less => {
                        let test = if signed { l < r } else { lu < ru };
                        self.write_slot(dst, &[test as u8])
                    }
                    BinaryOpKind::LessEqual => {
                        let test = if signed { l <= r } else { lu <= ru };
                        self.write_slot(dst, &[test as u8])
                    }
                    BinaryOpKind::Greater => {
                        let test = if signed { l > r } else { lu > ru };
                        self.write_slot(dst, &[test as u8])
                    }
                    BinaryOpKind::GreaterEqual => {
                        let test = if signed { l >= r } else { lu >= ru };
                        self.write_slot(dst, &[test as u8])
                    }
                    BinaryOpKind::And | BinaryOpKind::Or => Err(ExitCode::InternalError),
                }
            }
        }
    }

    fn execute_unary(
        &mut self,
        op: UnaryOpKind,
        ty: VmType,
        dst: i32,
        operand: i32,
    ) -> Result<(), ExitCode> {
        match (op, ty) {
            (UnaryOpKind::Not, VmType::Bool) => {
                let value = self.read_slot_bool(operand)?;
                self.write_slot(dst, &[(!value) as u8])
            }
            (UnaryOpKind::Negate, VmType::F32) => {
                let value = self.read_slot_f32(operand)?;
                self.write_slot(dst, &(-value).to_le_bytes())
            }
            (UnaryOpKind::Negate, _) => {
                let value = self.read_slot_int(operand, ty)?;
                self.write_slot_int(dst, value.wrapping_neg(), ty.size())
            }
            _ => Err(ExitCode::InternalError),
        }
    }

    fn execute_convert(
        &mut self,
        dst: i32,
        src: i32,
        from: VmType,
        to: VmType,
    ) -> Result<(), ExitCode> {
        match (from, to) {
            (VmType::F32, VmType::F32) => {
                let value = self.read_slot_f32(src)?;
                self.write_slot(dst, &value.to_le_bytes())
            }
            (VmType::F32, _) => {
                let value = self.read_slot_f32(src)?;
                self.write_slot_int(dst, value as i64, to.size())
            }
            (_, VmType::F32) => {
                let value = self.read_slot_int(src, from)?;
                self.write_slot(dst, &(value as f32).to_le_bytes())
            }
            _ => {
                let value = self.read_slot_int(src, from)?;
                self.write_slot_int(dst, value, to.size())
            }
        }
    }

    // ------------------------------------------------------------------
    // Memory regions
    // ------------------------------------------------------------------

    fn read_memory(&self, address: u64, size: usize) -> Result<Vec<u8>, ExitCode> {
        if address == 0 {
            return Err(ExitCode::NullDeref);
        }
        if address >= STACK_BASE && address < CONST_BASE {
            let start = (address - STACK_BASE) as usize;
            if start + size > self.stack.len() {
                return Err(ExitCode::OutOfBounds);
            }
            return Ok(self.stack[start..start + size].to_vec());
        }
        if address >= CONST_BASE && address < GLOBAL_BASE {
            let start = (address - CONST_BASE) as usize;
            if start + size > self.program.constant_data.len() {
                return Err(ExitCode::OutOfBounds);
            }
            return Ok(self.program.constant_data[start..start + size].to_vec());
        }
        if address >= GLOBAL_BASE && address < HEAP_BASE {
            let start = (address - GLOBAL_BASE) as usize;
            if start + size > self.globals.len() {
                return Err(ExitCode::OutOfBounds);
            }
            return Ok(self.globals[start..start + size].to_vec());
        }
        if let Some((region_base, region)) = self.find_heap_region(address) {
            let start = (address - region_base) as usize;
            if start + size > region.len() {
                return Err(ExitCode::OutOfBounds);
            }
            return Ok(region[start..start + size].to_vec());
        }
        Err(ExitCode::OutOfBounds)
    }

    fn write_memory(&mut self, address: u64, bytes: &[u8]) -> Result<(), ExitCode> {
        if address == 0 {
            return Err(ExitCode::NullDeref);
        }
        let size = bytes.len();
        if address >= STACK_BASE && address < CONST_BASE {
            let start = (address - STACK_BASE) as usize;
            if start + size > self.stack.len() {
                return Err(ExitCode::OutOfBounds);
            }
            self.stack[start..start + size].copy_from_slice(bytes);
            return Ok(());
        }
        if address >= CONST_BASE && address < GLOBAL_BASE {
            // The constant region is read-only.
            return Err(ExitCode::OutOfBounds);
        }
        if address >= GLOBAL_BASE && address < HEAP_BASE {
            let start = (address - GLOBAL_BASE) as usize;
            if start + size > self.globals.len() {
                return Err(ExitCode::OutOfBounds);
            }
            self.globals[start..start + size].copy_from_slice(bytes);
            return Ok(());
        }
        let region_base = match self.find_heap_region(address) {
            Some((base, _)) => base,
            None => return Err(ExitCode::OutOfBounds),
        };
        let region = self.heap.get_mut(&region_base).expect("found above");
        let start = (address - region_base) as usize;
        if start + size > region.len() {
            return Err(ExitCode::OutOfBounds);
        }
        region[start..start + size].copy_from_slice(bytes);
        Ok(())
    }

    fn find_heap_region(&self, address: u64) -> Option<(u64, &Vec<u8>)> {
        self.heap
            .iter()
            .find(|(base, region)| address >= **base && address < **base + region.len() as u64)
            .map(|(base, region)| (*base, region))
    }

    // ------------------------------------------------------------------
    // Hardcoded functions
    // ------------------------------------------------------------------

    fn execute_hardcoded(
        &mut self,
        function: HardcodedFunction,
        argument_offset: i32,
    ) -> Result<(), ExitCode> {
        self.return_scratch.clear();
        match function {
            HardcodedFunction::PrintI32 => {
                let value = self.read_slot_int(argument_offset, VmType::I32)?;
                self.host.print(&value.to_string());
            }
            HardcodedFunction::PrintF32 => {
                let value = self.read_slot_f32(argument_offset)?;
                self.host.print(&value.to_string());
            }
            HardcodedFunction::PrintBool => {
                let value = self.read_slot_bool(argument_offset)?;
                self.host.print(if value { "true" } else { "false" });
            }
            HardcodedFunction::PrintString => {
                let pointer = self.read_slot_u64(argument_offset)?;
                let length = self.read_slot_i64(argument_offset + 8, 8)?;
                if length < 0 {
                    return Err(ExitCode::OutOfBounds);
                }
                let bytes = self.read_memory(pointer, length as usize)?;
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.host.print(&text);
            }
            HardcodedFunction::PrintLine => {
                self.host.print("\n");
            }
            HardcodedFunction::ReadI32 => {
                let value = self.host.read_i32();
                self.return_scratch.extend_from_slice(&value.to_le_bytes());
            }
            HardcodedFunction::ReadF32 => {
                let value = self.host.read_f32();
                self.return_scratch.extend_from_slice(&value.to_le_bytes());
            }
            HardcodedFunction::ReadBool => {
                let value = self.host.read_bool();
                self.return_scratch.push(value as u8);
            }
            HardcodedFunction::RandomI32 => {
                let value = self.host.random_i32();
                self.return_scratch.extend_from_slice(&value.to_le_bytes());
            }
            HardcodedFunction::MallocSizeI32 => {
                let size = self.read_slot_int(argument_offset, VmType::I32)?;
                if size < 0 {
                    return Err(ExitCode::OutOfBounds);
                }
                let address = self.next_heap;
                let length = (size as usize).max(1);
                self.heap.insert(address, vec![0u8; length]);
                self.next_heap += crate::types::align_next_multiple(length, 16) as u64 + 16;
                self.return_scratch.extend_from_slice(&address.to_le_bytes());
            }
            HardcodedFunction::FreePointer => {
                let pointer = self.read_slot_u64(argument_offset)?;
                if pointer == 0 {
                    return Err(ExitCode::NullDeref);
                }
                self.heap.remove(&pointer);
            }
        }
        Ok(())
    }
}
