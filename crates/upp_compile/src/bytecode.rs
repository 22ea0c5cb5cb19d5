//! Bytecode generation: stack layout and the flat instruction stream.
//!
//! Every intermediate function is laid out on the VM stack:
//!
//! ```text
//!             ... caller frame ...
//!   base-16-P ┬ parameters (P bytes, caller-written, in order —
//!             │ the last parameter ends closest to the frame base)
//!   base-16   ┼ return address (8) + saved frame base (8)
//!   base+0    ┼ locals and temporaries, each aligned naturally
//!             ┼ operand scratch (3 × 8 bytes)
//!             ┴ outgoing argument area, 8-aligned
//! ```
//!
//! `Memory`-mode IR operands expand into `READ_MEMORY`/`WRITE_MEMORY`
//! through the scratch slots. Branch targets are recorded in a patch
//! list and filled in when the target instruction index is known; call
//! sites are patched against the function entry table in a second pass.

use rustc_hash::FxHashMap;
use upp_base::Ident;
use upp_language::ast::{Binop, NodeId, Unop};

use crate::analysis::SemanticInfo;
use crate::hardcoded::HardcodedFunction;
use crate::interpreter::ExitCode;
use crate::ir::{AccessMode, IrConstant, IrFunction, IrInstruction, IrOperand, IrProgram, RegisterRole};
use crate::types::{align_next_multiple, Primitive, Type, TypeId, POINTER_SIZE};

/// Operand type of a typed VM opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    Bool,
}

impl VmType {
    pub fn size(self) -> usize {
        match self {
            VmType::I8 | VmType::U8 | VmType::Bool => 1,
            VmType::I16 | VmType::U16 => 2,
            VmType::I32 | VmType::U32 | VmType::F32 => 4,
            VmType::I64 | VmType::U64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Negate,
    Not,
}

/// One VM instruction. Stack offsets are relative to the current frame
/// base and may be negative (parameters).
#[derive(Debug, Clone)]
pub enum Instruction {
    LoadConstantInt { dst: i32, value: i64, size: u8 },
    LoadConstantF32 { dst: i32, value: f32 },
    LoadConstantBool { dst: i32, value: bool },
    /// dst = address of `offset` inside the constant data region.
    LoadConstantDataAddress { dst: i32, offset: i32 },
    /// dst = address of stack slot `offset` in the current frame.
    LoadStackAddress { dst: i32, offset: i32 },
    /// dst = address of `offset` inside the global region.
    LoadGlobalAddress { dst: i32, offset: i32 },
    Move { dst: i32, src: i32, size: i32 },
    /// dst slot ← size bytes at the address stored in `address`.
    ReadMemory { dst: i32, address: i32, size: i32 },
    /// size bytes at the address stored in `address` ← src slot.
    WriteMemory { address: i32, src: i32, size: i32 },
    /// *dst_address ← *src_address, size bytes.
    MemoryCopy { dst_address: i32, src_address: i32, size: i32 },
    Binary { op: BinaryOpKind, ty: VmType, dst: i32, left: i32, right: i32 },
    Unary { op: UnaryOpKind, ty: VmType, dst: i32, operand: i32 },
    Convert { dst: i32, src: i32, from: VmType, to: VmType },
    /// dst = base + constant byte offset.
    PointerAdd { dst: i32, base: i32, offset: i64 },
    /// dst = base + index(i32) * stride.
    PointerIndex { dst: i32, base: i32, index: i32, stride: i32 },
    Jump { target: usize },
    JumpOnTrue { condition: i32, target: usize },
    JumpOnFalse { condition: i32, target: usize },
    Call { target: usize, argument_offset: i32 },
    CallHardcoded { function: HardcodedFunction, argument_offset: i32 },
    /// Copies the value into the return scratch and pops the frame.
    Return { value_offset: i32, size: i32 },
    LoadReturnValue { dst: i32, size: i32 },
    Exit { code: ExitCode },
}

/// Per-function metadata for calls and stack-overflow checks.
#[derive(Debug, Clone)]
pub struct FunctionMeta {
    pub ast_node: NodeId,
    pub name: Option<Ident>,
    pub entry: usize,
    pub frame_size: usize,
    pub parameter_bytes: usize,
}

#[derive(Debug, Default)]
pub struct BytecodeProgram {
    pub instructions: Vec<Instruction>,
    pub functions: Vec<FunctionMeta>,
    pub entry_point: usize,
    pub constant_data: Vec<u8>,
    pub globals_size: usize,
    pub global_initializers: Vec<(usize, Vec<u8>)>,
}

impl BytecodeProgram {
    pub fn function_at_entry(&self, entry: usize) -> Option<&FunctionMeta> {
        self.functions.iter().find(|f| f.entry == entry)
    }

    /// Renders the instruction list for debugging.
    pub fn append_to_string(&self, out: &mut String) {
        use std::fmt::Write;
        for (index, instruction) in self.instructions.iter().enumerate() {
            if let Some(function) = self.function_at_entry(index) {
                let name = function
                    .name
                    .map(|n| upp_base::identifier_pool().resolve_owned(n))
                    .unwrap_or_else(|| "<anonymous>".to_string());
                let _ = writeln!(out, "{name}: (frame {} bytes)", function.frame_size);
            }
            let _ = writeln!(out, "  {index:4}: {instruction:?}");
        }
    }
}

/// Generates bytecode for an IR program. `entry` is the AST node of the
/// function the program starts in (usually `main`).
pub fn generate(ir: &IrProgram, info: &SemanticInfo, entry: NodeId) -> BytecodeProgram {
    let mut generator = Generator {
        info,
        ir,
        program: BytecodeProgram {
            globals_size: info.globals_size,
            global_initializers: info.global_initializers.clone(),
            ..Default::default()
        },
        call_patches: Vec::new(),
        string_offsets: FxHashMap::default(),
    };

    // Entry prologue: call the entry function, surface its value, exit.
    let entry_meta = generator.ir.function_map[&entry];
    let entry_return_size = generator.return_size(&ir.functions[entry_meta]);
    generator.program.entry_point = 0;
    let call_index = generator.emit(Instruction::Call {
        target: 0,
        argument_offset: 0,
    });
    generator.call_patches.push((call_index, entry));
    generator.emit(Instruction::LoadReturnValue {
        dst: 0,
        size: entry_return_size as i32,
    });
    generator.emit(Instruction::Exit {
        code: ExitCode::Success,
    });

    for function in &ir.functions {
        generator.generate_function(function);
    }
    generator.patch_calls();

    log::debug!(
        "generated {} instructions for {} functions",
        generator.program.instructions.len(),
        generator.program.functions.len()
    );
    generator.program
}

struct Generator<'a> {
    info: &'a SemanticInfo,
    ir: &'a IrProgram,
    program: BytecodeProgram,
    /// (call instruction index, callee AST node)
    call_patches: Vec<(usize, NodeId)>,
    string_offsets: FxHashMap<Ident, (usize, usize)>,
}

/// Resolved stack layout of one function.
struct Layout {
    register_offsets: Vec<i32>,
    scratch: [i32; 3],
    /// First byte of the outgoing argument area.
    argument_area: usize,
    frame_size: usize,
}

impl<'a> Generator<'a> {
    fn emit(&mut self, instruction: Instruction) -> usize {
        self.program.instructions.push(instruction);
        self.program.instructions.len() - 1
    }

    fn vm_type(&self, ty: TypeId) -> VmType {
        match self.info.types.ty(ty) {
            Type::Primitive(p) => match p {
                Primitive::I8 => VmType::I8,
                Primitive::I16 => VmType::I16,
                Primitive::I32 => VmType::I32,
                Primitive::I64 => VmType::I64,
                Primitive::U8 => VmType::U8,
                Primitive::U16 => VmType::U16,
                Primitive::U32 => VmType::U32,
                Primitive::U64 => VmType::U64,
                Primitive::F32 => VmType::F32,
                Primitive::Bool => VmType::Bool,
                Primitive::Void => VmType::U8,
            },
            Type::Enum(_) => VmType::I32,
            Type::Pointer(_) | Type::Function(_) => VmType::U64,
            _ => VmType::U64,
        }
    }

    fn return_size(&self, function: &IrFunction) -> usize {
        match self.info.types.ty(function.signature) {
            Type::Function(f) => self.info.types.size_of(f.return_type),
            _ => 0,
        }
    }

    /// Parameter block layout shared between caller and callee: offsets
    /// inside the block, walked in order with natural alignment.
    fn parameter_block(&self, function: &IrFunction) -> (Vec<(usize, usize)>, usize) {
        let mut offsets = Vec::new();
        let mut cursor = 0usize;
        for register in function
            .registers
            .iter()
            .filter(|r| r.role == RegisterRole::Parameter)
        {
            let size = self.info.types.size_of(register.ty);
            let alignment = self.info.types.alignment_of(register.ty).max(1);
            cursor = align_next_multiple(cursor, alignment);
            offsets.push((cursor, size));
            cursor += size;
        }
        (offsets, align_next_multiple(cursor, 8))
    }

    fn layout_function(&self, function: &IrFunction) -> Layout {
        let (parameter_offsets, parameter_bytes) = self.parameter_block(function);

        let mut register_offsets = Vec::with_capacity(function.registers.len());
        let mut parameter_index = 0usize;
        let mut cursor = 0usize;
        for register in &function.registers {
            match register.role {
                RegisterRole::Parameter => {
                    let (block_offset, _) = parameter_offsets[parameter_index];
                    parameter_index += 1;
                    register_offsets
                        .push(-(16 + parameter_bytes as i32) + block_offset as i32);
                }
                RegisterRole::Local | RegisterRole::Temporary => {
                    let size = self.info.types.size_of(register.ty);
                    let alignment = self.info.types.alignment_of(register.ty).max(1);
                    cursor = align_next_multiple(cursor, alignment);
                    register_offsets.push(cursor as i32);
                    cursor += size;
                }
            }
        }
        let end_of_variables = cursor;

        // 16-byte scratch slots so slice-sized values fit.
        let scratch_base = align_next_multiple(end_of_variables, 8);
        let scratch = [
            scratch_base as i32,
            (scratch_base + 16) as i32,
            (scratch_base + 32) as i32,
        ];
        let argument_area = scratch_base + 48;

        Layout {
            register_offsets,
            scratch,
            argument_area,
            frame_size: argument_area,
        }
    }

    /// Worst-case outgoing call area for the frame size.
    fn call_area_size(&self, layout: &Layout, function: &IrFunction) -> usize {
        let mut max_end = layout.argument_area;
        for instruction in &function.instructions {
            match instruction {
                IrInstruction::Call { function: callee, .. } => {
                    let callee = &self.ir.functions[self.ir.function_map[callee]];
                    let (_, parameter_bytes) = self.parameter_block(callee);
                    max_end = max_end.max(layout.argument_area + parameter_bytes + 16);
                }
                IrInstruction::CallHardcoded { arguments, .. } => {
                    // Hardcoded arguments are at most a slice (16 bytes).
                    max_end = max_end.max(layout.argument_area + 16 * arguments.len().max(1) + 16);
                }
                _ => {}
            }
        }
        max_end
    }

    fn generate_function(&mut self, function: &IrFunction) {
        let mut layout = self.layout_function(function);
        layout.frame_size = self.call_area_size(&layout, function);

        let entry = self.program.instructions.len();
        let (_, parameter_bytes) = self.parameter_block(function);
        self.program.functions.push(FunctionMeta {
            ast_node: function.ast_node,
            name: function.name,
            entry,
            frame_size: layout.frame_size,
            parameter_bytes,
        });

        // First pass: emit, recording IR→bytecode index mapping and jump
        // patches.
        let mut ir_to_bytecode = Vec::with_capacity(function.instructions.len());
        let mut jump_patches: Vec<(usize, usize)> = Vec::new();
        for instruction in &function.instructions {
            ir_to_bytecode.push(self.program.instructions.len());
            self.generate_instruction(function, &layout, instruction, &mut jump_patches);
        }
        ir_to_bytecode.push(self.program.instructions.len());

        for (at, ir_target) in jump_patches {
            let target = ir_to_bytecode[ir_target];
            match &mut self.program.instructions[at] {
                Instruction::Jump { target: t }
                | Instruction::JumpOnTrue { target: t, .. }
                | Instruction::JumpOnFalse { target: t, .. } => *t = target,
                other => panic!("patched instruction is not a jump: {other:?}"),
            }
        }
    }

    fn patch_calls(&mut self) {
        // Function metas are pushed in IR order, so ids line up.
        for (at, callee) in std::mem::take(&mut self.call_patches) {
            let callee_id = self.ir.function_map[&callee];
            let entry = self.program.functions[callee_id].entry;
            match &mut self.program.instructions[at] {
                Instruction::Call { target, .. } => *target = entry,
                other => panic!("patched instruction is not a call: {other:?}"),
            }
        }
    }

    /// Reads an IR operand into a direct stack offset, going through a
    /// scratch slot for memory operands.
    fn read_operand(
        &mut self,
        layout: &Layout,
        operand: IrOperand,
        size: usize,
        scratch: i32,
    ) -> i32 {
        let register_offset = layout.register_offsets[operand.register];
        match operand.mode {
            AccessMode::Register => register_offset,
            AccessMode::Memory => {
                self.emit(Instruction::ReadMemory {
                    dst: scratch,
                    address: register_offset,
                    size: size as i32,
                });
                scratch
            }
        }
    }

    /// Where to compute a result destined for `operand`; returns the
    /// offset plus whether a write-back through the pointer is needed.
    fn resolve_dst(&self, layout: &Layout, operand: IrOperand) -> (i32, Option<i32>) {
        let register_offset = layout.register_offsets[operand.register];
        match operand.mode {
            AccessMode::Register => (register_offset, None),
            AccessMode::Memory => (layout.scratch[2], Some(register_offset)),
        }
    }

    fn write_back(&mut self, pending: Option<i32>, value_offset: i32, size: usize) {
        if let Some(address) = pending {
            self.emit(Instruction::WriteMemory {
                address,
                src: value_offset,
                size: size as i32,
            });
        }
    }

    fn generate_instruction(
        &mut self,
        function: &IrFunction,
        layout: &Layout,
        instruction: &IrInstruction,
        jump_patches: &mut Vec<(usize, usize)>,
    ) {
        match instruction {
            IrInstruction::LoadConstant { dst, value } => {
                let (size, emit_value): (usize, Instruction) = match *value {
                    IrConstant::Int { value, ty } => {
                        let size = self.info.types.size_of(ty).clamp(1, 8);
                        (
                            size,
                            Instruction::LoadConstantInt {
                                dst: 0,
                                value,
                                size: size as u8,
                            },
                        )
                    }
                    IrConstant::Float(value) => (4, Instruction::LoadConstantF32 { dst: 0, value }),
                    IrConstant::Bool(value) => (1, Instruction::LoadConstantBool { dst: 0, value }),
                    IrConstant::Null => (
                        8,
                        Instruction::LoadConstantInt {
                            dst: 0,
                            value: 0,
                            size: 8,
                        },
                    ),
                };
                let (offset, pending) = self.resolve_dst(layout, *dst);
                let emitted = match emit_value {
                    Instruction::LoadConstantInt { value, size, .. } => {
                        Instruction::LoadConstantInt {
                            dst: offset,
                            value,
                            size,
                        }
                    }
                    Instruction::LoadConstantF32 { value, .. } => {
                        Instruction::LoadConstantF32 { dst: offset, value }
                    }
                    Instruction::LoadConstantBool { value, .. } => {
                        Instruction::LoadConstantBool { dst: offset, value }
                    }
                    _ => unreachable!(),
                };
                self.emit(emitted);
                self.write_back(pending, offset, size);
            }
            IrInstruction::LoadString { dst, value } => {
                let (data_offset, len) = self.intern_string(*value);
                let (offset, pending) = self.resolve_dst(layout, *dst);
                self.emit(Instruction::LoadConstantDataAddress {
                    dst: offset,
                    offset: data_offset as i32,
                });
                self.emit(Instruction::LoadConstantInt {
                    dst: offset + 8,
                    value: len as i64,
                    size: 8,
                });
                self.write_back(pending, offset, crate::types::SLICE_SIZE);
            }
            IrInstruction::Move { dst, src, ty } => {
                let size = self.info.types.size_of(*ty);
                if size == 0 {
                    return;
                }
                let dst_offset = layout.register_offsets[dst.register];
                let src_offset = layout.register_offsets[src.register];
                match (dst.mode, src.mode) {
                    (AccessMode::Register, AccessMode::Register) => {
                        self.emit(Instruction::Move {
                            dst: dst_offset,
                            src: src_offset,
                            size: size as i32,
                        });
                    }
                    (AccessMode::Register, AccessMode::Memory) => {
                        self.emit(Instruction::ReadMemory {
                            dst: dst_offset,
                            address: src_offset,
                            size: size as i32,
                        });
                    }
                    (AccessMode::Memory, AccessMode::Register) => {
                        self.emit(Instruction::WriteMemory {
                            address: dst_offset,
                            src: src_offset,
                            size: size as i32,
                        });
                    }
                    (AccessMode::Memory, AccessMode::Memory) => {
                        self.emit(Instruction::MemoryCopy {
                            dst_address: dst_offset,
                            src_address: src_offset,
                            size: size as i32,
                        });
                    }
                }
            }
            IrInstruction::AddressOf { dst, register } => {
                let (offset, pending) = self.resolve_dst(layout, *dst);
                self.emit(Instruction::LoadStackAddress {
                    dst: offset,
                    offset: layout.register_offsets[*register],
                });
                self.write_back(pending, offset, POINTER_SIZE);
            }
            IrInstruction::AddressOfGlobal { dst, offset: global } => {
                let (offset, pending) = self.resolve_dst(layout, *dst);
                self.emit(Instruction::LoadGlobalAddress {
                    dst: offset,
                    offset: *global as i32,
                });
                self.write_back(pending, offset, POINTER_SIZE);
            }
            IrInstruction::PointerOffset { dst, base, offset } => {
                let base_offset = self.read_operand(layout, *base, POINTER_SIZE, layout.scratch[0]);
                let (dst_offset, pending) = self.resolve_dst(layout, *dst);
                self.emit(Instruction::PointerAdd {
                    dst: dst_offset,
                    base: base_offset,
                    offset: *offset as i64,
                });
                self.write_back(pending, dst_offset, POINTER_SIZE);
            }
            IrInstruction::PointerIndex {
                dst,
                base,
                index,
                stride,
            } => {
                let base_offset = self.read_operand(layout, *base, POINTER_SIZE, layout.scratch[0]);
                let index_offset = self.read_operand(layout, *index, 4, layout.scratch[1]);
                let (dst_offset, pending) = self.resolve_dst(layout, *dst);
                self.emit(Instruction::PointerIndex {
                    dst: dst_offset,
                    base: base_offset,
                    index: index_offset,
                    stride: *stride as i32,
                });
                self.write_back(pending, dst_offset, POINTER_SIZE);
            }
            IrInstruction::Binary {
                op,
                operand_ty,
                dst,
                left,
                right,
            } => {
                let is_pointer_comparison =
                    matches!(op, Binop::PointerEqual | Binop::PointerNotEqual);
                let vm_ty = if is_pointer_comparison {
                    VmType::U64
                } else {
                    self.vm_type(*operand_ty)
                };
                let size = vm_ty.size();
                let left_offset = self.read_operand(layout, *left, size, layout.scratch[0]);
                let right_offset = self.read_operand(layout, *right, size, layout.scratch[1]);
                let (dst_offset, pending) = self.resolve_dst(layout, *dst);
                let op = match op {
                    Binop::Addition => BinaryOpKind::Add,
                    Binop::Subtraction => BinaryOpKind::Sub,
                    Binop::Multiplication => BinaryOpKind::Mul,
                    Binop::Division => BinaryOpKind::Div,
                    Binop::Modulo => BinaryOpKind::Mod,
                    Binop::And => BinaryOpKind::And,
                    Binop::Or => BinaryOpKind::Or,
                    Binop::Equal | Binop::PointerEqual => BinaryOpKind::Equal,
                    Binop::NotEqual | Binop::PointerNotEqual => BinaryOpKind::NotEqual,
                    Binop::Less => BinaryOpKind::Less,
                    Binop::LessOrEqual => BinaryOpKind::LessEqual,
                    Binop::Greater => BinaryOpKind::Greater,
                    Binop::GreaterOrEqual => BinaryOpKind::GreaterEqual,
                };
                let ty = vm_ty;
                let result_size = match op {
                    BinaryOpKind::Equal
                    | BinaryOpKind::NotEqual
                    | BinaryOpKind::Less
                    | BinaryOpKind::LessEqual
                    | BinaryOpKind::Greater
                    | BinaryOpKind::GreaterEqual => 1,
                    _ => size,
                };
                self.emit(Instruction::Binary {
                    op,
                    ty,
                    dst: dst_offset,
                    left: left_offset,
                    right: right_offset,
                });
                self.write_back(pending, dst_offset, result_size);
            }
            IrInstruction::Unary {
                op,
                operand_ty,
                dst,
                operand,
            } => {
                let vm_ty = self.vm_type(*operand_ty);
                let size = vm_ty.size();
                let operand_offset = self.read_operand(layout, *operand, size, layout.scratch[0]);
                let (dst_offset, pending) = self.resolve_dst(layout, *dst);
                let op = match op {
                    Unop::Negate => UnaryOpKind::Negate,
                    Unop::Not => UnaryOpKind::Not,
                    other => panic!("unop {other:?} is not a value operation"),
                };
                self.emit(Instruction::Unary {
                    op,
                    ty: vm_ty,
                    dst: dst_offset,
                    operand: operand_offset,
                });
                self.write_back(pending, dst_offset, size);
            }
            IrInstruction::Convert { dst, src, from, to } => {
                let from_ty = self.vm_type(*from);
                let to_ty = self.vm_type(*to);
                let src_offset = self.read_operand(layout, *src, from_ty.size(), layout.scratch[0]);
                let (dst_offset, pending) = self.resolve_dst(layout, *dst);
                self.emit(Instruction::Convert {
                    dst: dst_offset,
                    src: src_offset,
                    from: from_ty,
                    to: to_ty,
                });
                self.write_back(pending, dst_offset, to_ty.size());
            }
            IrInstruction::Call {
                function: callee,
                arguments,
                dst,
            } => {
                let callee_ir = &self.ir.functions[self.ir.function_map[callee]];
                let (parameter_offsets, _) = self.parameter_block(callee_ir);

                for (argument, (block_offset, size)) in
                    arguments.iter().zip(parameter_offsets.iter())
                {
                    let slot = (layout.argument_area + block_offset) as i32;
                    self.copy_into_slot(layout, *argument, slot, *size);
                }

                let call = self.emit(Instruction::Call {
                    target: 0,
                    argument_offset: layout.argument_area as i32,
                });
                self.call_patches.push((call, *callee));

                if let Some(dst) = dst {
                    let size = self.return_size(callee_ir);
                    let (dst_offset, pending) = self.resolve_dst(layout, *dst);
                    self.emit(Instruction::LoadReturnValue {
                        dst: dst_offset,
                        size: size as i32,
                    });
                    self.write_back(pending, dst_offset, size);
                }
            }
            IrInstruction::CallHardcoded {
                function: hardcoded,
                arguments,
                dst,
            } => {
                let mut cursor = 0usize;
                for argument in arguments {
                    let ty = function.registers[argument.register].ty;
                    let size = self.info.types.size_of(ty);
                    let alignment = self.info.types.alignment_of(ty).max(1);
                    cursor = align_next_multiple(cursor, alignment);
                    let slot = (layout.argument_area + cursor) as i32;
                    self.copy_into_slot(layout, *argument, slot, size);
                    cursor += size;
                }
                self.emit(Instruction::CallHardcoded {
                    function: *hardcoded,
                    argument_offset: layout.argument_area as i32,
                });
                if let Some(dst) = dst {
                    let ty = function.registers[dst.register].ty;
                    let size = self.info.types.size_of(ty);
                    let (dst_offset, pending) = self.resolve_dst(layout, *dst);
                    self.emit(Instruction::LoadReturnValue {
                        dst: dst_offset,
                        size: size as i32,
                    });
                    self.write_back(pending, dst_offset, size);
                }
            }
            IrInstruction::Jump { target } => {
                let at = self.emit(Instruction::Jump { target: 0 });
                jump_patches.push((at, *target));
            }
            IrInstruction::JumpOnTrue { condition, target } => {
                let condition_offset = self.read_operand(layout, *condition, 1, layout.scratch[0]);
                let at = self.emit(Instruction::JumpOnTrue {
                    condition: condition_offset,
                    target: 0,
                });
                jump_patches.push((at, *target));
            }
            IrInstruction::JumpOnFalse { condition, target } => {
                let condition_offset = self.read_operand(layout, *condition, 1, layout.scratch[0]);
                let at = self.emit(Instruction::JumpOnFalse {
                    condition: condition_offset,
                    target: 0,
                });
                jump_patches.push((at, *target));
            }
            IrInstruction::Return { value } => match value {
                Some(value) => {
                    let ty = function.registers[value.register].ty;
                    let size = self.info.types.size_of(ty);
                    let offset = self.read_operand(layout, *value, size, layout.scratch[0]);
                    self.emit(Instruction::Return {
                        value_offset: offset,
                        size: size as i32,
                    });
                }
                None => {
                    self.emit(Instruction::Return {
                        value_offset: 0,
                        size: 0,
                    });
                }
            },
            IrInstruction::ErrorTrap { code } => {
                self.emit(Instruction::Exit { code: *code });
            }
        }
    }

    /// Copies an IR operand into a direct stack slot (argument area).
    fn copy_into_slot(&mut self, layout: &Layout, operand: IrOperand, slot: i32, size: usize) {
        if size == 0 {
            return;
        }
        let register_offset = layout.register_offsets[operand.register];
        match operand.mode {
            AccessMode::Register => {
                self.emit(Instruction::Move {
                    dst: slot,
                    src: register_offset,
                    size: size as i32,
                });
            }
            AccessMode::Memory => {
                self.emit(Instruction::ReadMemory {
                    dst: slot,
                    address: register_offset,
                    size: size as i32,
                });
            }
        }
    }

    fn intern_string(&mut self, value: Ident) -> (usize, usize) {
        if let Some(&cached) = self.string_offsets.get(&value) {
            return cached;
        }
        let text = upp_base::identifier_pool().resolve_owned(value);
        let offset = self.program.constant_data.len();
        self.program.constant_data.extend_from_slice(text.as_bytes());
        let entry = (offset, text.len());
        self.string_offsets.insert(value, entry);
        entry
    }
}
