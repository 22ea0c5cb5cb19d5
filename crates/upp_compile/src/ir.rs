//! The intermediate program: typed registers and access-moded
//! instructions.
//!
//! Each analysed function lowers to an [`IrFunction`]: a list of typed
//! registers (parameters, named locals, temporaries) plus a linear
//! instruction list. Instruction operands carry an [`AccessMode`]:
//! `Register` addresses the register's stack slot directly, `Memory`
//! means the register holds a pointer and the instruction reads/writes
//! through it. The bytecode generator later assigns stack offsets and
//! expands `Memory` operands into explicit memory traffic.
//!
//! Jumps reference instruction indices within the same function; calls
//! reference the callee's AST function node and are patched against the
//! entry-point table during bytecode generation.

use rustc_hash::FxHashMap;
use upp_base::Ident;
use upp_language::ast::{Binop, Expression, NodeId, Statement, Unop};
use upp_language::{Ast, NodeKind};

use crate::analysis::{MemberAccessInfo, SemanticInfo};
use crate::hardcoded::HardcodedFunction;
use crate::interpreter::ExitCode;
use crate::symbols::{ComptimeValue, SymbolId, SymbolKind};
use crate::types::{Primitive, Type, TypeId};

pub type IrFunctionId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterRole {
    Parameter,
    Local,
    Temporary,
}

#[derive(Debug, Clone, Copy)]
pub struct IrRegister {
    pub ty: TypeId,
    pub role: RegisterRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// The operand is the register's own stack slot.
    Register,
    /// The register holds a pointer; access goes through it.
    Memory,
}

#[derive(Debug, Clone, Copy)]
pub struct IrOperand {
    pub register: usize,
    pub mode: AccessMode,
}

impl IrOperand {
    pub fn register(register: usize) -> IrOperand {
        IrOperand {
            register,
            mode: AccessMode::Register,
        }
    }

    pub fn memory(register: usize) -> IrOperand {
        IrOperand {
            register,
            mode: AccessMode::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum IrConstant {
    Int { value: i64, ty: TypeId },
    Float(f32),
    Bool(bool),
    /// The null pointer.
    Null,
}

#[derive(Debug, Clone)]
pub enum IrInstruction {
    LoadConstant {
        dst: IrOperand,
        value: IrConstant,
    },
    /// Materialises a `[]u8` slice over the interned string's bytes in
    /// the constant data region.
    LoadString {
        dst: IrOperand,
        value: Ident,
    },
    Move {
        dst: IrOperand,
        src: IrOperand,
        ty: TypeId,
    },
    /// dst = address of `register`'s stack slot.
    AddressOf {
        dst: IrOperand,
        register: usize,
    },
    AddressOfGlobal {
        dst: IrOperand,
        offset: usize,
    },
    /// dst = base + offset (byte arithmetic on pointers).
    PointerOffset {
        dst: IrOperand,
        base: IrOperand,
        offset: usize,
    },
    /// dst = base + index * stride; index is an i32.
    PointerIndex {
        dst: IrOperand,
        base: IrOperand,
        index: IrOperand,
        stride: usize,
    },
    Binary {
        op: Binop,
        operand_ty: TypeId,
        dst: IrOperand,
        left: IrOperand,
        right: IrOperand,
    },
    Unary {
        op: Unop,
        operand_ty: TypeId,
        dst: IrOperand,
        operand: IrOperand,
    },
    /// Numeric conversion between primitive types.
    Convert {
        dst: IrOperand,
        src: IrOperand,
        from: TypeId,
        to: TypeId,
    },
    Call {
        function: NodeId,
        arguments: Vec<IrOperand>,
        dst: Option<IrOperand>,
    },
    CallHardcoded {
        function: HardcodedFunction,
        arguments: Vec<IrOperand>,
        dst: Option<IrOperand>,
    },
    Jump {
        target: usize,
    },
    JumpOnTrue {
        condition: IrOperand,
        target: usize,
    },
    JumpOnFalse {
        condition: IrOperand,
        target: usize,
    },
    Return {
        value: Option<IrOperand>,
    },
    /// A static check that survived to runtime.
    ErrorTrap {
        code: ExitCode,
    },
}

#[derive(Debug)]
pub struct IrFunction {
    pub ast_node: NodeId,
    pub name: Option<Ident>,
    pub signature: TypeId,
    pub registers: Vec<IrRegister>,
    pub instructions: Vec<IrInstruction>,
}

#[derive(Debug, Default)]
pub struct IrProgram {
    pub functions: Vec<IrFunction>,
    /// AST function node → generated function.
    pub function_map: FxHashMap<NodeId, IrFunctionId>,
}

/// Generates IR for every analysed function.
pub fn generate_program(ast: &Ast, info: &SemanticInfo) -> IrProgram {
    let mut program = IrProgram::default();
    for &function in &info.functions {
        generate_function(ast, info, &mut program, function);
    }
    program
}

/// Generates one function (idempotent per node).
pub fn generate_function(
    ast: &Ast,
    info: &SemanticInfo,
    program: &mut IrProgram,
    function: NodeId,
) -> IrFunctionId {
    if let Some(&id) = program.function_map.get(&function) {
        return id;
    }

    let NodeKind::Expression(Expression::Function { signature, body }) = &ast.node(function).kind
    else {
        panic!("not a function node");
    };
    let signature_ty = info.expr_types[&function];

    let mut builder = FunctionBuilder::new(ast, info, signature_ty);
    builder.bind_parameters(*signature);
    builder.generate_block(*body);
    builder.finish_fallthrough();

    let id = program.functions.len();
    program.functions.push(IrFunction {
        ast_node: function,
        name: info.function_names.get(&function).copied(),
        signature: signature_ty,
        registers: builder.registers,
        instructions: builder.instructions,
    });
    program.function_map.insert(function, id);
    id
}

/// Generates a synthetic zero-argument entry that evaluates `expr` and
/// returns it; used for comptime evaluation. `signature` must be the
/// interned `() -> result` function type.
pub fn generate_comptime_entry(
    ast: &Ast,
    info: &SemanticInfo,
    program: &mut IrProgram,
    expr: NodeId,
    signature: TypeId,
) -> IrFunctionId {
    let mut builder = FunctionBuilder::new(ast, info, signature);
    let value = builder.generate_expression(expr);
    builder.push(IrInstruction::Return { value: Some(value.0) });

    let id = program.functions.len();
    program.functions.push(IrFunction {
        ast_node: expr,
        name: None,
        signature,
        registers: builder.registers,
        instructions: builder.instructions,
    });
    program.function_map.insert(expr, id);
    id
}

struct LoopFrame {
    label: Option<Ident>,
    is_loop: bool,
    break_patches: Vec<usize>,
    continue_target: usize,
    continue_patches: Vec<usize>,
}

struct FunctionBuilder<'a> {
    ast: &'a Ast,
    info: &'a SemanticInfo,
    registers: Vec<IrRegister>,
    instructions: Vec<IrInstruction>,
    symbol_registers: FxHashMap<SymbolId, usize>,
    loops: Vec<LoopFrame>,
    defers: Vec<NodeId>,
    return_type: TypeId,
}

impl<'a> FunctionBuilder<'a> {
    fn new(ast: &'a Ast, info: &'a SemanticInfo, signature: TypeId) -> FunctionBuilder<'a> {
        let return_type = match info.types.ty(signature) {
            Type::Function(f) => f.return_type,
            _ => info.types.error_type(),
        };
        FunctionBuilder {
            ast,
            info,
            registers: Vec::new(),
            instructions: Vec::new(),
            symbol_registers: FxHashMap::default(),
            loops: Vec::new(),
            defers: Vec::new(),
            return_type,
        }
    }

    fn push(&mut self, instruction: IrInstruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    fn here(&self) -> usize {
        self.instructions.len()
    }

    fn patch_jump(&mut self, at: usize, to: usize) {
        match &mut self.instructions[at] {
            IrInstruction::Jump { target }
            | IrInstruction::JumpOnTrue { target, .. }
            | IrInstruction::JumpOnFalse { target, .. } => *target = to,
            other => panic!("patching a non-jump instruction {other:?}"),
        }
    }

    fn add_register(&mut self, ty: TypeId, role: RegisterRole) -> usize {
        self.registers.push(IrRegister { ty, role });
        self.registers.len() - 1
    }

    fn temp(&mut self, ty: TypeId) -> usize {
        self.add_register(ty, RegisterRole::Temporary)
    }

    fn bind_parameters(&mut self, signature: NodeId) {
        let NodeKind::Expression(Expression::FunctionSignature { parameters, .. }) =
            &self.ast.node(signature).kind
        else {
            return;
        };
        for parameter in parameters {
            let Some(&symbol) = self.info.parameter_symbols.get(parameter) else {
                continue;
            };
            let ty = match self.info.tables.symbol(symbol).kind {
                SymbolKind::Parameter { ty, .. } => ty,
                _ => continue,
            };
            let register = self.add_register(ty, RegisterRole::Parameter);
            self.symbol_registers.insert(symbol, register);
        }
    }

    /// Emits pending defers (innermost last registered, run first) before
    /// leaving the function.
    fn emit_defers(&mut self) {
        for defer in self.defers.clone().into_iter().rev() {
            self.generate_block(defer);
        }
    }

    fn finish_fallthrough(&mut self) {
        self.emit_defers();
        if self.info.types.is_primitive(self.return_type, Primitive::Void) {
            self.push(IrInstruction::Return { value: None });
        } else {
            // A non-void function that runs off its end.
            self.push(IrInstruction::ErrorTrap {
                code: ExitCode::TypeErrorAtRuntime,
            });
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn generate_block(&mut self, block: NodeId) {
        let NodeKind::CodeBlock { statements, .. } = &self.ast.node(block).kind else {
            return;
        };
        for statement in statements.clone() {
            self.generate_statement(statement);
        }
    }

    fn generate_statement(&mut self, statement: NodeId) {
        let NodeKind::Statement(kind) = &self.ast.node(statement).kind else {
            return;
        };
        match kind {
            Statement::Definition { definition } => {
                let definition = *definition;
                let Some(&symbol) = self.info.definition_symbols.get(&definition) else {
                    return;
                };
                let ty = match self.info.tables.symbol(symbol).kind {
                    SymbolKind::Variable { ty, .. } => ty,
                    _ => return,
                };
                if self.info.types.is_error(ty) {
                    return;
                }
                let register = self.add_register(ty, RegisterRole::Local);
                self.symbol_registers.insert(symbol, register);

                let value = match &self.ast.node(definition).kind {
                    NodeKind::Definition { value, .. } => *value,
                    _ => None,
                };
                if let Some(value) = value {
                    let (src, _) = self.generate_expression(value);
                    self.push(IrInstruction::Move {
                        dst: IrOperand::register(register),
                        src,
                        ty,
                    });
                }
            }
            Statement::Block { block } => {
                let block = *block;
                let label = match &self.ast.node(block).kind {
                    NodeKind::CodeBlock { label, .. } => *label,
                    _ => None,
                };
                self.loops.push(LoopFrame {
                    label,
                    is_loop: false,
                    break_patches: Vec::new(),
                    continue_target: 0,
                    continue_patches: Vec::new(),
                });
                self.generate_block(block);
                let frame = self.loops.pop().expect("pushed above");
                let end = self.here();
                for patch in frame.break_patches {
                    self.patch_jump(patch, end);
                }
            }
            Statement::Assignment { left, right, op } => {
                let (left, right, op) = (*left, *right, *op);
                let (dst, ty) = match self.generate_lvalue(left) {
                    Some(result) => result,
                    None => return,
                };
                let (src, _) = self.generate_expression(right);
                match op {
                    None => {
                        self.push(IrInstruction::Move { dst, src, ty });
                    }
                    Some(binop) => {
                        let current = self.temp(ty);
                        self.push(IrInstruction::Move {
                            dst: IrOperand::register(current),
                            src: dst,
                            ty,
                        });
                        let result = self.temp(ty);
                        self.push(IrInstruction::Binary {
                            op: binop,
                            operand_ty: ty,
                            dst: IrOperand::register(result),
                            left: IrOperand::register(current),
                            right: src,
                        });
                        self.push(IrInstruction::Move {
                            dst,
                            src: IrOperand::register(result),
                            ty,
                        });
                    }
                }
            }
            Statement::Expression { expr } => {
                self.generate_expression(*expr);
            }
            Statement::Defer { block } => {
                self.defers.push(*block);
            }
            Statement::If {
                condition,
                block,
                else_block,
            } => {
                let (condition, block, else_block) = (*condition, *block, *else_block);
                let (cond, _) = self.generate_expression(condition);
                let to_else = self.push(IrInstruction::JumpOnFalse {
                    condition: cond,
                    target: 0,
                });
                self.generate_block(block);
                match else_block {
                    Some(else_block) => {
                        let skip_else = self.push(IrInstruction::Jump { target: 0 });
                        let else_start = self.here();
                        self.patch_jump(to_else, else_start);
                        self.generate_block(else_block);
                        let end = self.here();
                        self.patch_jump(skip_else, end);
                    }
                    None => {
                        let end = self.here();
                        self.patch_jump(to_else, end);
                    }
                }
            }
            Statement::While { condition, block } => {
                let (condition, block) = (*condition, *block);
                let check = self.here();
                let (cond, _) = self.generate_expression(condition);
                let exit_jump = self.push(IrInstruction::JumpOnFalse {
                    condition: cond,
                    target: 0,
                });
                self.loops.push(LoopFrame {
                    label: None,
                    is_loop: true,
                    break_patches: Vec::new(),
                    continue_target: check,
                    continue_patches: Vec::new(),
                });
                self.generate_block(block);
                self.push(IrInstruction::Jump { target: check });
                let frame = self.loops.pop().expect("pushed above");
                let end = self.here();
                self.patch_jump(exit_jump, end);
                for patch in frame.break_patches {
                    self.patch_jump(patch, end);
                }
                for patch in frame.continue_patches {
                    self.patch_jump(patch, frame.continue_target);
                }
            }
            Statement::Switch { condition, cases } => {
                self.generate_switch(*condition, cases.clone());
            }
            Statement::Break { label } => {
                let jump = self.push(IrInstruction::Jump { target: 0 });
                if let Some(frame) = self.find_break_frame(*label) {
                    frame.break_patches.push(jump);
                }
            }
            Statement::Continue { label } => {
                let label = *label;
                let jump = self.push(IrInstruction::Jump { target: 0 });
                let frame = self
                    .loops
                    .iter_mut()
                    .rev()
                    .find(|f| f.is_loop && (label.is_none() || f.label == label));
                if let Some(frame) = frame {
                    frame.continue_patches.push(jump);
                }
            }
            Statement::Return { value } => {
                let value = value.map(|v| self.generate_expression(v).0);
                self.emit_defers();
                self.push(IrInstruction::Return { value });
            }
            Statement::Delete { expr } => {
                let expr = *expr;
                let (operand, ty) = self.generate_expression(expr);
                // Deleting a slice frees its data pointer.
                let pointer = match self.info.types.ty(ty) {
                    Type::Slice(_) => {
                        let address = self.operand_address(operand, ty);
                        let data_ptr = self.temp_pointer();
                        self.push(IrInstruction::Move {
                            dst: IrOperand::register(data_ptr),
                            src: IrOperand::memory(address),
                            ty: self.pointer_placeholder(),
                        });
                        IrOperand::register(data_ptr)
                    }
                    _ => operand,
                };
                self.push(IrInstruction::CallHardcoded {
                    function: HardcodedFunction::FreePointer,
                    arguments: vec![pointer],
                    dst: None,
                });
            }
        }
    }

    fn find_break_frame(&mut self, label: Option<Ident>) -> Option<&mut LoopFrame> {
        match label {
            None => self.loops.iter_mut().rev().find(|f| f.is_loop),
            Some(label) => self
                .loops
                .iter_mut()
                .rev()
                .find(|f| f.label == Some(label)),
        }
    }

    fn generate_switch(&mut self, condition: NodeId, cases: Vec<NodeId>) {
        let (cond, cond_ty) = self.generate_expression(condition);
        let i32_ty = self.info.types.primitive(Primitive::I32);

        let mut case_jumps = Vec::new();
        let mut default_case = None;
        for case in &cases {
            let NodeKind::SwitchCase { value, block } = &self.ast.node(*case).kind else {
                continue;
            };
            match value {
                Some(value) => {
                    let case_value = self
                        .info
                        .comptime_folds
                        .get(value)
                        .copied()
                        .unwrap_or(ComptimeValue::Int(0));
                    let constant = match case_value {
                        ComptimeValue::Int(v) => v,
                        _ => 0,
                    };
                    let value_reg = self.temp(cond_ty);
                    self.push(IrInstruction::LoadConstant {
                        dst: IrOperand::register(value_reg),
                        value: IrConstant::Int {
                            value: constant,
                            ty: cond_ty,
                        },
                    });
                    let test = self.temp(self.info.types.primitive(Primitive::Bool));
                    self.push(IrInstruction::Binary {
                        op: Binop::Equal,
                        operand_ty: i32_ty,
                        dst: IrOperand::register(test),
                        left: cond,
                        right: IrOperand::register(value_reg),
                    });
                    let jump = self.push(IrInstruction::JumpOnTrue {
                        condition: IrOperand::register(test),
                        target: 0,
                    });
                    case_jumps.push((jump, *block));
                }
                None => default_case = Some(*block),
            }
        }

        let after_tests = self.push(IrInstruction::Jump { target: 0 });
        let mut end_jumps = Vec::new();
        let mut case_targets = Vec::new();
        for (jump, block) in &case_jumps {
            let start = self.here();
            case_targets.push((*jump, start));
            self.generate_block(*block);
            end_jumps.push(self.push(IrInstruction::Jump { target: 0 }));
        }
        let default_start = self.here();
        if let Some(block) = default_case {
            self.generate_block(block);
        }
        let end = self.here();

        for (jump, start) in case_targets {
            self.patch_jump(jump, start);
        }
        self.patch_jump(after_tests, default_start);
        for jump in end_jumps {
            self.patch_jump(jump, end);
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr_type(&self, expr: NodeId) -> TypeId {
        self.info
            .expr_types
            .get(&expr)
            .copied()
            .unwrap_or_else(|| self.info.types.error_type())
    }

    fn pointer_placeholder(&self) -> TypeId {
        self.info.types.primitive(Primitive::U64)
    }

    fn temp_pointer(&mut self) -> usize {
        let ty = self.pointer_placeholder();
        self.temp(ty)
    }

    /// Evaluates an expression, returning where the value lives.
    fn generate_expression(&mut self, expr: NodeId) -> (IrOperand, TypeId) {
        let ty = self.expr_type(expr);

        // Comptime-folded expressions load their constant directly.
        if let Some(folded) = self.info.comptime_folds.get(&expr).copied() {
            return (self.load_comptime(folded, ty), ty);
        }

        let NodeKind::Expression(expression) = &self.ast.node(expr).kind else {
            return self.error_value(ty);
        };

        match expression {
            Expression::Literal { value } => {
                let value = *value;
                let dst = self.temp(ty);
                match value {
                    upp_source::LiteralValue::Integer(v) => {
                        self.push(IrInstruction::LoadConstant {
                            dst: IrOperand::register(dst),
                            value: IrConstant::Int { value: v, ty },
                        });
                    }
                    upp_source::LiteralValue::Float(v) => {
                        self.push(IrInstruction::LoadConstant {
                            dst: IrOperand::register(dst),
                            value: IrConstant::Float(v as f32),
                        });
                    }
                    upp_source::LiteralValue::Boolean(v) => {
                        self.push(IrInstruction::LoadConstant {
                            dst: IrOperand::register(dst),
                            value: IrConstant::Bool(v),
                        });
                    }
                    upp_source::LiteralValue::Null => {
                        self.push(IrInstruction::LoadConstant {
                            dst: IrOperand::register(dst),
                            value: IrConstant::Null,
                        });
                    }
                    upp_source::LiteralValue::String(text) => {
                        self.push(IrInstruction::LoadString {
                            dst: IrOperand::register(dst),
                            value: text,
                        });
                    }
                }
                (IrOperand::register(dst), ty)
            }
            Expression::SymbolRead { read } => {
                let Some(symbol) = self.info.resolved_terminal(self.ast, *read) else {
                    return self.error_value(ty);
                };
                self.read_symbol(symbol, ty)
            }
            Expression::Binop { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                let operand_ty = self.expr_type(left);
                let (l, _) = self.generate_expression(left);
                let (r, _) = self.generate_expression(right);
                let dst = self.temp(ty);
                self.push(IrInstruction::Binary {
                    op,
                    operand_ty,
                    dst: IrOperand::register(dst),
                    left: l,
                    right: r,
                });
                (IrOperand::register(dst), ty)
            }
            Expression::Unop { op, expr: operand } => {
                let (op, operand) = (*op, *operand);
                match op {
                    Unop::Negate | Unop::Not => {
                        let operand_ty = self.expr_type(operand);
                        let (o, _) = self.generate_expression(operand);
                        let dst = self.temp(ty);
                        self.push(IrInstruction::Unary {
                            op,
                            operand_ty,
                            dst: IrOperand::register(dst),
                            operand: o,
                        });
                        (IrOperand::register(dst), ty)
                    }
                    Unop::Pointer => {
                        // Address of the operand.
                        let address = match self.generate_lvalue(operand) {
                            Some((lvalue, lvalue_ty)) => self.operand_address(lvalue, lvalue_ty),
                            None => return self.error_value(ty),
                        };
                        (IrOperand::register(address), ty)
                    }
                    Unop::Dereference => {
                        // Read through the pointer value.
                        let (pointer, _) = self.generate_expression(operand);
                        let pointer_reg = self.materialize(pointer, self.pointer_placeholder());
                        (IrOperand::memory(pointer_reg), ty)
                    }
                }
            }
            Expression::Call { expr: callee, arguments } => {
                self.generate_call(expr, *callee, arguments.clone(), ty)
            }
            Expression::MemberAccess { .. } => match self.info.member_infos.get(&expr) {
                Some(MemberAccessInfo::EnumMember { value }) => {
                    let folded = ComptimeValue::Int(*value);
                    (self.load_comptime(folded, ty), ty)
                }
                Some(MemberAccessInfo::ArraySize { size }) => {
                    let folded = ComptimeValue::Int(*size as i64);
                    (self.load_comptime(folded, ty), ty)
                }
                _ => match self.generate_lvalue(expr) {
                    Some(result) => result,
                    None => self.error_value(ty),
                },
            },
            Expression::ArrayAccess { .. } => match self.generate_lvalue(expr) {
                Some(result) => result,
                None => self.error_value(ty),
            },
            Expression::New { type_expr: _, count } => self.generate_new(expr, *count, ty),
            Expression::Cast { kind: _, operand, .. } => {
                let operand = *operand;
                let from = self.expr_type(operand);
                let (src, _) = self.generate_expression(operand);
                let dst = self.temp(ty);
                if self.info.types.as_primitive(from).is_some()
                    && self.info.types.as_primitive(ty).is_some()
                {
                    self.push(IrInstruction::Convert {
                        dst: IrOperand::register(dst),
                        src,
                        from,
                        to: ty,
                    });
                } else {
                    // Pointer casts are bit copies.
                    self.push(IrInstruction::Move {
                        dst: IrOperand::register(dst),
                        src,
                        ty,
                    });
                }
                (IrOperand::register(dst), ty)
            }
            Expression::StructInitializer { arguments, .. } => {
                let arguments = arguments.clone();
                let dst = self.temp(ty);
                let base = self.temp_pointer();
                self.push(IrInstruction::AddressOf {
                    dst: IrOperand::register(base),
                    register: dst,
                });
                let order = self
                    .info
                    .initializer_fields
                    .get(&expr)
                    .cloned()
                    .unwrap_or_default();
                for (argument, field_index) in arguments.iter().zip(order) {
                    let NodeKind::Argument { value, .. } = &self.ast.node(*argument).kind else {
                        continue;
                    };
                    let value = *value;
                    let Some(field) = self.field_at(ty, field_index) else {
                        continue;
                    };
                    let (src, _) = self.generate_expression(value);
                    let slot = self.temp_pointer();
                    self.push(IrInstruction::PointerOffset {
                        dst: IrOperand::register(slot),
                        base: IrOperand::register(base),
                        offset: field.1,
                    });
                    self.push(IrInstruction::Move {
                        dst: IrOperand::memory(slot),
                        src,
                        ty: field.0,
                    });
                }
                (IrOperand::register(dst), ty)
            }
            Expression::ArrayInitializer { values, .. } => {
                let values = values.clone();
                let dst = self.temp(ty);
                let (element, stride) = match self.info.types.ty(ty) {
                    Type::Array { element, .. } => {
                        let element = *element;
                        let size = self.info.types.size_of(element);
                        let alignment = self.info.types.alignment_of(element).max(1);
                        (element, crate::types::align_next_multiple(size, alignment))
                    }
                    _ => return self.error_value(ty),
                };
                let base = self.temp_pointer();
                self.push(IrInstruction::AddressOf {
                    dst: IrOperand::register(base),
                    register: dst,
                });
                for (index, value) in values.iter().enumerate() {
                    let (src, _) = self.generate_expression(*value);
                    let slot = self.temp_pointer();
                    self.push(IrInstruction::PointerOffset {
                        dst: IrOperand::register(slot),
                        base: IrOperand::register(base),
                        offset: index * stride,
                    });
                    self.push(IrInstruction::Move {
                        dst: IrOperand::memory(slot),
                        src,
                        ty: element,
                    });
                }
                (IrOperand::register(dst), ty)
            }
            Expression::Error => self.error_value(ty),
            _ => self.error_value(ty),
        }
    }

    /// Loads a folded constant into a fresh register.
    fn load_comptime(&mut self, value: ComptimeValue, ty: TypeId) -> IrOperand {
        let dst = self.temp(ty);
        let constant = match value {
            ComptimeValue::Int(v) => IrConstant::Int { value: v, ty },
            ComptimeValue::Float(v) => IrConstant::Float(v),
            ComptimeValue::Bool(v) => IrConstant::Bool(v),
        };
        self.push(IrInstruction::LoadConstant {
            dst: IrOperand::register(dst),
            value: constant,
        });
        IrOperand::register(dst)
    }

    fn error_value(&mut self, ty: TypeId) -> (IrOperand, TypeId) {
        let dst = self.temp(ty);
        (IrOperand::register(dst), ty)
    }

    fn read_symbol(&mut self, symbol: SymbolId, ty: TypeId) -> (IrOperand, TypeId) {
        let symbol = self.info.tables.resolve_alias(symbol);
        match self.info.tables.symbol(symbol).kind.clone() {
            SymbolKind::Variable { .. } | SymbolKind::Parameter { .. } => {
                match self.symbol_registers.get(&symbol) {
                    Some(&register) => (IrOperand::register(register), ty),
                    None => self.error_value(ty),
                }
            }
            SymbolKind::ComptimeValue { value, .. } => (self.load_comptime(value, ty), ty),
            SymbolKind::Global { offset, .. } => {
                let pointer = self.temp_pointer();
                self.push(IrInstruction::AddressOfGlobal {
                    dst: IrOperand::register(pointer),
                    offset,
                });
                (IrOperand::memory(pointer), ty)
            }
            _ => self.error_value(ty),
        }
    }

    fn generate_call(
        &mut self,
        call: NodeId,
        callee: NodeId,
        arguments: Vec<NodeId>,
        ty: TypeId,
    ) -> (IrOperand, TypeId) {
        let mut args = Vec::with_capacity(arguments.len());
        let order = self
            .info
            .call_argument_order
            .get(&call)
            .cloned()
            .unwrap_or_else(|| (0..arguments.len()).collect());
        let mut evaluated: Vec<Option<IrOperand>> = vec![None; arguments.len()];
        for (position, argument) in arguments.iter().enumerate() {
            let NodeKind::Argument { value, .. } = &self.ast.node(*argument).kind else {
                continue;
            };
            let (operand, _) = self.generate_expression(*value);
            evaluated[position] = Some(operand);
        }
        // Reorder named arguments into parameter order.
        let mut by_parameter: Vec<(usize, IrOperand)> = Vec::new();
        for (position, operand) in evaluated.into_iter().enumerate() {
            if let (Some(operand), Some(&parameter)) = (operand, order.get(position)) {
                by_parameter.push((parameter, operand));
            }
        }
        by_parameter.sort_by_key(|(parameter, _)| *parameter);
        for (_, operand) in by_parameter {
            args.push(operand);
        }

        let returns_value = !self.info.types.is_primitive(ty, Primitive::Void)
            && !self.info.types.is_error(ty);
        let dst = if returns_value {
            Some(IrOperand::register(self.temp(ty)))
        } else {
            None
        };

        let Some(target) = self.info.call_targets.get(&call) else {
            return self.error_value(ty);
        };
        match *target {
            crate::analysis::CallTarget::Function { function } => {
                self.push(IrInstruction::Call {
                    function,
                    arguments: args,
                    dst,
                });
            }
            crate::analysis::CallTarget::Hardcoded { function } => {
                self.push(IrInstruction::CallHardcoded {
                    function,
                    arguments: args,
                    dst,
                });
            }
        }
        let _ = callee;
        match dst {
            Some(dst) => (dst, ty),
            None => self.error_value(ty),
        }
    }

    fn generate_new(
        &mut self,
        expr: NodeId,
        count: Option<NodeId>,
        ty: TypeId,
    ) -> (IrOperand, TypeId) {
        let i32_ty = self.info.types.primitive(Primitive::I32);
        match self.info.types.ty(ty).clone() {
            Type::Pointer(pointee) => {
                let size = self.info.types.size_of(pointee).max(1);
                let size_reg = self.temp(i32_ty);
                self.push(IrInstruction::LoadConstant {
                    dst: IrOperand::register(size_reg),
                    value: IrConstant::Int {
                        value: size as i64,
                        ty: i32_ty,
                    },
                });
                let dst = self.temp(ty);
                self.push(IrInstruction::CallHardcoded {
                    function: HardcodedFunction::MallocSizeI32,
                    arguments: vec![IrOperand::register(size_reg)],
                    dst: Some(IrOperand::register(dst)),
                });
                (IrOperand::register(dst), ty)
            }
            Type::Slice(element) => {
                let stride = {
                    let size = self.info.types.size_of(element);
                    let alignment = self.info.types.alignment_of(element).max(1);
                    crate::types::align_next_multiple(size, alignment).max(1)
                };
                let count_expr = count.expect("slice new has a count");
                let (count_operand, _) = self.generate_expression(count_expr);
                let count_reg = self.materialize(count_operand, i32_ty);

                let stride_reg = self.temp(i32_ty);
                self.push(IrInstruction::LoadConstant {
                    dst: IrOperand::register(stride_reg),
                    value: IrConstant::Int {
                        value: stride as i64,
                        ty: i32_ty,
                    },
                });
                let byte_count = self.temp(i32_ty);
                self.push(IrInstruction::Binary {
                    op: Binop::Multiplication,
                    operand_ty: i32_ty,
                    dst: IrOperand::register(byte_count),
                    left: IrOperand::register(count_reg),
                    right: IrOperand::register(stride_reg),
                });

                let pointer = self.temp_pointer();
                self.push(IrInstruction::CallHardcoded {
                    function: HardcodedFunction::MallocSizeI32,
                    arguments: vec![IrOperand::register(byte_count)],
                    dst: Some(IrOperand::register(pointer)),
                });

                // Assemble the slice: pointer at +0, length (i64) at +8.
                let dst = self.temp(ty);
                let base = self.temp_pointer();
                self.push(IrInstruction::AddressOf {
                    dst: IrOperand::register(base),
                    register: dst,
                });
                self.push(IrInstruction::Move {
                    dst: IrOperand::memory(base),
                    src: IrOperand::register(pointer),
                    ty: self.pointer_placeholder(),
                });
                let length_slot = self.temp_pointer();
                self.push(IrInstruction::PointerOffset {
                    dst: IrOperand::register(length_slot),
                    base: IrOperand::register(base),
                    offset: 8,
                });
                let i64_ty = self.info.types.primitive(Primitive::I64);
                let length = self.temp(i64_ty);
                self.push(IrInstruction::Convert {
                    dst: IrOperand::register(length),
                    src: IrOperand::register(count_reg),
                    from: i32_ty,
                    to: i64_ty,
                });
                self.push(IrInstruction::Move {
                    dst: IrOperand::memory(length_slot),
                    src: IrOperand::register(length),
                    ty: i64_ty,
                });
                (IrOperand::register(dst), ty)
            }
            _ => {
                let _ = expr;
                self.error_value(ty)
            }
        }
    }

    // ------------------------------------------------------------------
    // Lvalues and addresses
    // ------------------------------------------------------------------

    /// Where an assignable expression lives. `Register` mode addresses a
    /// local slot, `Memory` mode a computed pointer.
    fn generate_lvalue(&mut self, expr: NodeId) -> Option<(IrOperand, TypeId)> {
        let ty = self.expr_type(expr);
        let NodeKind::Expression(expression) = &self.ast.node(expr).kind else {
            return None;
        };
        match expression {
            Expression::SymbolRead { read } => {
                let symbol = self.info.resolved_terminal(self.ast, *read)?;
                let symbol = self.info.tables.resolve_alias(symbol);
                match self.info.tables.symbol(symbol).kind.clone() {
                    SymbolKind::Variable { .. } | SymbolKind::Parameter { .. } => {
                        let register = *self.symbol_registers.get(&symbol)?;
                        Some((IrOperand::register(register), ty))
                    }
                    SymbolKind::Global { offset, .. } => {
                        let pointer = self.temp_pointer();
                        self.push(IrInstruction::AddressOfGlobal {
                            dst: IrOperand::register(pointer),
                            offset,
                        });
                        Some((IrOperand::memory(pointer), ty))
                    }
                    _ => None,
                }
            }
            Expression::MemberAccess { expr: base, .. } => {
                let base = *base;
                let info = self.info.member_infos.get(&expr)?;
                match info {
                    MemberAccessInfo::StructField {
                        offset,
                        ty: field_ty,
                        through_pointer,
                    } => {
                        let (offset, field_ty, through_pointer) =
                            (*offset, *field_ty, *through_pointer);
                        let base_ty = self.expr_type(base);
                        let address = if through_pointer {
                            // The pointer's value is the aggregate address.
                            let (pointer, _) = self.generate_expression(base);
                            self.materialize(pointer, self.pointer_placeholder())
                        } else {
                            self.expression_address(base, base_ty)?
                        };
                        let slot = self.temp_pointer();
                        self.push(IrInstruction::PointerOffset {
                            dst: IrOperand::register(slot),
                            base: IrOperand::register(address),
                            offset,
                        });
                        Some((IrOperand::memory(slot), field_ty))
                    }
                    MemberAccessInfo::SliceSize => {
                        let base_ty = self.expr_type(base);
                        let address = self.expression_address(base, base_ty)?;
                        let slot = self.temp_pointer();
                        self.push(IrInstruction::PointerOffset {
                            dst: IrOperand::register(slot),
                            base: IrOperand::register(address),
                            offset: 8,
                        });
                        Some((IrOperand::memory(slot), ty))
                    }
                    _ => None,
                }
            }
            Expression::ArrayAccess { array, index } => {
                let (array, index) = (*array, *index);
                let array_ty = self.expr_type(array);
                let (index_operand, _) = self.generate_expression(index);
                let i32_ty = self.info.types.primitive(Primitive::I32);
                let index_reg = self.materialize(index_operand, i32_ty);

                match self.info.types.ty(array_ty).clone() {
                    Type::Array { size, element } => {
                        let stride = {
                            let s = self.info.types.size_of(element);
                            let a = self.info.types.alignment_of(element).max(1);
                            crate::types::align_next_multiple(s, a).max(1)
                        };
                        self.emit_static_bounds_check(index_reg, size as i64);
                        let base = self.expression_address(array, array_ty)?;
                        let slot = self.temp_pointer();
                        self.push(IrInstruction::PointerIndex {
                            dst: IrOperand::register(slot),
                            base: IrOperand::register(base),
                            index: IrOperand::register(index_reg),
                            stride,
                        });
                        Some((IrOperand::memory(slot), ty))
                    }
                    Type::Slice(element) => {
                        let stride = {
                            let s = self.info.types.size_of(element);
                            let a = self.info.types.alignment_of(element).max(1);
                            crate::types::align_next_multiple(s, a).max(1)
                        };
                        let base_address = self.expression_address(array, array_ty)?;
                        self.emit_slice_bounds_check(index_reg, base_address);
                        // Load the data pointer stored at +0.
                        let data = self.temp_pointer();
                        self.push(IrInstruction::Move {
                            dst: IrOperand::register(data),
                            src: IrOperand::memory(base_address),
                            ty: self.pointer_placeholder(),
                        });
                        let slot = self.temp_pointer();
                        self.push(IrInstruction::PointerIndex {
                            dst: IrOperand::register(slot),
                            base: IrOperand::register(data),
                            index: IrOperand::register(index_reg),
                            stride,
                        });
                        Some((IrOperand::memory(slot), ty))
                    }
                    _ => None,
                }
            }
            Expression::Unop {
                op: Unop::Dereference,
                expr: pointer,
            } => {
                let (pointer_value, _) = self.generate_expression(*pointer);
                let pointer_reg = self.materialize(pointer_value, self.pointer_placeholder());
                Some((IrOperand::memory(pointer_reg), ty))
            }
            _ => None,
        }
    }

    /// `index >= 0 && index < size`, trapping OUT_OF_BOUNDS otherwise.
    fn emit_static_bounds_check(&mut self, index_reg: usize, size: i64) {
        let i32_ty = self.info.types.primitive(Primitive::I32);
        let bool_ty = self.info.types.primitive(Primitive::Bool);
        let size_reg = self.temp(i32_ty);
        self.push(IrInstruction::LoadConstant {
            dst: IrOperand::register(size_reg),
            value: IrConstant::Int {
                value: size,
                ty: i32_ty,
            },
        });
        let zero = self.temp(i32_ty);
        self.push(IrInstruction::LoadConstant {
            dst: IrOperand::register(zero),
            value: IrConstant::Int { value: 0, ty: i32_ty },
        });
        let in_lower = self.temp(bool_ty);
        self.push(IrInstruction::Binary {
            op: Binop::GreaterOrEqual,
            operand_ty: i32_ty,
            dst: IrOperand::register(in_lower),
            left: IrOperand::register(index_reg),
            right: IrOperand::register(zero),
        });
        let in_upper = self.temp(bool_ty);
        self.push(IrInstruction::Binary {
            op: Binop::Less,
            operand_ty: i32_ty,
            dst: IrOperand::register(in_upper),
            left: IrOperand::register(index_reg),
            right: IrOperand::register(size_reg),
        });
        let both = self.temp(bool_ty);
        self.push(IrInstruction::Binary {
            op: Binop::And,
            operand_ty: bool_ty,
            dst: IrOperand::register(both),
            left: IrOperand::register(in_lower),
            right: IrOperand::register(in_upper),
        });
        let ok = self.push(IrInstruction::JumpOnTrue {
            condition: IrOperand::register(both),
            target: 0,
        });
        self.push(IrInstruction::ErrorTrap {
            code: ExitCode::OutOfBounds,
        });
        let after = self.here();
        self.patch_jump(ok, after);
    }

    /// Bounds check against a slice's runtime length at `slice_address`.
    fn emit_slice_bounds_check(&mut self, index_reg: usize, slice_address: usize) {
        let i32_ty = self.info.types.primitive(Primitive::I32);
        let i64_ty = self.info.types.primitive(Primitive::I64);
        let bool_ty = self.info.types.primitive(Primitive::Bool);

        let length_slot = self.temp_pointer();
        self.push(IrInstruction::PointerOffset {
            dst: IrOperand::register(length_slot),
            base: IrOperand::register(slice_address),
            offset: 8,
        });
        let length = self.temp(i64_ty);
        self.push(IrInstruction::Move {
            dst: IrOperand::register(length),
            src: IrOperand::memory(length_slot),
            ty: i64_ty,
        });
        let index_wide = self.temp(i64_ty);
        self.push(IrInstruction::Convert {
            dst: IrOperand::register(index_wide),
            src: IrOperand::register(index_reg),
            from: i32_ty,
            to: i64_ty,
        });
        let zero = self.temp(i64_ty);
        self.push(IrInstruction::LoadConstant {
            dst: IrOperand::register(zero),
            value: IrConstant::Int { value: 0, ty: i64_ty },
        });
        let in_lower = self.temp(bool_ty);
        self.push(IrInstruction::Binary {
            op: Binop::GreaterOrEqual,
            operand_ty: i64_ty,
            dst: IrOperand::register(in_lower),
            left: IrOperand::register(index_wide),
            right: IrOperand::register(zero),
        });
        let in_upper = self.temp(bool_ty);
        self.push(IrInstruction::Binary {
            op: Binop::Less,
            operand_ty: i64_ty,
            dst: IrOperand::register(in_upper),
            left: IrOperand::register(index_wide),
            right: IrOperand::register(length),
        });
        let both = self.temp(bool_ty);
        self.push(IrInstruction::Binary {
            op: Binop::And,
            operand_ty: bool_ty,
            dst: IrOperand::register(both),
            left: IrOperand::register(in_lower),
            right: IrOperand::register(in_upper),
        });
        let ok = self.push(IrInstruction::JumpOnTrue {
            condition: IrOperand::register(both),
            target: 0,
        });
        self.push(IrInstruction::ErrorTrap {
            code: ExitCode::OutOfBounds,
        });
        let after = self.here();
        self.patch_jump(ok, after);
    }

    /// The address of an expression's storage, materialising a temporary
    /// when the value has no home of its own.
    fn expression_address(&mut self, expr: NodeId, ty: TypeId) -> Option<usize> {
        if let Some((operand, operand_ty)) = self.generate_lvalue(expr) {
            return Some(self.operand_address(operand, operand_ty));
        }
        // Spill an rvalue into a temporary and take its address.
        let (value, value_ty) = self.generate_expression(expr);
        let spill = self.temp(ty);
        self.push(IrInstruction::Move {
            dst: IrOperand::register(spill),
            src: value,
            ty: value_ty,
        });
        let address = self.temp_pointer();
        self.push(IrInstruction::AddressOf {
            dst: IrOperand::register(address),
            register: spill,
        });
        Some(address)
    }

    /// A register holding the address of `operand`.
    fn operand_address(&mut self, operand: IrOperand, ty: TypeId) -> usize {
        match operand.mode {
            AccessMode::Memory => operand.register,
            AccessMode::Register => {
                let _ = ty;
                let address = self.temp_pointer();
                self.push(IrInstruction::AddressOf {
                    dst: IrOperand::register(address),
                    register: operand.register,
                });
                address
            }
        }
    }

    fn field_at(&self, ty: TypeId, index: usize) -> Option<(TypeId, usize)> {
        match self.info.types.ty(ty) {
            Type::Struct(s) => s.fields.get(index).map(|f| (f.ty, f.offset)),
            Type::Union(u) => u.variants.get(index).map(|f| (f.ty, f.offset)),
            _ => None,
        }
    }

    /// Copies `operand` into a plain register when it is a memory
    /// operand, so instructions that need a register value can use it.
    fn materialize(&mut self, operand: IrOperand, ty: TypeId) -> usize {
        match operand.mode {
            AccessMode::Register => operand.register,
            AccessMode::Memory => {
                let dst = self.temp(ty);
                self.push(IrInstruction::Move {
                    dst: IrOperand::register(dst),
                    src: operand,
                    ty,
                });
                dst
            }
        }
    }
}
