//! Statement and expression checking.
//!
//! This file carries the type rules: operator and call compatibility,
//! assignability, switch exhaustiveness, and the split between *type
//! expressions* (definition annotations, parameter types, `new`/`cast`
//! targets) and *value expressions*. An operand that already analysed to
//! the ERROR type silences further complaints on its path.

use upp_base::{identifier_pool, Ident};
use upp_language::ast::{Binop, CastKind, Expression, NodeId, Statement, Unop};
use upp_language::NodeKind;

use crate::analysis::{Analyser, CallTarget, MemberAccessInfo};
use crate::hardcoded::HardcodedFunction;
use crate::symbols::{ComptimeValue, SymbolId, SymbolKind, TableId};
use crate::types::{Primitive, Type, TypeId};

/// Break/continue context while walking one function body.
struct BodyContext {
    return_type: TypeId,
    loop_depth: usize,
    labels: Vec<Ident>,
}

impl<'a> Analyser<'a> {
    pub(crate) fn check_function_body(&mut self, function: NodeId) {
        let NodeKind::Expression(Expression::Function { signature, body }) =
            &self.ast.node(function).kind
        else {
            return;
        };
        let (signature, body) = (*signature, *body);
        let Some(&scope) = self.info.function_scopes.get(&function) else {
            return;
        };
        let signature_ty = self.info.expr_types[&function];
        let return_type = match self.info.types.ty(signature_ty) {
            Type::Function(f) => f.return_type,
            _ => self.info.types.error_type(),
        };
        let _ = signature;

        let mut context = BodyContext {
            return_type,
            loop_depth: 0,
            labels: Vec::new(),
        };
        self.analyse_block(body, scope, &mut context);

        let void = self.info.types.primitive(Primitive::Void);
        if return_type != void
            && !self.info.types.is_error(return_type)
            && !self.block_returns(body)
        {
            let range = self.range_of(body);
            self.error("not all paths return a value", range);
        }
    }

    /// Conservative: a block returns iff its last reachable statement
    /// does (an `if` needs both branches to).
    fn block_returns(&self, block: NodeId) -> bool {
        let NodeKind::CodeBlock { statements, .. } = &self.ast.node(block).kind else {
            return false;
        };
        let Some(last) = statements.last() else {
            return false;
        };
        self.statement_returns(*last)
    }

    fn statement_returns(&self, statement: NodeId) -> bool {
        let NodeKind::Statement(kind) = &self.ast.node(statement).kind else {
            return false;
        };
        match kind {
            Statement::Return { .. } => true,
            Statement::If {
                block, else_block, ..
            } => match else_block {
                Some(else_block) => self.block_returns(*block) && self.block_returns(*else_block),
                None => false,
            },
            Statement::Block { block } => self.block_returns(*block),
            Statement::Switch { cases, .. } => {
                !cases.is_empty()
                    && cases.iter().all(|case| {
                        match &self.ast.node(*case).kind {
                            NodeKind::SwitchCase { block, .. } => self.block_returns(*block),
                            _ => false,
                        }
                    })
            }
            _ => false,
        }
    }

    fn analyse_block(&mut self, block: NodeId, parent: TableId, context: &mut BodyContext) {
        let table = self.info.tables.create_table(Some(parent));
        self.info.node_tables.insert(block, table);

        let NodeKind::CodeBlock {
            statements, label, ..
        } = &self.ast.node(block).kind
        else {
            return;
        };
        let (statements, label) = (statements.clone(), *label);
        if let Some(label) = label {
            context.labels.push(label);
        }
        for statement in statements {
            self.analyse_statement(statement, table, context);
        }
        if label.is_some() {
            context.labels.pop();
        }
    }

    fn analyse_statement(&mut self, statement: NodeId, table: TableId, context: &mut BodyContext) {
        let NodeKind::Statement(kind) = &self.ast.node(statement).kind else {
            return;
        };
        match kind {
            Statement::Definition { definition } => {
                self.analyse_local_definition(*definition, table);
            }
            Statement::Block { block } => {
                self.analyse_block(*block, table, context);
            }
            Statement::Assignment { left, right, op } => {
                let (left, right, op) = (*left, *right, *op);
                let left_ty = self.analyse_expression(left, table, None);
                let right_ty = self.analyse_expression(right, table, Some(left_ty));
                if !self.expression_is_assignable(left) {
                    let range = self.range_of(left);
                    self.error("this expression cannot be assigned to", range);
                } else {
                    self.check_types_equal(left_ty, right_ty, right);
                }
                if let Some(op) = op {
                    self.check_binop_operands(op, left_ty, right_ty, statement);
                }
            }
            Statement::Expression { expr } => {
                self.analyse_expression(*expr, table, None);
            }
            Statement::Defer { block } => {
                self.analyse_block(*block, table, context);
            }
            Statement::If {
                condition,
                block,
                else_block,
            } => {
                let (condition, block, else_block) = (*condition, *block, *else_block);
                let condition_ty = self.analyse_expression(condition, table, None);
                self.check_bool_condition(condition_ty, condition);
                self.analyse_block(block, table, context);
                if let Some(else_block) = else_block {
                    self.analyse_block(else_block, table, context);
                }
            }
            Statement::While { condition, block } => {
                let (condition, block) = (*condition, *block);
                let condition_ty = self.analyse_expression(condition, table, None);
                self.check_bool_condition(condition_ty, condition);
                context.loop_depth += 1;
                self.analyse_block(block, table, context);
                context.loop_depth -= 1;
            }
            Statement::Switch { condition, cases } => {
                self.analyse_switch(*condition, cases.clone(), table, context);
            }
            Statement::Break { label } => {
                let label = *label;
                let valid = match label {
                    None => context.loop_depth > 0,
                    Some(label) => context.labels.contains(&label),
                };
                if !valid {
                    let range = self.range_of(statement);
                    self.error("no enclosing loop or labeled block to break out of", range);
                }
            }
            Statement::Continue { label } => {
                let label = *label;
                if context.loop_depth == 0 {
                    let range = self.range_of(statement);
                    self.error("'continue' outside of a loop", range);
                } else if let Some(label) = label {
                    if !context.labels.contains(&label) {
                        let range = self.range_of(statement);
                        self.error("unknown label", range);
                    }
                }
            }
            Statement::Return { value } => {
                let value = *value;
                let void = self.info.types.primitive(Primitive::Void);
                match value {
                    Some(value) => {
                        let ty =
                            self.analyse_expression(value, table, Some(context.return_type));
                        if context.return_type == void {
                            let range = self.range_of(value);
                            self.error("this function does not return a value", range);
                        } else {
                            self.check_types_equal(context.return_type, ty, value);
                        }
                    }
                    None => {
                        if context.return_type != void
                            && !self.info.types.is_error(context.return_type)
                        {
                            let range = self.range_of(statement);
                            self.error("this function must return a value", range);
                        }
                    }
                }
            }
            Statement::Delete { expr } => {
                let expr = *expr;
                let ty = self.analyse_expression(expr, table, None);
                if !matches!(
                    self.info.types.ty(ty),
                    Type::Pointer(_) | Type::Slice(_) | Type::Error
                ) {
                    let range = self.range_of(expr);
                    self.error(
                        format!(
                            "'delete' needs a pointer or slice, not {}",
                            self.info.types.display(ty)
                        ),
                        range,
                    );
                }
            }
        }
    }

    fn analyse_local_definition(&mut self, definition: NodeId, table: TableId) {
        let NodeKind::Definition {
            is_comptime,
            name,
            type_expr,
            value,
        } = &self.ast.node(definition).kind
        else {
            return;
        };
        let (is_comptime, name, type_expr, value) = (*is_comptime, *name, *type_expr, *value);

        let declared = type_expr.map(|t| self.analyse_type_expr(t, table));
        let value_ty = value.map(|v| self.analyse_expression(v, table, declared));
        let ty = match declared.or(value_ty) {
            Some(ty) => ty,
            None => {
                let range = self.range_of(definition);
                self.error("a definition needs a type or a value", range);
                return;
            }
        };
        if let (Some(declared), Some(value)) = (declared, value) {
            self.check_types_equal(declared, self.info.expr_types[&value], value);
        }

        let kind = if is_comptime {
            let folded = value.and_then(|v| self.const_fold(v, table));
            match folded {
                Some(folded) => {
                    if let Some(value) = value {
                        self.info.comptime_folds.insert(value, folded);
                    }
                    SymbolKind::ComptimeValue { ty, value: folded }
                }
                None => {
                    let range = self.range_of(definition);
                    self.error(
                        "local comptime definitions must fold to a constant",
                        range,
                    );
                    SymbolKind::Error
                }
            }
        } else {
            SymbolKind::Variable { ty, mutable: true }
        };

        match self.info.tables.define(table, name, kind, Some(definition)) {
            Ok(symbol) => {
                self.info.definition_symbols.insert(definition, symbol);
            }
            Err(existing) => {
                let existing_range = self
                    .info
                    .tables
                    .symbol(existing)
                    .defined_at
                    .map(|n| self.range_of(n));
                let range = self.range_of(definition);
                self.error_with_secondary(
                    format!(
                        "redefinition of '{}' in the same scope",
                        identifier_pool().resolve_owned(name)
                    ),
                    range,
                    existing_range.into_iter().collect(),
                );
            }
        }
    }

    fn analyse_switch(
        &mut self,
        condition: NodeId,
        cases: Vec<NodeId>,
        table: TableId,
        context: &mut BodyContext,
    ) {
        let condition_ty = self.analyse_expression(condition, table, None);
        let enum_members: Option<Vec<(Ident, i64)>> = match self.info.types.ty(condition_ty) {
            Type::Enum(e) => Some(e.members.clone()),
            Type::Error => None,
            _ => {
                let range = self.range_of(condition);
                self.error(
                    format!(
                        "switch conditions must be enums, not {}",
                        self.info.types.display(condition_ty)
                    ),
                    range,
                );
                None
            }
        };

        let mut covered: Vec<i64> = Vec::new();
        let mut has_default = false;
        for case in &cases {
            let NodeKind::SwitchCase { value, block } = &self.ast.node(*case).kind else {
                continue;
            };
            let (value, block) = (*value, *block);
            match value {
                Some(value) => {
                    self.analyse_expression(value, table, Some(condition_ty));
                    let folded = self
                        .info
                        .comptime_folds
                        .get(&value)
                        .copied()
                        .or_else(|| self.const_fold(value, table));
                    match folded {
                        Some(ComptimeValue::Int(v)) => {
                            if covered.contains(&v) {
                                let range = self.range_of(value);
                                self.error("duplicate switch case", range);
                            }
                            covered.push(v);
                            self.info
                                .comptime_folds
                                .insert(value, ComptimeValue::Int(v));
                        }
                        _ => {
                            let range = self.range_of(value);
                            self.error("switch cases must be constant enum values", range);
                        }
                    }
                }
                None => {
                    if has_default {
                        let range = self.range_of(*case);
                        self.error("only one default case is allowed", range);
                    }
                    has_default = true;
                }
            }
            self.analyse_block(block, table, context);
        }

        if let Some(members) = enum_members {
            let missing: Vec<String> = members
                .iter()
                .filter(|(_, v)| !covered.contains(v))
                .map(|(n, _)| identifier_pool().resolve_owned(*n))
                .collect();
            if !has_default && !missing.is_empty() {
                let range = self.range_of(condition);
                self.error(
                    format!(
                        "switch does not cover: {} (add cases or a default)",
                        missing.join(", ")
                    ),
                    range,
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared checks
    // ------------------------------------------------------------------

    pub(crate) fn check_types_equal(&mut self, expected: TypeId, actual: TypeId, node: NodeId) {
        if expected == actual
            || self.info.types.is_error(expected)
            || self.info.types.is_error(actual)
        {
            return;
        }
        let range = self.range_of(node);
        self.error(
            format!(
                "type mismatch: expected {}, found {}",
                self.info.types.display(expected),
                self.info.types.display(actual)
            ),
            range,
        );
    }

    fn check_bool_condition(&mut self, ty: TypeId, node: NodeId) {
        let bool_ty = self.info.types.primitive(Primitive::Bool);
        if ty != bool_ty && !self.info.types.is_error(ty) {
            let range = self.range_of(node);
            self.error(
                format!(
                    "conditions must be bool, not {}",
                    self.info.types.display(ty)
                ),
                range,
            );
        }
    }

    fn check_binop_operands(&mut self, op: Binop, left: TypeId, right: TypeId, node: NodeId) {
        if self.info.types.is_error(left) || self.info.types.is_error(right) {
            return;
        }
        if left != right {
            let range = self.range_of(node);
            self.error(
                format!(
                    "operand types must match: {} vs {}",
                    self.info.types.display(left),
                    self.info.types.display(right)
                ),
                range,
            );
            return;
        }
        let numeric = self
            .info
            .types
            .as_primitive(left)
            .map(|p| p.is_numeric())
            .unwrap_or(false);
        match op {
            Binop::Addition
            | Binop::Subtraction
            | Binop::Multiplication
            | Binop::Division
            | Binop::Modulo => {
                if !numeric {
                    let range = self.range_of(node);
                    self.error(
                        format!(
                            "arithmetic needs numeric operands, not {}",
                            self.info.types.display(left)
                        ),
                        range,
                    );
                }
            }
            Binop::Less | Binop::LessOrEqual | Binop::Greater | Binop::GreaterOrEqual => {
                if !numeric {
                    let range = self.range_of(node);
                    self.error(
                        format!(
                            "comparison needs numeric operands, not {}",
                            self.info.types.display(left)
                        ),
                        range,
                    );
                }
            }
            Binop::And | Binop::Or => {
                let bool_ty = self.info.types.primitive(Primitive::Bool);
                if left != bool_ty {
                    let range = self.range_of(node);
                    self.error("logical operators need bool operands", range);
                }
            }
            Binop::PointerEqual | Binop::PointerNotEqual => {
                if !matches!(self.info.types.ty(left), Type::Pointer(_) | Type::Slice(_)) {
                    let range = self.range_of(node);
                    self.error("pointer comparison needs pointer operands", range);
                }
            }
            Binop::Equal | Binop::NotEqual => {
                let comparable = numeric
                    || matches!(
                        self.info.types.ty(left),
                        Type::Primitive(Primitive::Bool) | Type::Enum(_)
                    );
                if !comparable {
                    let range = self.range_of(node);
                    self.error(
                        format!("cannot compare values of {}", self.info.types.display(left)),
                        range,
                    );
                }
            }
        }
    }

    fn expression_is_assignable(&self, expr: NodeId) -> bool {
        match &self.ast.node(expr).kind {
            NodeKind::Expression(Expression::SymbolRead { read }) => {
                match self.info.resolved_terminal(self.ast, *read) {
                    Some(symbol) => matches!(
                        self.info.tables.symbol(symbol).kind,
                        SymbolKind::Variable { .. }
                            | SymbolKind::Parameter { .. }
                            | SymbolKind::Global { .. }
                    ),
                    None => true, // unresolved already reported
                }
            }
            NodeKind::Expression(Expression::MemberAccess { .. }) => matches!(
                self.info.member_infos.get(&expr),
                Some(MemberAccessInfo::StructField { .. }) | Some(MemberAccessInfo::SliceSize)
            ),
            NodeKind::Expression(Expression::ArrayAccess { .. }) => true,
            NodeKind::Expression(Expression::Unop {
                op: Unop::Dereference,
                ..
            }) => true,
            NodeKind::Expression(Expression::Error) => true,
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Type expressions
    // ------------------------------------------------------------------

    pub(crate) fn analyse_type_expr(&mut self, expr: NodeId, table: TableId) -> TypeId {
        let ty = self.analyse_type_expr_inner(expr, table);
        self.info.expr_types.insert(expr, ty);
        ty
    }

    fn analyse_type_expr_inner(&mut self, expr: NodeId, table: TableId) -> TypeId {
        let error = self.info.types.error_type();
        let NodeKind::Expression(expression) = &self.ast.node(expr).kind else {
            return error;
        };
        match expression {
            Expression::SymbolRead { read } => {
                let read = *read;
                let Some(symbol) = self.resolve_symbol_read(read, table) else {
                    return error;
                };
                match self.info.tables.symbol(symbol).kind {
                    SymbolKind::Type { ty } => ty,
                    SymbolKind::Error | SymbolKind::Unfinished => error,
                    _ => {
                        let range = self.range_of(expr);
                        self.error("expected a type here", range);
                        error
                    }
                }
            }
            Expression::Unop {
                op: Unop::Pointer,
                expr: inner,
            } => {
                let inner = self.analyse_type_expr(*inner, table);
                if self.info.types.is_error(inner) {
                    return error;
                }
                self.info.types.pointer_to(inner)
            }
            Expression::ArrayType { size, element } => {
                let (size, element) = (*size, *element);
                let element_ty = self.analyse_type_expr(element, table);
                let folded = self.const_fold(size, table);
                let length = match folded {
                    Some(ComptimeValue::Int(v)) if v >= 0 => v as usize,
                    _ => {
                        let range = self.range_of(size);
                        self.error(
                            "array sizes must be non-negative constant integers",
                            range,
                        );
                        return error;
                    }
                };
                if self.info.types.is_error(element_ty) {
                    return error;
                }
                self.info.types.array_of(length, element_ty)
            }
            Expression::SliceType { element } => {
                let element_ty = self.analyse_type_expr(*element, table);
                if self.info.types.is_error(element_ty) {
                    return error;
                }
                self.info.types.slice_of(element_ty)
            }
            Expression::FunctionSignature {
                parameters,
                return_type,
            } => {
                let (parameters, return_type) = (parameters.clone(), *return_type);
                let mut parameter_types = Vec::new();
                for parameter in parameters {
                    if let NodeKind::Parameter { type_expr, .. } = &self.ast.node(parameter).kind {
                        let type_expr = *type_expr;
                        parameter_types.push(self.analyse_type_expr(type_expr, table));
                    }
                }
                let return_ty = match return_type {
                    Some(r) => self.analyse_type_expr(r, table),
                    None => self.info.types.primitive(Primitive::Void),
                };
                self.info.types.function_type(parameter_types, return_ty)
            }
            Expression::Error => error,
            _ => {
                let range = self.range_of(expr);
                self.error("expected a type expression", range);
                error
            }
        }
    }

    // ------------------------------------------------------------------
    // Value expressions
    // ------------------------------------------------------------------

    /// Resolves a read chain, records each hop, and returns the terminal
    /// symbol. Reports unresolved names and non-module path hops.
    fn resolve_symbol_read(&mut self, head: NodeId, table: TableId) -> Option<SymbolId> {
        let path = self.ast.symbol_read_path(head);
        let mut current: Option<SymbolId> = None;
        for (position, (node, name)) in path.iter().enumerate() {
            if *name == Ident::EMPTY {
                return None; // parser already reported the missing name
            }
            let symbol = if position == 0 {
                self.info.tables.lookup(table, *name)
            } else {
                let previous = current?;
                match self.info.tables.symbol(previous).kind {
                    SymbolKind::Module { table } => self.info.tables.lookup_local(table, *name),
                    SymbolKind::Error => return None,
                    _ => {
                        let range = self.range_of(*node);
                        self.error(
                            "path lookup requires a module on the left of '~'",
                            range,
                        );
                        return None;
                    }
                }
            };
            match symbol {
                Some(symbol) => {
                    let symbol = self.info.tables.resolve_alias(symbol);
                    self.info.resolved_reads.insert(*node, symbol);
                    current = Some(symbol);
                }
                None => {
                    let range = self.range_of(*node);
                    self.error(
                        format!(
                            "unresolved identifier '{}'",
                            identifier_pool().resolve_owned(*name)
                        ),
                        range,
                    );
                    return None;
                }
            }
        }
        current
    }

    pub(crate) fn analyse_expression(
        &mut self,
        expr: NodeId,
        table: TableId,
        hint: Option<TypeId>,
    ) -> TypeId {
        let ty = self.analyse_expression_inner(expr, table, hint);
        self.info.expr_types.insert(expr, ty);
        ty
    }

    fn analyse_expression_inner(
        &mut self,
        expr: NodeId,
        table: TableId,
        hint: Option<TypeId>,
    ) -> TypeId {
        let error = self.info.types.error_type();
        let NodeKind::Expression(expression) = &self.ast.node(expr).kind else {
            return error;
        };
        match expression {
            Expression::Literal { value } => self.literal_type(*value, hint),
            Expression::SymbolRead { read } => {
                let read = *read;
                let Some(symbol) = self.resolve_symbol_read(read, table) else {
                    return error;
                };
                match self.info.tables.symbol(symbol).kind {
                    SymbolKind::Variable { ty, .. }
                    | SymbolKind::Parameter { ty, .. }
                    | SymbolKind::Global { ty, .. }
                    | SymbolKind::ComptimeValue { ty, .. }
                    | SymbolKind::PolymorphicValue { ty } => ty,
                    SymbolKind::Function { signature, .. } => signature,
                    SymbolKind::HardcodedFunction(function) => {
                        self.hardcoded_signature(function)
                    }
                    SymbolKind::Type { ty } => ty,
                    SymbolKind::Module { .. } => {
                        let range = self.range_of(expr);
                        self.error("a module is not a value", range);
                        error
                    }
                    SymbolKind::PolymorphicFunction { .. } => {
                        let range = self.range_of(expr);
                        self.error(
                            "functions with comptime parameters cannot be used as values",
                            range,
                        );
                        error
                    }
                    SymbolKind::Alias { .. } => unreachable!("aliases resolve in lookup"),
                    SymbolKind::Error | SymbolKind::Unfinished => error,
                }
            }
            Expression::Binop { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                let operand_hint = match op {
                    Binop::Addition
                    | Binop::Subtraction
                    | Binop::Multiplication
                    | Binop::Division
                    | Binop::Modulo => hint,
                    _ => None,
                };
                let left_ty = self.analyse_expression(left, table, operand_hint);
                let right_ty = self.analyse_expression(right, table, Some(left_ty));
                self.check_binop_operands(op, left_ty, right_ty, expr);
                match op {
                    Binop::Addition
                    | Binop::Subtraction
                    | Binop::Multiplication
                    | Binop::Division
                    | Binop::Modulo => {
                        if self.info.types.is_error(left_ty)
                            || self.info.types.is_error(right_ty)
                        {
                            error
                        } else {
                            left_ty
                        }
                    }
                    _ => self.info.types.primitive(Primitive::Bool),
                }
            }
            Expression::Unop { op, expr: operand } => {
                let (op, operand) = (*op, *operand);
                match op {
                    Unop::Not => {
                        let ty = self.analyse_expression(operand, table, None);
                        let bool_ty = self.info.types.primitive(Primitive::Bool);
                        if ty != bool_ty && !self.info.types.is_error(ty) {
                            let range = self.range_of(operand);
                            self.error("'!' needs a bool operand", range);
                        }
                        bool_ty
                    }
                    Unop::Negate => {
                        let ty = self.analyse_expression(operand, table, hint);
                        let numeric = self
                            .info
                            .types
                            .as_primitive(ty)
                            .map(|p| p.is_numeric())
                            .unwrap_or(false);
                        if !numeric && !self.info.types.is_error(ty) {
                            let range = self.range_of(operand);
                            self.error("negation needs a numeric operand", range);
                            return error;
                        }
                        ty
                    }
                    Unop::Pointer => {
                        let ty = self.analyse_expression(operand, table, None);
                        if self.info.types.is_error(ty) {
                            return error;
                        }
                        if !self.expression_is_assignable(operand) {
                            let range = self.range_of(operand);
                            self.error("cannot take the address of this expression", range);
                            return error;
                        }
                        self.info.types.pointer_to(ty)
                    }
                    Unop::Dereference => {
                        let ty = self.analyse_expression(operand, table, None);
                        match self.info.types.ty(ty) {
                            Type::Pointer(inner) => *inner,
                            Type::Error => error,
                            _ => {
                                let range = self.range_of(operand);
                                self.error(
                                    format!(
                                        "'&' needs a pointer, not {}",
                                        self.info.types.display(ty)
                                    ),
                                    range,
                                );
                                error
                            }
                        }
                    }
                }
            }
            Expression::Call {
                expr: callee,
                arguments,
            } => self.analyse_call(expr, *callee, arguments.clone(), table),
            Expression::MemberAccess { name, expr: base } => {
                self.analyse_member_access(expr, *name, *base, table)
            }
            Expression::ArrayAccess { array, index } => {
                let (array, index) = (*array, *index);
                let array_ty = self.analyse_expression(array, table, None);
                let index_ty = self.analyse_expression(
                    index,
                    table,
                    Some(self.info.types.primitive(Primitive::I32)),
                );
                let integer = self
                    .info
                    .types
                    .as_primitive(index_ty)
                    .map(|p| p.is_integer())
                    .unwrap_or(false);
                if !integer && !self.info.types.is_error(index_ty) {
                    let range = self.range_of(index);
                    self.error("array indices must be integers", range);
                }
                match self.info.types.ty(array_ty) {
                    Type::Array { element, .. } => *element,
                    Type::Slice(element) => *element,
                    Type::Error => error,
                    _ => {
                        let range = self.range_of(array);
                        self.error(
                            format!(
                                "cannot index into {}",
                                self.info.types.display(array_ty)
                            ),
                            range,
                        );
                        error
                    }
                }
            }
            Expression::New { type_expr, count } => {
                let (type_expr, count) = (*type_expr, *count);
                let target = self.analyse_type_expr(type_expr, table);
                if let Some(count) = count {
                    let count_ty = self.analyse_expression(
                        count,
                        table,
                        Some(self.info.types.primitive(Primitive::I32)),
                    );
                    let integer = self
                        .info
                        .types
                        .as_primitive(count_ty)
                        .map(|p| p.is_integer())
                        .unwrap_or(false);
                    if !integer && !self.info.types.is_error(count_ty) {
                        let range = self.range_of(count);
                        self.error("allocation counts must be integers", range);
                    }
                }
                if self.info.types.is_error(target) {
                    return error;
                }
                match count {
                    Some(_) => self.info.types.slice_of(target),
                    None => self.info.types.pointer_to(target),
                }
            }
            Expression::Cast {
                kind,
                to_type,
                operand,
            } => self.analyse_cast(expr, *kind, *to_type, *operand, table, hint),
            Expression::StructInitializer {
                type_expr,
                arguments,
            } => self.analyse_struct_initializer(expr, *type_expr, arguments.clone(), table, hint),
            Expression::ArrayInitializer { type_expr, values } => {
                let (type_expr, values) = (*type_expr, values.clone());
                let mut first_analysed = false;
                let element = match type_expr {
                    Some(type_expr) => self.analyse_type_expr(type_expr, table),
                    None => match hint.map(|h| self.info.types.ty(h).clone()) {
                        Some(Type::Array { element, .. }) => element,
                        _ => match values.first() {
                            // No annotation anywhere: the first value
                            // decides the element type.
                            Some(first) => {
                                first_analysed = true;
                                self.analyse_expression(*first, table, None)
                            }
                            None => {
                                let range = self.range_of(expr);
                                self.error("cannot infer the element type", range);
                                return error;
                            }
                        },
                    },
                };
                for (position, value) in values.iter().enumerate() {
                    if position == 0 && first_analysed {
                        continue;
                    }
                    let value_ty = self.analyse_expression(*value, table, Some(element));
                    self.check_types_equal(element, value_ty, *value);
                }
                if self.info.types.is_error(element) {
                    return error;
                }
                self.info.types.array_of(values.len(), element)
            }
            Expression::AutoEnum { name } => {
                let name = *name;
                let Some(hint) = hint else {
                    let range = self.range_of(expr);
                    self.error("cannot infer the enum type of '.{}'", range);
                    return error;
                };
                match self.info.types.ty(hint) {
                    Type::Enum(e) => match e.members.iter().find(|(n, _)| *n == name) {
                        Some((_, value)) => {
                            let value = *value;
                            self.info
                                .comptime_folds
                                .insert(expr, ComptimeValue::Int(value));
                            hint
                        }
                        None => {
                            let range = self.range_of(expr);
                            self.error(
                                format!(
                                    "no enum member named '{}'",
                                    identifier_pool().resolve_owned(name)
                                ),
                                range,
                            );
                            error
                        }
                    },
                    Type::Error => error,
                    _ => {
                        let range = self.range_of(expr);
                        self.error("'.name' needs an enum context", range);
                        error
                    }
                }
            }
            Expression::BakeExpr { expr: inner } => {
                let inner = *inner;
                let ty = self.analyse_expression(inner, table, hint);
                if self.info.types.is_error(ty) {
                    return error;
                }
                match self.evaluate_comptime(inner, ty, table) {
                    Some(folded) => {
                        self.info.comptime_folds.insert(expr, folded);
                        ty
                    }
                    None => error,
                }
            }
            Expression::BakeBlock { .. } => {
                let range = self.range_of(expr);
                self.error(
                    "bake blocks are not supported; bake a function call instead",
                    range,
                );
                error
            }
            Expression::FunctionSignature { .. } => self.analyse_type_expr(expr, table),
            Expression::Function { .. } => {
                let range = self.range_of(expr);
                self.error(
                    "function literals are only allowed as definition values",
                    range,
                );
                error
            }
            Expression::StructureType { .. }
            | Expression::EnumType { .. }
            | Expression::ArrayType { .. }
            | Expression::SliceType { .. } => self.analyse_type_expr(expr, table),
            Expression::Module { .. } => {
                let range = self.range_of(expr);
                self.error("modules are only allowed as definition values", range);
                error
            }
            Expression::Error => error,
        }
    }

    fn literal_type(&mut self, value: upp_source::LiteralValue, hint: Option<TypeId>) -> TypeId {
        match value {
            upp_source::LiteralValue::Integer(_) => {
                if let Some(hint) = hint {
                    if self
                        .info
                        .types
                        .as_primitive(hint)
                        .map(|p| p.is_integer())
                        .unwrap_or(false)
                    {
                        return hint;
                    }
                }
                self.info.types.primitive(Primitive::I32)
            }
            upp_source::LiteralValue::Float(_) => self.info.types.primitive(Primitive::F32),
            upp_source::LiteralValue::Boolean(_) => self.info.types.primitive(Primitive::Bool),
            upp_source::LiteralValue::String(_) => {
                let u8_ty = self.info.types.primitive(Primitive::U8);
                self.info.types.slice_of(u8_ty)
            }
            upp_source::LiteralValue::Null => match hint.map(|h| self.info.types.ty(h)) {
                Some(Type::Pointer(_)) => hint.unwrap(),
                _ => {
                    let void = self.info.types.primitive(Primitive::Void);
                    self.info.types.pointer_to(void)
                }
            },
        }
    }

    fn hardcoded_signature(&mut self, function: HardcodedFunction) -> TypeId {
        let i32_ty = self.info.types.primitive(Primitive::I32);
        let f32_ty = self.info.types.primitive(Primitive::F32);
        let bool_ty = self.info.types.primitive(Primitive::Bool);
        let void = self.info.types.primitive(Primitive::Void);
        let u8_ty = self.info.types.primitive(Primitive::U8);
        let string = self.info.types.slice_of(u8_ty);
        let byte_pointer = self.info.types.pointer_to(u8_ty);
        match function {
            HardcodedFunction::PrintI32 => self.info.types.function_type(vec![i32_ty], void),
            HardcodedFunction::PrintF32 => self.info.types.function_type(vec![f32_ty], void),
            HardcodedFunction::PrintBool => self.info.types.function_type(vec![bool_ty], void),
            HardcodedFunction::PrintString => self.info.types.function_type(vec![string], void),
            HardcodedFunction::PrintLine => self.info.types.function_type(vec![], void),
            HardcodedFunction::ReadI32 => self.info.types.function_type(vec![], i32_ty),
            HardcodedFunction::ReadF32 => self.info.types.function_type(vec![], f32_ty),
            HardcodedFunction::ReadBool => self.info.types.function_type(vec![], bool_ty),
            HardcodedFunction::RandomI32 => self.info.types.function_type(vec![], i32_ty),
            HardcodedFunction::MallocSizeI32 => {
                self.info.types.function_type(vec![i32_ty], byte_pointer)
            }
            HardcodedFunction::FreePointer => {
                self.info.types.function_type(vec![byte_pointer], void)
            }
        }
    }

    fn analyse_call(
        &mut self,
        call: NodeId,
        callee: NodeId,
        arguments: Vec<NodeId>,
        table: TableId,
    ) -> TypeId {
        let error = self.info.types.error_type();

        // Only direct calls: the callee must name a function.
        let NodeKind::Expression(Expression::SymbolRead { read }) = &self.ast.node(callee).kind
        else {
            let range = self.range_of(callee);
            self.error("call targets must name a function", range);
            return error;
        };
        let read = *read;
        let Some(symbol) = self.resolve_symbol_read(read, table) else {
            return error;
        };
        self.info.expr_types.insert(callee, error);

        let (signature_ty, target, parameter_names) =
            match self.info.tables.symbol(symbol).kind.clone() {
                SymbolKind::Function {
                    function,
                    signature,
                } => {
                    let names = self.function_parameter_names(function);
                    (signature, CallTarget::Function { function }, names)
                }
                SymbolKind::HardcodedFunction(function) => {
                    let signature = self.hardcoded_signature(function);
                    (signature, CallTarget::Hardcoded { function }, Vec::new())
                }
                SymbolKind::PolymorphicFunction { .. } => {
                    let range = self.range_of(callee);
                    self.error(
                        "cannot call a function with comptime parameters directly",
                        range,
                    );
                    return error;
                }
                SymbolKind::Error | SymbolKind::Unfinished => return error,
                _ => {
                    let range = self.range_of(callee);
                    self.error("this is not callable", range);
                    return error;
                }
            };
        self.info.expr_types.insert(callee, signature_ty);

        let Type::Function(function_ty) = self.info.types.ty(signature_ty).clone() else {
            return error;
        };

        if arguments.len() != function_ty.parameters.len() {
            let range = self.range_of(call);
            let secondary = match target {
                CallTarget::Function { function } => vec![self.range_of(function)],
                CallTarget::Hardcoded { .. } => Vec::new(),
            };
            self.error_with_secondary(
                format!(
                    "wrong number of arguments: expected {}, found {}",
                    function_ty.parameters.len(),
                    arguments.len()
                ),
                range,
                secondary,
            );
            return function_ty.return_type;
        }

        // Positional arguments map by position; named arguments map by
        // parameter name and may not be followed by positional ones.
        let mut order = Vec::with_capacity(arguments.len());
        let mut seen_named = false;
        let mut used = vec![false; function_ty.parameters.len()];
        for (position, argument) in arguments.iter().enumerate() {
            let NodeKind::Argument { name, value } = &self.ast.node(*argument).kind else {
                continue;
            };
            let (name, value) = (*name, *value);
            let parameter_index = match name {
                Some(name) => {
                    seen_named = true;
                    match parameter_names.iter().position(|&p| p == name) {
                        Some(index) => index,
                        None => {
                            let range = self.range_of(*argument);
                            self.error(
                                format!(
                                    "no parameter named '{}'",
                                    identifier_pool().resolve_owned(name)
                                ),
                                range,
                            );
                            position.min(function_ty.parameters.len() - 1)
                        }
                    }
                }
                None => {
                    if seen_named {
                        let range = self.range_of(*argument);
                        self.error(
                            "positional arguments may not follow named arguments",
                            range,
                        );
                    }
                    position
                }
            };
            if used[parameter_index] {
                let range = self.range_of(*argument);
                self.error("argument given twice", range);
            }
            used[parameter_index] = true;
            order.push(parameter_index);

            let expected = function_ty.parameters[parameter_index];
            let actual = self.analyse_expression(value, table, Some(expected));
            self.check_types_equal(expected, actual, value);
            let argument_ty = self.info.expr_types[&value];
            self.info.expr_types.insert(*argument, argument_ty);
        }

        self.info.call_argument_order.insert(call, order);
        self.info.call_targets.insert(call, target);
        function_ty.return_type
    }

    fn function_parameter_names(&self, function: NodeId) -> Vec<Ident> {
        let NodeKind::Expression(Expression::Function { signature, .. }) =
            &self.ast.node(function).kind
        else {
            return Vec::new();
        };
        let NodeKind::Expression(Expression::FunctionSignature { parameters, .. }) =
            &self.ast.node(*signature).kind
        else {
            return Vec::new();
        };
        parameters
            .iter()
            .filter_map(|p| match &self.ast.node(*p).kind {
                NodeKind::Parameter { name, .. } => Some(*name),
                _ => None,
            })
            .collect()
    }

    fn analyse_member_access(
        &mut self,
        expr: NodeId,
        name: Ident,
        base: NodeId,
        table: TableId,
    ) -> TypeId {
        let error = self.info.types.error_type();

        // `EnumType.MEMBER` — the base resolves to an enum type.
        if let NodeKind::Expression(Expression::SymbolRead { read }) = &self.ast.node(base).kind {
            let read = *read;
            if let Some(symbol) = self.lookup_read_head(read, table) {
                if let SymbolKind::Type { ty } = self.info.tables.symbol(symbol).kind {
                    if let Type::Enum(e) = self.info.types.ty(ty) {
                        let members = e.members.clone();
                        self.info.expr_types.insert(base, ty);
                        // Record hops for tooling.
                        let _ = self.resolve_symbol_read(read, table);
                        return match members.iter().find(|(n, _)| *n == name) {
                            Some((_, value)) => {
                                let value = *value;
                                self.info
                                    .member_infos
                                    .insert(expr, MemberAccessInfo::EnumMember { value });
                                self.info
                                    .comptime_folds
                                    .insert(expr, ComptimeValue::Int(value));
                                ty
                            }
                            None => {
                                let range = self.range_of(expr);
                                self.error(
                                    format!(
                                        "no enum member named '{}'",
                                        identifier_pool().resolve_owned(name)
                                    ),
                                    range,
                                );
                                error
                            }
                        };
                    }
                }
            }
        }

        let base_ty = self.analyse_expression(base, table, None);
        let (target_ty, through_pointer) = match self.info.types.ty(base_ty) {
            Type::Pointer(inner) => (*inner, true),
            _ => (base_ty, false),
        };

        match self.info.types.ty(target_ty).clone() {
            Type::Struct(_) | Type::Union(_) => {
                match self.info.types.struct_field(target_ty, name) {
                    Some(field) => {
                        let (offset, ty) = (field.offset, field.ty);
                        self.info.member_infos.insert(
                            expr,
                            MemberAccessInfo::StructField {
                                offset,
                                ty,
                                through_pointer,
                            },
                        );
                        ty
                    }
                    None => {
                        let range = self.range_of(expr);
                        self.error(
                            format!(
                                "{} has no member '{}'",
                                self.info.types.display(target_ty),
                                identifier_pool().resolve_owned(name)
                            ),
                            range,
                        );
                        error
                    }
                }
            }
            Type::Slice(_) => {
                if identifier_pool().resolve_owned(name) == "size" {
                    self.info
                        .member_infos
                        .insert(expr, MemberAccessInfo::SliceSize);
                    self.info.types.primitive(Primitive::I32)
                } else {
                    let range = self.range_of(expr);
                    self.error("slices only have a 'size' member", range);
                    error
                }
            }
            Type::Array { size, .. } => {
                if identifier_pool().resolve_owned(name) == "size" {
                    self.info
                        .member_infos
                        .insert(expr, MemberAccessInfo::ArraySize { size });
                    self.info
                        .comptime_folds
                        .insert(expr, ComptimeValue::Int(size as i64));
                    self.info.types.primitive(Primitive::I32)
                } else {
                    let range = self.range_of(expr);
                    self.error("arrays only have a 'size' member", range);
                    error
                }
            }
            Type::Error => error,
            _ => {
                let range = self.range_of(expr);
                self.error(
                    format!(
                        "{} has no members",
                        self.info.types.display(base_ty)
                    ),
                    range,
                );
                error
            }
        }
    }

    /// Resolves just the head of a read chain without reporting errors,
    /// for the enum-member special case.
    fn lookup_read_head(&self, head: NodeId, table: TableId) -> Option<SymbolId> {
        let path = self.ast.symbol_read_path(head);
        let names: Vec<Ident> = path.iter().map(|(_, name)| *name).collect();
        self.lookup_path(table, &names)
    }

    fn analyse_cast(
        &mut self,
        expr: NodeId,
        kind: CastKind,
        to_type: Option<NodeId>,
        operand: NodeId,
        table: TableId,
        hint: Option<TypeId>,
    ) -> TypeId {
        let error = self.info.types.error_type();
        let operand_ty = self.analyse_expression(operand, table, None);
        let target = match to_type {
            Some(t) => Some(self.analyse_type_expr(t, table)),
            None => hint,
        };

        match kind {
            CastKind::TypeToType => {
                let Some(target) = target else {
                    let range = self.range_of(expr);
                    self.error("cannot infer the cast target type", range);
                    return error;
                };
                let both_numeric = self
                    .info
                    .types
                    .as_primitive(operand_ty)
                    .map(|p| p.is_numeric())
                    .unwrap_or(false)
                    && self
                        .info
                        .types
                        .as_primitive(target)
                        .map(|p| p.is_numeric())
                        .unwrap_or(false);
                if !both_numeric
                    && !self.info.types.is_error(operand_ty)
                    && !self.info.types.is_error(target)
                {
                    let range = self.range_of(expr);
                    self.error(
                        format!(
                            "'cast' converts between numeric types, not {} to {}",
                            self.info.types.display(operand_ty),
                            self.info.types.display(target)
                        ),
                        range,
                    );
                    return error;
                }
                target
            }
            CastKind::RawToPtr => {
                let Some(target) = target else {
                    let range = self.range_of(expr);
                    self.error("'cast_ptr' needs a pointer target type", range);
                    return error;
                };
                if !matches!(self.info.types.ty(target), Type::Pointer(_)) {
                    let range = self.range_of(expr);
                    self.error("'cast_ptr' targets must be pointer types", range);
                    return error;
                }
                let u64_ty = self.info.types.primitive(Primitive::U64);
                if operand_ty != u64_ty && !self.info.types.is_error(operand_ty) {
                    let range = self.range_of(operand);
                    self.error("'cast_ptr' operands must be raw u64 addresses", range);
                }
                target
            }
            CastKind::PtrToRaw => {
                if !matches!(
                    self.info.types.ty(operand_ty),
                    Type::Pointer(_) | Type::Error
                ) {
                    let range = self.range_of(operand);
                    self.error("'cast_raw' needs a pointer operand", range);
                    return error;
                }
                self.info.types.primitive(Primitive::U64)
            }
        }
    }

    fn analyse_struct_initializer(
        &mut self,
        expr: NodeId,
        type_expr: Option<NodeId>,
        arguments: Vec<NodeId>,
        table: TableId,
        hint: Option<TypeId>,
    ) -> TypeId {
        let error = self.info.types.error_type();
        let ty = match type_expr {
            Some(type_expr) => self.analyse_type_expr(type_expr, table),
            None => match hint {
                Some(hint) => hint,
                None => {
                    let range = self.range_of(expr);
                    self.error("cannot infer the struct type of '.{...}'", range);
                    return error;
                }
            },
        };
        if self.info.types.is_error(ty) {
            return error;
        }

        let fields: Vec<(Ident, TypeId)> = match self.info.types.ty(ty) {
            Type::Struct(s) => s.fields.iter().map(|f| (f.name, f.ty)).collect(),
            Type::Union(u) => u.variants.iter().map(|f| (f.name, f.ty)).collect(),
            _ => {
                let range = self.range_of(expr);
                self.error(
                    format!(
                        "{} cannot be built with a struct initialiser",
                        self.info.types.display(ty)
                    ),
                    range,
                );
                return error;
            }
        };

        let is_union = matches!(self.info.types.ty(ty), Type::Union(_));
        if is_union {
            if arguments.len() != 1 {
                let range = self.range_of(expr);
                self.error("union initialisers take exactly one member", range);
                return ty;
            }
        } else if arguments.len() != fields.len() {
            let range = self.range_of(expr);
            self.error(
                format!(
                    "wrong number of initialiser arguments: expected {}, found {}",
                    fields.len(),
                    arguments.len()
                ),
                range,
            );
            return ty;
        }

        let mut order = Vec::with_capacity(arguments.len());
        let mut seen_named = false;
        let mut used = vec![false; fields.len()];
        for (position, argument) in arguments.iter().enumerate() {
            let NodeKind::Argument { name, value } = &self.ast.node(*argument).kind else {
                continue;
            };
            let (name, value) = (*name, *value);
            let field_index = match name {
                Some(name) => {
                    seen_named = true;
                    match fields.iter().position(|(n, _)| *n == name) {
                        Some(index) => index,
                        None => {
                            let range = self.range_of(*argument);
                            self.error(
                                format!(
                                    "no member named '{}'",
                                    identifier_pool().resolve_owned(name)
                                ),
                                range,
                            );
                            position.min(fields.len().saturating_sub(1))
                        }
                    }
                }
                None => {
                    if seen_named {
                        let range = self.range_of(*argument);
                        self.error(
                            "positional arguments may not follow named arguments",
                            range,
                        );
                    }
                    position
                }
            };
            if fields.is_empty() {
                continue;
            }
            if used[field_index] {
                let range = self.range_of(*argument);
                self.error("member initialised twice", range);
            }
            used[field_index] = true;
            order.push(field_index);

            let expected = fields[field_index].1;
            let actual = self.analyse_expression(value, table, Some(expected));
            self.check_types_equal(expected, actual, value);
            let argument_ty = self.info.expr_types[&value];
            self.info.expr_types.insert(*argument, argument_ty);
        }

        self.info.initializer_fields.insert(expr, order);
        ty
    }
}
