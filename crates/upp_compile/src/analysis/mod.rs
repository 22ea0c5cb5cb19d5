//! Semantic analysis: name resolution, type checking and comptime
//! evaluation.
//!
//! Analysis runs in three interleaved phases over a dependency graph:
//!
//! 1. **Collect** — walk the module tree, create an unfinished symbol per
//!    top-level definition and record what each definition's type and
//!    value expressions refer to.
//! 2. **Schedule** — build one graph node per analysis item (definition
//!    header, function body). A header depends on the headers its
//!    signature mentions; a body depends on its own header and the
//!    headers its statements mention; comptime values additionally
//!    depend on the *bodies* of every function they (transitively) call,
//!    since evaluating them runs those functions on the VM. Cycles are
//!    reported with the full cycle as secondary ranges.
//! 3. **Analyse** — execute items in topological order, resolving
//!    symbol reads, computing types, folding comptime values and
//!    recording everything the code generator needs in side tables.
//!
//! Items that depend on a failed item analyse against the ERROR type,
//! which suppresses cascading diagnostics.

mod check;
mod workload;

use rustc_hash::{FxHashMap, FxHashSet};
use upp_base::{identifier_pool, Ident};
use upp_language::ast::{Expression, NodeId};
use upp_language::{Ast, NodeKind};
use upp_source::TokenRange;

use crate::hardcoded::{BufferedHost, HardcodedFunction};
use crate::interpreter::{ExitCode, Interpreter};
use crate::symbols::{ComptimeValue, SymbolId, SymbolKind, SymbolTables, TableId};
use crate::types::{align_next_multiple, Primitive, Type, TypeId, TypeSystem};
use crate::{bytecode, ir};

use workload::DependencyGraph;

/// A semantic diagnostic: message, primary range, related ranges.
#[derive(Debug, Clone)]
pub struct SemanticError {
    pub message: String,
    pub range: TokenRange,
    pub secondary: Vec<TokenRange>,
}

/// How a member access resolves.
#[derive(Debug, Clone, Copy)]
pub enum MemberAccessInfo {
    StructField {
        offset: usize,
        ty: TypeId,
        /// The base is a pointer; access goes through its value.
        through_pointer: bool,
    },
    EnumMember {
        value: i64,
    },
    SliceSize,
    ArraySize {
        size: usize,
    },
}

/// Resolved target of a call expression.
#[derive(Debug, Clone, Copy)]
pub enum CallTarget {
    Function { function: NodeId },
    Hardcoded { function: HardcodedFunction },
}

/// Everything analysis produces, keyed by AST node ids.
pub struct SemanticInfo {
    pub tables: SymbolTables,
    pub types: TypeSystem,
    pub expr_types: FxHashMap<NodeId, TypeId>,
    /// Per symbol-read node, the symbol it resolved to.
    pub resolved_reads: FxHashMap<NodeId, SymbolId>,
    pub definition_symbols: FxHashMap<NodeId, SymbolId>,
    pub parameter_symbols: FxHashMap<NodeId, SymbolId>,
    /// Module and code-block nodes → their symbol table.
    pub node_tables: FxHashMap<NodeId, TableId>,
    pub member_infos: FxHashMap<NodeId, MemberAccessInfo>,
    /// Expressions folded to constants at analysis time.
    pub comptime_folds: FxHashMap<NodeId, ComptimeValue>,
    /// Struct initialiser → field index per argument position.
    pub initializer_fields: FxHashMap<NodeId, Vec<usize>>,
    /// Call → parameter index per argument position.
    pub call_argument_order: FxHashMap<NodeId, Vec<usize>>,
    pub call_targets: FxHashMap<NodeId, CallTarget>,
    /// Function expression nodes with analysed bodies, in analysis order.
    pub functions: Vec<NodeId>,
    pub function_names: FxHashMap<NodeId, Ident>,
    /// Function node → parameter scope table.
    pub function_scopes: FxHashMap<NodeId, TableId>,
    pub main_function: Option<NodeId>,
    pub globals_size: usize,
    pub global_initializers: Vec<(usize, Vec<u8>)>,
    pub errors: Vec<SemanticError>,
}

impl SemanticInfo {
    fn new() -> SemanticInfo {
        SemanticInfo {
            tables: SymbolTables::new(),
            types: TypeSystem::new(),
            expr_types: FxHashMap::default(),
            resolved_reads: FxHashMap::default(),
            definition_symbols: FxHashMap::default(),
            parameter_symbols: FxHashMap::default(),
            node_tables: FxHashMap::default(),
            member_infos: FxHashMap::default(),
            comptime_folds: FxHashMap::default(),
            initializer_fields: FxHashMap::default(),
            call_argument_order: FxHashMap::default(),
            call_targets: FxHashMap::default(),
            functions: Vec::new(),
            function_names: FxHashMap::default(),
            function_scopes: FxHashMap::default(),
            main_function: None,
            globals_size: 0,
            global_initializers: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// The terminal symbol of a read chain, if every hop resolved.
    pub fn resolved_terminal(&self, ast: &Ast, head: NodeId) -> Option<SymbolId> {
        let path = ast.symbol_read_path(head);
        let (last, _) = path.last()?;
        self.resolved_reads.get(last).copied()
    }
}

/// Runs the full analysis over a parsed module.
pub fn analyse(ast: &Ast, root: NodeId) -> SemanticInfo {
    let mut analyser = Analyser::new(ast);
    analyser.register_predefined();
    analyser.collect_module(root, analyser.info.tables.root());
    analyser.schedule_and_run();
    analyser.detect_main();
    log::debug!(
        "analysed {} definitions, {} functions, {} errors",
        analyser.definitions.len(),
        analyser.info.functions.len(),
        analyser.info.errors.len()
    );
    analyser.info
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefKind {
    Function { function: NodeId },
    Structure { structure: NodeId },
    Enumeration { enumeration: NodeId },
    Module,
    ComptimeValue,
    Global,
}

struct DefinitionItem {
    node: NodeId,
    name: Ident,
    symbol: SymbolId,
    table: TableId,
    kind: DefKind,
    type_expr: Option<NodeId>,
    value: Option<NodeId>,
}

pub(crate) struct Analyser<'a> {
    pub(crate) ast: &'a Ast,
    pub(crate) info: SemanticInfo,
    definitions: Vec<DefinitionItem>,
    symbol_to_definition: FxHashMap<SymbolId, usize>,
}

impl<'a> Analyser<'a> {
    fn new(ast: &'a Ast) -> Analyser<'a> {
        Analyser {
            ast,
            info: SemanticInfo::new(),
            definitions: Vec::new(),
            symbol_to_definition: FxHashMap::default(),
        }
    }

    pub(crate) fn error(&mut self, message: impl Into<String>, range: TokenRange) {
        self.info.errors.push(SemanticError {
            message: message.into(),
            range,
            secondary: Vec::new(),
        });
    }

    pub(crate) fn error_with_secondary(
        &mut self,
        message: impl Into<String>,
        range: TokenRange,
        secondary: Vec<TokenRange>,
    ) {
        self.info.errors.push(SemanticError {
            message: message.into(),
            range,
            secondary,
        });
    }

    pub(crate) fn range_of(&self, node: NodeId) -> TokenRange {
        self.ast.node(node).range
    }

    /// Primitive type names and the hardcoded function table become
    /// predefined symbols of the root scope.
    fn register_predefined(&mut self) {
        let root = self.info.tables.root();
        let pool = identifier_pool();
        for primitive in [
            Primitive::I8,
            Primitive::I16,
            Primitive::I32,
            Primitive::I64,
            Primitive::U8,
            Primitive::U16,
            Primitive::U32,
            Primitive::U64,
            Primitive::F32,
            Primitive::Bool,
            Primitive::Void,
        ] {
            let name = pool.intern(primitive.name());
            let ty = self.info.types.primitive(primitive);
            let _ = self
                .info
                .tables
                .define(root, name, SymbolKind::Type { ty }, None);
        }
        for (name, function) in HardcodedFunction::interned_table() {
            let _ = self.info.tables.define(
                root,
                name,
                SymbolKind::HardcodedFunction(function),
                None,
            );
        }
    }

    // ------------------------------------------------------------------
    // Phase 1: collect definitions
    // ------------------------------------------------------------------

    fn collect_module(&mut self, module: NodeId, table: TableId) {
        self.info.node_tables.insert(module, table);
        let NodeKind::Module { definitions, .. } = &self.ast.node(module).kind else {
            return;
        };
        for definition in definitions.clone() {
            self.collect_definition(definition, table);
        }
    }

    fn collect_definition(&mut self, definition: NodeId, table: TableId) {
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

        let kind = match value.map(|v| &self.ast.node(v).kind) {
            Some(NodeKind::Expression(Expression::Function { .. })) => DefKind::Function {
                function: value.unwrap(),
            },
            Some(NodeKind::Expression(Expression::StructureType { .. })) => DefKind::Structure {
                structure: value.unwrap(),
            },
            Some(NodeKind::Expression(Expression::EnumType { .. })) => DefKind::Enumeration {
                enumeration: value.unwrap(),
            },
            Some(NodeKind::Expression(Expression::Module { .. })) => DefKind::Module,
            _ if is_comptime => DefKind::ComptimeValue,
            _ => DefKind::Global,
        };

        let symbol_kind = match kind {
            DefKind::Module => {
                let module_table = self.info.tables.create_table(Some(table));
                SymbolKind::Module {
                    table: module_table,
                }
            }
            _ => SymbolKind::Unfinished,
        };
        let symbol = match self
            .info
            .tables
            .define(table, name, symbol_kind, Some(definition))
        {
            Ok(symbol) => symbol,
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
                        "redefinition of '{}'",
                        identifier_pool().resolve_owned(name)
                    ),
                    range,
                    existing_range.into_iter().collect(),
                );
                return;
            }
        };
        self.info.definition_symbols.insert(definition, symbol);

        let index = self.definitions.len();
        self.definitions.push(DefinitionItem {
            node: definition,
            name,
            symbol,
            table,
            kind,
            type_expr,
            value,
        });
        self.symbol_to_definition.insert(symbol, index);

        // Modules carry nested definitions: collect them now so the
        // whole program's symbols exist before scheduling.
        if kind == DefKind::Module {
            let SymbolKind::Module { table: module_table } =
                self.info.tables.symbol(symbol).kind
            else {
                unreachable!();
            };
            if let Some(value) = value {
                if let NodeKind::Expression(Expression::Module { module }) =
                    &self.ast.node(value).kind
                {
                    self.collect_module(*module, module_table);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Phase 2: schedule
    // ------------------------------------------------------------------

    fn header_workload(index: usize) -> usize {
        index * 2
    }

    fn body_workload(index: usize) -> usize {
        index * 2 + 1
    }

    fn schedule_and_run(&mut self) {
        let mut graph = DependencyGraph::new();
        for _ in 0..self.definitions.len() * 2 {
            graph.add_node();
        }

        for index in 0..self.definitions.len() {
            self.add_dependency_edges(index, &mut graph);
        }

        let outcome = graph.resolve();
        for workload in &outcome.order {
            let index = workload / 2;
            if workload % 2 == 0 {
                self.analyse_header(index);
            } else {
                self.analyse_body(index);
            }
        }

        for cycle in &outcome.cycles {
            let definitions: Vec<usize> = cycle.iter().map(|w| w / 2).collect();
            let ranges: Vec<TokenRange> = definitions
                .iter()
                .map(|&d| self.range_of(self.definitions[d].node))
                .collect();
            let names: Vec<String> = definitions
                .iter()
                .map(|&d| identifier_pool().resolve_owned(self.definitions[d].name))
                .collect();
            let range = ranges[0];
            self.error_with_secondary(
                format!("cyclic dependency between: {}", names.join(", ")),
                range,
                ranges,
            );
            // Everything stuck on a cycle resolves to ERROR.
            for &d in &definitions {
                let symbol = self.definitions[d].symbol;
                self.info.tables.symbol_mut(symbol).kind = SymbolKind::Error;
            }
        }
    }

    fn add_dependency_edges(&mut self, index: usize, graph: &mut DependencyGraph) {
        let item = &self.definitions[index];
        let table = item.table;
        let kind = item.kind;
        let type_expr = item.type_expr;
        let value = item.value;

        let mut header_roots: Vec<NodeId> = Vec::new();
        let mut body_root: Option<NodeId> = None;
        let mut weak_under_indirection = false;
        if let Some(type_expr) = type_expr {
            header_roots.push(type_expr);
        }
        match kind {
            DefKind::Function { function } => {
                if let NodeKind::Expression(Expression::Function { signature, body }) =
                    &self.ast.node(function).kind
                {
                    header_roots.push(*signature);
                    body_root = Some(*body);
                }
            }
            DefKind::Structure { structure } => {
                header_roots.push(structure);
                weak_under_indirection = true;
            }
            DefKind::Enumeration { enumeration } => {
                header_roots.push(enumeration);
            }
            DefKind::Module => {}
            DefKind::ComptimeValue | DefKind::Global => {
                if let Some(value) = value {
                    header_roots.push(value);
                }
            }
        }

        // Header → header edges.
        let mut header_paths = Vec::new();
        for root in &header_roots {
            self.collect_name_paths(*root, weak_under_indirection, &mut header_paths);
        }
        for (path, _) in &header_paths {
            if let Some(target) = self.resolve_dependency(table, path) {
                graph.add_edge(Self::header_workload(index), Self::header_workload(target));
            }
        }

        // Body → header edges (plus bake → body with closure).
        if let Some(body) = body_root {
            graph.add_edge(Self::body_workload(index), Self::header_workload(index));
            let mut body_paths = Vec::new();
            self.collect_name_paths(body, false, &mut body_paths);
            let mut bake_functions = Vec::new();
            for (path, in_bake) in &body_paths {
                if let Some(target) = self.resolve_dependency(table, path) {
                    graph.add_edge(Self::body_workload(index), Self::header_workload(target));
                    if *in_bake {
                        bake_functions.push(target);
                    }
                }
            }
            for target in self.function_closure(bake_functions) {
                graph.add_edge(Self::body_workload(index), Self::body_workload(target));
            }
        }

        // Comptime evaluation needs the bodies of every function its
        // value can reach.
        if matches!(kind, DefKind::ComptimeValue | DefKind::Global) {
            let mut called = Vec::new();
            for (path, _) in &header_paths {
                if let Some(target) = self.resolve_dependency(table, path) {
                    if matches!(self.definitions[target].kind, DefKind::Function { .. }) {
                        called.push(target);
                    }
                }
            }
            for target in self.function_closure(called) {
                graph.add_edge(Self::header_workload(index), Self::body_workload(target));
            }
        }
    }

    /// Expands a set of function definitions with everything their
    /// bodies (transitively) reference.
    fn function_closure(&self, seed: Vec<usize>) -> Vec<usize> {
        let mut closure: FxHashSet<usize> = FxHashSet::default();
        let mut stack: Vec<usize> = seed;
        while let Some(index) = stack.pop() {
            if !closure.insert(index) {
                continue;
            }
            let DefKind::Function { function } = self.definitions[index].kind else {
                continue;
            };
            let NodeKind::Expression(Expression::Function { body, .. }) =
                &self.ast.node(function).kind
            else {
                continue;
            };
            let mut paths = Vec::new();
            self.collect_name_paths(*body, false, &mut paths);
            for (path, _) in &paths {
                if let Some(target) = self.resolve_dependency(self.definitions[index].table, path)
                {
                    if matches!(self.definitions[target].kind, DefKind::Function { .. }) {
                        stack.push(target);
                    }
                }
            }
        }
        closure.into_iter().collect()
    }

    /// Collects the symbol-read paths under `node`. With
    /// `weak_under_indirection`, names behind `*`/`[]` constructors are
    /// skipped (a struct can point at itself). The flag on each path
    /// records whether it sits under a `bake`.
    fn collect_name_paths(
        &self,
        node: NodeId,
        weak_under_indirection: bool,
        out: &mut Vec<(Vec<Ident>, bool)>,
    ) {
        self.collect_name_paths_inner(node, weak_under_indirection, false, out);
    }

    fn collect_name_paths_inner(
        &self,
        node: NodeId,
        weak: bool,
        in_bake: bool,
        out: &mut Vec<(Vec<Ident>, bool)>,
    ) {
        match &self.ast.node(node).kind {
            NodeKind::Expression(Expression::SymbolRead { read }) => {
                let path: Vec<Ident> = self
                    .ast
                    .symbol_read_path(*read)
                    .into_iter()
                    .map(|(_, name)| name)
                    .collect();
                out.push((path, in_bake));
            }
            NodeKind::Expression(Expression::Unop {
                op: upp_language::ast::Unop::Pointer,
                ..
            })
            | NodeKind::Expression(Expression::SliceType { .. })
                if weak =>
            {
                // Indirection breaks layout dependencies.
            }
            NodeKind::Expression(Expression::BakeExpr { .. })
            | NodeKind::Expression(Expression::BakeBlock { .. }) => {
                for child in self.ast.children(node) {
                    self.collect_name_paths_inner(child, weak, true, out);
                }
            }
            _ => {
                for child in self.ast.children(node) {
                    self.collect_name_paths_inner(child, weak, in_bake, out);
                }
            }
        }
    }

    /// Resolves a path to a collected definition, walking module tables.
    fn resolve_dependency(&self, table: TableId, path: &[Ident]) -> Option<usize> {
        let (&head, rest) = path.split_first()?;
        let mut symbol = self.info.tables.lookup(table, head)?;
        for &hop in rest {
            let SymbolKind::Module { table } = self.info.tables.symbol(symbol).kind else {
                return None;
            };
            symbol = self.info.tables.lookup_local(table, hop)?;
        }
        self.symbol_to_definition.get(&symbol).copied()
    }

    // ------------------------------------------------------------------
    // Phase 3: analyse headers
    // ------------------------------------------------------------------

    fn analyse_header(&mut self, index: usize) {
        let kind = self.definitions[index].kind;
        match kind {
            DefKind::Function { function } => self.analyse_function_header(index, function),
            DefKind::Structure { structure } => self.analyse_structure_header(index, structure),
            DefKind::Enumeration { enumeration } => {
                self.analyse_enum_header(index, enumeration)
            }
            DefKind::Module => {
                // The symbol was finished at collection time.
                if let Some(value) = self.definitions[index].value {
                    let ty = self.info.types.error_type();
                    self.info.expr_types.insert(value, ty);
                }
            }
            DefKind::ComptimeValue => self.analyse_comptime_header(index),
            DefKind::Global => self.analyse_global_header(index),
        }
    }

    fn analyse_function_header(&mut self, index: usize, function: NodeId) {
        let item_table = self.definitions[index].table;
        let name = self.definitions[index].name;
        let symbol = self.definitions[index].symbol;

        let NodeKind::Expression(Expression::Function { signature, .. }) =
            &self.ast.node(function).kind
        else {
            return;
        };
        let signature = *signature;
        let NodeKind::Expression(Expression::FunctionSignature {
            parameters,
            return_type,
        }) = &self.ast.node(signature).kind
        else {
            return;
        };
        let (parameters, return_type) = (parameters.clone(), *return_type);

        let scope = self.info.tables.create_table(Some(item_table));
        self.info.function_scopes.insert(function, scope);
        self.info.node_tables.insert(function, scope);

        let mut parameter_types = Vec::with_capacity(parameters.len());
        let mut is_polymorphic = false;
        for (position, parameter) in parameters.iter().enumerate() {
            let NodeKind::Parameter {
                is_comptime,
                name: parameter_name,
                type_expr,
                default_value,
            } = &self.ast.node(*parameter).kind
            else {
                continue;
            };
            let (is_comptime, parameter_name, type_expr, default_value) =
                (*is_comptime, *parameter_name, *type_expr, *default_value);

            let ty = self.analyse_type_expr(type_expr, item_table);
            parameter_types.push(ty);
            if let Some(default) = default_value {
                let default_ty = self.analyse_expression(default, item_table, Some(ty));
                self.check_types_equal(ty, default_ty, default);
            }

            let parameter_kind = if is_comptime {
                is_polymorphic = true;
                SymbolKind::PolymorphicValue { ty }
            } else {
                SymbolKind::Parameter {
                    ty,
                    index: position,
                }
            };
            match self
                .info
                .tables
                .define(scope, parameter_name, parameter_kind, Some(*parameter))
            {
                Ok(parameter_symbol) => {
                    self.info
                        .parameter_symbols
                        .insert(*parameter, parameter_symbol);
                }
                Err(_) => {
                    let range = self.range_of(*parameter);
                    self.error(
                        format!(
                            "duplicate parameter '{}'",
                            identifier_pool().resolve_owned(parameter_name)
                        ),
                        range,
                    );
                }
            }
        }

        let return_ty = match return_type {
            Some(expr) => self.analyse_type_expr(expr, item_table),
            None => self.info.types.primitive(Primitive::Void),
        };
        let signature_ty = self.info.types.function_type(parameter_types, return_ty);
        self.info.expr_types.insert(signature, signature_ty);
        self.info.expr_types.insert(function, signature_ty);
        self.info.function_names.insert(function, name);

        self.info.tables.symbol_mut(symbol).kind = if is_polymorphic {
            SymbolKind::PolymorphicFunction { function }
        } else {
            SymbolKind::Function {
                function,
                signature: signature_ty,
            }
        };
    }

    fn analyse_structure_header(&mut self, index: usize, structure: NodeId) {
        let table = self.definitions[index].table;
        let name = self.definitions[index].name;
        let symbol = self.definitions[index].symbol;

        let NodeKind::Expression(Expression::StructureType { kind, members }) =
            &self.ast.node(structure).kind
        else {
            return;
        };
        let (kind, members) = (*kind, members.clone());

        let ty = match kind {
            upp_language::ast::StructureKind::Struct => self.info.types.declare_struct(name),
            upp_language::ast::StructureKind::Union => self.info.types.declare_union(name, true),
            upp_language::ast::StructureKind::CUnion => {
                self.info.types.declare_union(name, false)
            }
        };
        // Finish the symbol before member analysis so members can point
        // at the type itself.
        self.info.tables.symbol_mut(symbol).kind = SymbolKind::Type { ty };
        self.info.expr_types.insert(structure, ty);

        let mut fields = Vec::new();
        for member in &members {
            let NodeKind::Definition {
                name: member_name,
                type_expr,
                ..
            } = &self.ast.node(*member).kind
            else {
                continue;
            };
            let (member_name, type_expr) = (*member_name, *type_expr);
            let Some(type_expr) = type_expr else {
                let range = self.range_of(*member);
                self.error("struct members need a type", range);
                continue;
            };
            let member_ty = self.analyse_type_expr(type_expr, table);
            if member_ty == ty {
                let range = self.range_of(*member);
                self.error(
                    "a structure cannot contain itself by value; use a pointer",
                    range,
                );
                continue;
            }
            if fields.iter().any(|(n, _)| *n == member_name) {
                let range = self.range_of(*member);
                self.error(
                    format!(
                        "duplicate member '{}'",
                        identifier_pool().resolve_owned(member_name)
                    ),
                    range,
                );
                continue;
            }
            fields.push((member_name, member_ty));
        }

        match kind {
            upp_language::ast::StructureKind::Struct => self.info.types.finish_struct(ty, fields),
            _ => self.info.types.finish_union(ty, fields),
        }
    }

    fn analyse_enum_header(&mut self, index: usize, enumeration: NodeId) {
        let table = self.definitions[index].table;
        let name = self.definitions[index].name;
        let symbol = self.definitions[index].symbol;

        let NodeKind::Expression(Expression::EnumType { members }) =
            &self.ast.node(enumeration).kind
        else {
            return;
        };
        let members = members.clone();

        let mut values = Vec::new();
        let mut next_value: i64 = 0;
        for member in &members {
            let NodeKind::EnumMember {
                name: member_name,
                value,
            } = &self.ast.node(*member).kind
            else {
                continue;
            };
            let (member_name, value) = (*member_name, *value);
            let member_value = match value {
                Some(value_expr) => {
                    let _ = self.analyse_expression(
                        value_expr,
                        table,
                        Some(self.info.types.primitive(Primitive::I32)),
                    );
                    match self.const_fold(value_expr, table) {
                        Some(ComptimeValue::Int(v)) => v,
                        _ => {
                            let range = self.range_of(value_expr);
                            self.error("enum member values must be constant integers", range);
                            next_value
                        }
                    }
                }
                None => next_value,
            };
            if values.iter().any(|(n, _)| *n == member_name) {
                let range = self.range_of(*member);
                self.error(
                    format!(
                        "duplicate enum member '{}'",
                        identifier_pool().resolve_owned(member_name)
                    ),
                    range,
                );
                continue;
            }
            values.push((member_name, member_value));
            next_value = member_value + 1;
        }

        let ty = self.info.types.create_enum(name, values);
        self.info.expr_types.insert(enumeration, ty);
        self.info.tables.symbol_mut(symbol).kind = SymbolKind::Type { ty };
    }

    fn analyse_comptime_header(&mut self, index: usize) {
        let table = self.definitions[index].table;
        let symbol = self.definitions[index].symbol;
        let type_expr = self.definitions[index].type_expr;
        let value = self.definitions[index].value;
        let node = self.definitions[index].node;

        let declared = type_expr.map(|t| self.analyse_type_expr(t, table));
        let Some(value) = value else {
            let range = self.range_of(node);
            self.error("comptime definitions need a value", range);
            self.info.tables.symbol_mut(symbol).kind = SymbolKind::Error;
            return;
        };

        let ty = self.analyse_expression(value, table, declared);
        let ty = declared.unwrap_or(ty);
        if let Some(declared) = declared {
            self.check_types_equal(declared, self.info.expr_types[&value], value);
        }
        if self.info.types.is_error(ty) {
            self.info.tables.symbol_mut(symbol).kind = SymbolKind::Error;
            return;
        }

        match self.evaluate_comptime(value, ty, table) {
            Some(folded) => {
                self.info.comptime_folds.insert(value, folded);
                self.info.tables.symbol_mut(symbol).kind =
                    SymbolKind::ComptimeValue { ty, value: folded };
            }
            None => {
                self.info.tables.symbol_mut(symbol).kind = SymbolKind::Error;
            }
        }
    }

    fn analyse_global_header(&mut self, index: usize) {
        let table = self.definitions[index].table;
        let symbol = self.definitions[index].symbol;
        let type_expr = self.definitions[index].type_expr;
        let value = self.definitions[index].value;
        let node = self.definitions[index].node;

        let declared = type_expr.map(|t| self.analyse_type_expr(t, table));
        let value_ty = value.map(|v| self.analyse_expression(v, table, declared));
        let ty = match declared.or(value_ty) {
            Some(ty) => ty,
            None => {
                let range = self.range_of(node);
                self.error("a definition needs a type or a value", range);
                self.info.tables.symbol_mut(symbol).kind = SymbolKind::Error;
                return;
            }
        };
        if let (Some(declared), Some(value_ty)) = (declared, value_ty) {
            if let Some(value) = value {
                let _ = value_ty;
                self.check_types_equal(declared, self.info.expr_types[&value], value);
            }
        }
        if self.info.types.is_error(ty) {
            self.info.tables.symbol_mut(symbol).kind = SymbolKind::Error;
            return;
        }

        let size = self.info.types.size_of(ty);
        let alignment = self.info.types.alignment_of(ty).max(1);
        let offset = align_next_multiple(self.info.globals_size, alignment);
        self.info.globals_size = offset + size;

        if let Some(value) = value {
            match self.evaluate_comptime(value, ty, table) {
                Some(folded) => {
                    self.info.comptime_folds.insert(value, folded);
                    let bytes = self.comptime_to_bytes(folded, size);
                    self.info.global_initializers.push((offset, bytes));
                }
                None => {
                    let range = self.range_of(value);
                    self.error(
                        "global initialisers must be compile-time constants",
                        range,
                    );
                }
            }
        }

        self.info.tables.symbol_mut(symbol).kind = SymbolKind::Global { ty, offset };
    }

    fn comptime_to_bytes(&self, value: ComptimeValue, size: usize) -> Vec<u8> {
        let mut bytes = match value {
            ComptimeValue::Int(v) => v.to_le_bytes().to_vec(),
            ComptimeValue::Float(v) => v.to_le_bytes().to_vec(),
            ComptimeValue::Bool(v) => vec![v as u8],
        };
        bytes.truncate(size.max(1));
        while bytes.len() < size {
            bytes.push(0);
        }
        bytes
    }

    // ------------------------------------------------------------------
    // Function bodies
    // ------------------------------------------------------------------

    fn analyse_body(&mut self, index: usize) {
        let DefKind::Function { function } = self.definitions[index].kind else {
            return;
        };
        let symbol = self.definitions[index].symbol;
        if matches!(
            self.info.tables.symbol(symbol).kind,
            SymbolKind::PolymorphicFunction { .. } | SymbolKind::Error
        ) {
            return;
        }
        // Headers that never produced a signature leave nothing to check
        // or generate code for.
        if !self.info.expr_types.contains_key(&function) {
            return;
        }
        self.check_function_body(function);
        self.info.functions.push(function);
    }

    fn detect_main(&mut self) {
        let pool = identifier_pool();
        let main = pool.intern("main");
        let root = self.info.tables.root();
        if let Some(symbol) = self.info.tables.lookup_local(root, main) {
            if let SymbolKind::Function { function, .. } = self.info.tables.symbol(symbol).kind {
                self.info.main_function = Some(function);
            }
        }
    }

    // ------------------------------------------------------------------
    // Comptime evaluation
    // ------------------------------------------------------------------

    /// Folds or executes a comptime expression. Constant folding covers
    /// the literal/operator subset; anything else compiles the analysed
    /// functions plus a synthetic entry and runs the VM.
    pub(crate) fn evaluate_comptime(
        &mut self,
        expr: NodeId,
        ty: TypeId,
        table: TableId,
    ) -> Option<ComptimeValue> {
        if let Some(folded) = self.const_fold(expr, table) {
            return Some(folded);
        }

        let supported = matches!(
            self.info.types.ty(ty),
            Type::Primitive(
                Primitive::I8
                    | Primitive::I16
                    | Primitive::I32
                    | Primitive::I64
                    | Primitive::U8
                    | Primitive::U16
                    | Primitive::U32
                    | Primitive::U64
                    | Primitive::F32
                    | Primitive::Bool
            ) | Type::Enum(_)
        );
        if !supported {
            let range = self.range_of(expr);
            self.error(
                format!(
                    "comptime evaluation only supports primitive results, not {}",
                    self.info.types.display(ty)
                ),
                range,
            );
            return None;
        }

        let signature = self.info.types.function_type(Vec::new(), ty);
        let mut ir_program = ir::generate_program(self.ast, &self.info);
        ir::generate_comptime_entry(self.ast, &self.info, &mut ir_program, expr, signature);
        let program = bytecode::generate(&ir_program, &self.info, expr);

        let mut host = BufferedHost::default();
        let mut interpreter =
            Interpreter::new(&program, &mut host).with_instruction_limit(50_000_000);
        let exit = interpreter.run();
        if exit != ExitCode::Success {
            let range = self.range_of(expr);
            self.error(format!("comptime evaluation failed: {exit}"), range);
            return None;
        }

        let bytes = interpreter.return_value_bytes();
        Some(self.decode_comptime(bytes, ty))
    }

    fn decode_comptime(&self, bytes: &[u8], ty: TypeId) -> ComptimeValue {
        let mut raw = [0u8; 8];
        let len = bytes.len().min(8);
        raw[..len].copy_from_slice(&bytes[..len]);
        match self.info.types.ty(ty) {
            Type::Primitive(Primitive::F32) => {
                let mut b = [0u8; 4];
                b.copy_from_slice(&raw[..4]);
                ComptimeValue::Float(f32::from_le_bytes(b))
            }
            Type::Primitive(Primitive::Bool) => ComptimeValue::Bool(raw[0] != 0),
            Type::Primitive(p) if p.is_signed() => {
                let size = p.size();
                let mut value = i64::from_le_bytes(raw);
                // Sign-extend from the stored width.
                let shift = 64 - (size * 8) as u32;
                value = (value << shift) >> shift;
                ComptimeValue::Int(value)
            }
            _ => ComptimeValue::Int(i64::from_le_bytes(raw)),
        }
    }

    /// Folds literals, comptime symbols and operator chains without
    /// running the VM. Returns `None` when anything non-constant (or a
    /// division by zero) shows up.
    pub(crate) fn const_fold(&self, expr: NodeId, table: TableId) -> Option<ComptimeValue> {
        if let Some(folded) = self.info.comptime_folds.get(&expr) {
            return Some(*folded);
        }
        let NodeKind::Expression(expression) = &self.ast.node(expr).kind else {
            return None;
        };
        match expression {
            Expression::Literal { value } => match value {
                upp_source::LiteralValue::Integer(v) => Some(ComptimeValue::Int(*v)),
                upp_source::LiteralValue::Float(v) => Some(ComptimeValue::Float(*v as f32)),
                upp_source::LiteralValue::Boolean(v) => Some(ComptimeValue::Bool(*v)),
                _ => None,
            },
            Expression::SymbolRead { read } => {
                let symbol = self.info.resolved_terminal(self.ast, *read).or_else(|| {
                    // During scheduling the read may not be recorded yet.
                    let path: Vec<Ident> = self
                        .ast
                        .symbol_read_path(*read)
                        .into_iter()
                        .map(|(_, name)| name)
                        .collect();
                    self.lookup_path(table, &path)
                })?;
                match self.info.tables.symbol(symbol).kind {
                    SymbolKind::ComptimeValue { value, .. } => Some(value),
                    _ => None,
                }
            }
            Expression::Unop { op, expr: operand } => {
                let value = self.const_fold(*operand, table)?;
                match (op, value) {
                    (upp_language::ast::Unop::Negate, ComptimeValue::Int(v)) => {
                        Some(ComptimeValue::Int(v.wrapping_neg()))
                    }
                    (upp_language::ast::Unop::Negate, ComptimeValue::Float(v)) => {
                        Some(ComptimeValue::Float(-v))
                    }
                    (upp_language::ast::Unop::Not, ComptimeValue::Bool(v)) => {
                        Some(ComptimeValue::Bool(!v))
                    }
                    _ => None,
                }
            }
            Expression::Binop { op, left, right } => {
                let l = self.const_fold(*left, table)?;
                let r = self.const_fold(*right, table)?;
                fold_binop(*op, l, r)
            }
            _ => None,
        }
    }

    pub(crate) fn lookup_path(&self, table: TableId, path: &[Ident]) -> Option<SymbolId> {
        let (&head, rest) = path.split_first()?;
        let mut symbol = self.info.tables.lookup(table, head)?;
        for &hop in rest {
            let SymbolKind::Module { table } = self.info.tables.symbol(symbol).kind else {
                return None;
            };
            symbol = self.info.tables.lookup_local(table, hop)?;
        }
        Some(symbol)
    }
}

fn fold_binop(
    op: upp_language::ast::Binop,
    left: ComptimeValue,
    right: ComptimeValue,
) -> Option<ComptimeValue> {
    use upp_language::ast::Binop;
    use ComptimeValue::{Bool, Float, Int};
    Some(match (op, left, right) {
        (Binop::Addition, Int(l), Int(r)) => Int(l.wrapping_add(r)),
        (Binop::Subtraction, Int(l), Int(r)) => Int(l.wrapping_sub(r)),
        (Binop::Multiplication, Int(l), Int(r)) => Int(l.wrapping_mul(r)),
        (Binop::Division, Int(l), Int(r)) => {
            if r == 0 {
                return None;
            }
            Int(l.wrapping_div(r))
        }
        (Binop::Modulo, Int(l), Int(r)) => {
            if r == 0 {
                return None;
            }
            Int(l.wrapping_rem(r))
        }
        (Binop::Addition, Float(l), Float(r)) => Float(l + r),
        (Binop::Subtraction, Float(l), Float(r)) => Float(l - r),
        (Binop::Multiplication, Float(l), Float(r)) => Float(l * r),
        (Binop::Division, Float(l), Float(r)) => Float(l / r),
        (Binop::And, Bool(l), Bool(r)) => Bool(l && r),
        (Binop::Or, Bool(l), Bool(r)) => Bool(l || r),
        (Binop::Equal, Int(l), Int(r)) => Bool(l == r),
        (Binop::NotEqual, Int(l), Int(r)) => Bool(l != r),
        (Binop::Less, Int(l), Int(r)) => Bool(l < r),
        (Binop::LessOrEqual, Int(l), Int(r)) => Bool(l <= r),
        (Binop::Greater, Int(l), Int(r)) => Bool(l > r),
        (Binop::GreaterOrEqual, Int(l), Int(r)) => Bool(l >= r),
        _ => return None,
    })
}
