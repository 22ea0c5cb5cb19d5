//! Scoped symbol tables.
//!
//! Tables form a tree mirroring lexical scopes: root module → nested
//! modules → function scopes → code blocks. Lookup walks parents; path
//! lookup (`A~B~c`) requires every non-terminal hop to resolve to a
//! MODULE symbol and continues in that module's table.

use rustc_hash::FxHashMap;
use upp_base::{Arena, Id, Ident};
use upp_language::NodeId;

use crate::hardcoded::HardcodedFunction;
use crate::types::TypeId;

pub type SymbolId = Id<Symbol>;
pub type TableId = Id<SymbolTable>;

/// A constant folded at analysis time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComptimeValue {
    Int(i64),
    Float(f32),
    Bool(bool),
}

/// What a name refers to.
#[derive(Debug, Clone)]
pub enum SymbolKind {
    HardcodedFunction(HardcodedFunction),
    /// A function; the node is the function expression.
    Function {
        function: NodeId,
        signature: TypeId,
    },
    Module {
        table: TableId,
    },
    Type {
        ty: TypeId,
    },
    Variable {
        ty: TypeId,
        mutable: bool,
    },
    ComptimeValue {
        ty: TypeId,
        value: ComptimeValue,
    },
    Parameter {
        ty: TypeId,
        index: usize,
    },
    Global {
        ty: TypeId,
        /// Byte offset in the global data region.
        offset: usize,
    },
    /// A `$`-parameter value bound during instantiation.
    PolymorphicValue {
        ty: TypeId,
    },
    /// A function with comptime (`$`) parameters.
    PolymorphicFunction {
        function: NodeId,
    },
    Alias {
        target: SymbolId,
    },
    /// Resolution failed; reads of this symbol stay quiet.
    Error,
    /// Collected but not yet analysed.
    Unfinished,
}

#[derive(Debug)]
pub struct Symbol {
    pub name: Ident,
    pub kind: SymbolKind,
    /// The definition (or parameter) node that introduced the symbol.
    pub defined_at: Option<NodeId>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    pub parent: Option<TableId>,
    symbols: FxHashMap<Ident, SymbolId>,
}

/// All tables and symbols of one compilation.
#[derive(Debug, Default)]
pub struct SymbolTables {
    pub tables: Arena<SymbolTable>,
    pub symbols: Arena<Symbol>,
    root: Option<TableId>,
}

impl SymbolTables {
    pub fn new() -> SymbolTables {
        let mut tables = SymbolTables {
            tables: Arena::new(),
            symbols: Arena::new(),
            root: None,
        };
        let root = tables.create_table(None);
        tables.root = Some(root);
        tables
    }

    pub fn root(&self) -> TableId {
        self.root.expect("root table created in new()")
    }

    pub fn create_table(&mut self, parent: Option<TableId>) -> TableId {
        self.tables.alloc(SymbolTable {
            parent,
            symbols: FxHashMap::default(),
        })
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    /// Defines `name` in `table`. Returns `Err` with the existing symbol
    /// on redefinition in the same scope.
    pub fn define(
        &mut self,
        table: TableId,
        name: Ident,
        kind: SymbolKind,
        defined_at: Option<NodeId>,
    ) -> Result<SymbolId, SymbolId> {
        if let Some(&existing) = self.tables[table].symbols.get(&name) {
            return Err(existing);
        }
        let id = self.symbols.alloc(Symbol {
            name,
            kind,
            defined_at,
        });
        self.tables[table].symbols.insert(name, id);
        Ok(id)
    }

    /// Looks `name` up in `table` only.
    pub fn lookup_local(&self, table: TableId, name: Ident) -> Option<SymbolId> {
        self.tables[table].symbols.get(&name).copied()
    }

    /// Looks `name` up in `table` and its parents, innermost first.
    pub fn lookup(&self, table: TableId, name: Ident) -> Option<SymbolId> {
        let mut current = Some(table);
        while let Some(t) = current {
            if let Some(&symbol) = self.tables[t].symbols.get(&name) {
                return Some(symbol);
            }
            current = self.tables[t].parent;
        }
        None
    }

    /// Follows an alias chain to the symbol it names.
    pub fn resolve_alias(&self, mut id: SymbolId) -> SymbolId {
        while let SymbolKind::Alias { target } = self.symbols[id].kind {
            id = target;
        }
        id
    }

    /// Iterates symbols of one table (unspecified order).
    pub fn symbols_of(&self, table: TableId) -> impl Iterator<Item = SymbolId> + '_ {
        self.tables[table].symbols.values().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_base::identifier_pool;

    fn ident(s: &str) -> Ident {
        identifier_pool().intern(s)
    }

    #[test]
    fn define_and_lookup() {
        let mut tables = SymbolTables::new();
        let name = ident("value");
        let id = tables
            .define(tables.root(), name, SymbolKind::Unfinished, None)
            .unwrap();
        assert_eq!(tables.lookup(tables.root(), name), Some(id));
    }

    #[test]
    fn redefinition_in_same_scope_is_rejected() {
        let mut tables = SymbolTables::new();
        let name = ident("twice");
        let first = tables
            .define(tables.root(), name, SymbolKind::Unfinished, None)
            .unwrap();
        let err = tables
            .define(tables.root(), name, SymbolKind::Unfinished, None)
            .unwrap_err();
        assert_eq!(err, first);
    }

    #[test]
    fn lookup_falls_back_to_parent_scope() {
        let mut tables = SymbolTables::new();
        let name = ident("outer");
        let id = tables
            .define(tables.root(), name, SymbolKind::Unfinished, None)
            .unwrap();
        let child = tables.create_table(Some(tables.root()));
        assert_eq!(tables.lookup(child, name), Some(id));
        assert_eq!(tables.lookup_local(child, name), None);
    }

    #[test]
    fn shadowing_resolves_innermost_first() {
        let mut tables = SymbolTables::new();
        let name = ident("shadowed");
        tables
            .define(tables.root(), name, SymbolKind::Unfinished, None)
            .unwrap();
        let child = tables.create_table(Some(tables.root()));
        let inner = tables
            .define(child, name, SymbolKind::Error, None)
            .unwrap();
        assert_eq!(tables.lookup(child, name), Some(inner));
    }

    #[test]
    fn alias_chain_resolves() {
        let mut tables = SymbolTables::new();
        let target = tables
            .define(tables.root(), ident("target"), SymbolKind::Unfinished, None)
            .unwrap();
        let alias = tables
            .define(
                tables.root(),
                ident("alias"),
                SymbolKind::Alias { target },
                None,
            )
            .unwrap();
        assert_eq!(tables.resolve_alias(alias), target);
    }
}
