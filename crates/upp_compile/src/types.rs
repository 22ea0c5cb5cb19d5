//! The type system: interner, structural derivation and layout.
//!
//! Primitive types are pre-registered; pointer, array, slice and
//! function types are derived lazily and interned, so type equality is
//! id equality. Struct, union and enum types are nominal — created once
//! from their AST node — which keeps self-referencing aggregates
//! (`Node :: struct` with a `*Node` member) well-founded.
//!
//! Every type's `size`/`alignment` is computed when the type is
//! materialised and immutable afterwards. All layout arithmetic goes
//! through [`align_next_multiple`].

use rustc_hash::FxHashMap;
use upp_base::Ident;

/// Handle into the type table; equality is type equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Rounds `offset` up to the next multiple of `alignment`.
pub fn align_next_multiple(offset: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return offset;
    }
    offset + (alignment - offset % alignment) % alignment
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
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
    Void,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::F32 => "f32",
            Primitive::Bool => "bool",
            Primitive::Void => "void",
        }
    }

    pub fn size(self) -> usize {
        match self {
            Primitive::I8 | Primitive::U8 | Primitive::Bool => 1,
            Primitive::I16 | Primitive::U16 => 2,
            Primitive::I32 | Primitive::U32 | Primitive::F32 => 4,
            Primitive::I64 | Primitive::U64 => 8,
            Primitive::Void => 0,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::I8
                | Primitive::I16
                | Primitive::I32
                | Primitive::I64
                | Primitive::U8
                | Primitive::U16
                | Primitive::U32
                | Primitive::U64
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self == Primitive::F32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: Ident,
    pub ty: TypeId,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub name: Ident,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionType {
    pub name: Ident,
    pub variants: Vec<StructField>,
    /// Offset of the `u32` tag; `None` for `c_union`.
    pub tag_offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: Ident,
    pub members: Vec<(Ident, i64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub parameters: Vec<TypeId>,
    pub return_type: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Primitive(Primitive),
    Pointer(TypeId),
    Array { size: usize, element: TypeId },
    Slice(TypeId),
    Struct(StructType),
    Union(UnionType),
    Enum(EnumType),
    Function(FunctionType),
    /// Infects downstream checks without cascading errors.
    Error,
}

#[derive(Debug)]
struct TypeInfo {
    ty: Type,
    size: usize,
    alignment: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DerivedKey {
    Pointer(TypeId),
    Array(usize, TypeId),
    Slice(TypeId),
    Function(Vec<TypeId>, TypeId),
}

/// The per-compilation type table.
pub struct TypeSystem {
    types: Vec<TypeInfo>,
    derived: FxHashMap<DerivedKey, TypeId>,
    primitives: FxHashMap<Primitive, TypeId>,
    error: TypeId,
}

pub const POINTER_SIZE: usize = 8;
/// A slice is `(pointer, length)`; length is an `i64`.
pub const SLICE_SIZE: usize = 16;

impl TypeSystem {
    pub fn new() -> TypeSystem {
        let mut system = TypeSystem {
            types: Vec::new(),
            derived: FxHashMap::default(),
            primitives: FxHashMap::default(),
            error: TypeId(0),
        };
        system.error = system.push(Type::Error, 0, 1);
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
            let size = primitive.size();
            let alignment = size.max(1);
            let id = system.push(Type::Primitive(primitive), size, alignment);
            system.primitives.insert(primitive, id);
        }
        system
    }

    fn push(&mut self, ty: Type, size: usize, alignment: usize) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeInfo {
            ty,
            size,
            alignment,
        });
        id
    }

    pub fn error_type(&self) -> TypeId {
        self.error
    }

    pub fn primitive(&self, primitive: Primitive) -> TypeId {
        self.primitives[&primitive]
    }

    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.index()].ty
    }

    pub fn size_of(&self, id: TypeId) -> usize {
        self.types[id.index()].size
    }

    pub fn alignment_of(&self, id: TypeId) -> usize {
        self.types[id.index()].alignment
    }

    pub fn is_error(&self, id: TypeId) -> bool {
        id == self.error
    }

    pub fn is_primitive(&self, id: TypeId, primitive: Primitive) -> bool {
        matches!(self.ty(id), Type::Primitive(p) if *p == primitive)
    }

    pub fn as_primitive(&self, id: TypeId) -> Option<Primitive> {
        match self.ty(id) {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        let key = DerivedKey::Pointer(pointee);
        if let Some(&id) = self.derived.get(&key) {
            return id;
        }
        let id = self.push(Type::Pointer(pointee), POINTER_SIZE, POINTER_SIZE);
        self.derived.insert(key, id);
        id
    }

    pub fn array_of(&mut self, size: usize, element: TypeId) -> TypeId {
        let key = DerivedKey::Array(size, element);
        if let Some(&id) = self.derived.get(&key) {
            return id;
        }
        let element_size = self.size_of(element);
        let alignment = self.alignment_of(element).max(1);
        let stride = align_next_multiple(element_size, alignment);
        let id = self.push(
            Type::Array { size, element },
            stride * size,
            alignment,
        );
        self.derived.insert(key, id);
        id
    }

    pub fn slice_of(&mut self, element: TypeId) -> TypeId {
        let key = DerivedKey::Slice(element);
        if let Some(&id) = self.derived.get(&key) {
            return id;
        }
        let id = self.push(Type::Slice(element), SLICE_SIZE, POINTER_SIZE);
        self.derived.insert(key, id);
        id
    }

    pub fn function_type(&mut self, parameters: Vec<TypeId>, return_type: TypeId) -> TypeId {
        let key = DerivedKey::Function(parameters.clone(), return_type);
        if let Some(&id) = self.derived.get(&key) {
            return id;
        }
        let id = self.push(
            Type::Function(FunctionType {
                parameters,
                return_type,
            }),
            POINTER_SIZE,
            POINTER_SIZE,
        );
        self.derived.insert(key, id);
        id
    }

    /// Reserves a nominal struct type with no fields yet, so members can
    /// reference it (behind pointers) while it is being analysed.
    pub fn declare_struct(&mut self, name: Ident) -> TypeId {
        self.push(
            Type::Struct(StructType {
                name,
                fields: Vec::new(),
            }),
            0,
            1,
        )
    }

    /// Lays a struct out with natural alignment and trailing padding.
    pub fn finish_struct(&mut self, id: TypeId, members: Vec<(Ident, TypeId)>) {
        let mut fields = Vec::with_capacity(members.len());
        let mut offset = 0usize;
        let mut alignment = 1usize;
        for (name, ty) in members {
            let member_align = self.alignment_of(ty).max(1);
            let member_size = self.size_of(ty);
            offset = align_next_multiple(offset, member_align);
            fields.push(StructField {
                name,
                ty,
                offset,
            });
            offset += member_size;
            alignment = alignment.max(member_align);
        }
        let size = align_next_multiple(offset, alignment);
        let info = &mut self.types[id.index()];
        let Type::Struct(struct_type) = &mut info.ty else {
            panic!("finish_struct on a non-struct type");
        };
        struct_type.fields = fields;
        info.size = size;
        info.alignment = alignment;
    }

    pub fn declare_union(&mut self, name: Ident, tagged: bool) -> TypeId {
        self.push(
            Type::Union(UnionType {
                name,
                variants: Vec::new(),
                tag_offset: if tagged { Some(0) } else { None },
            }),
            0,
            1,
        )
    }

    /// Union layout: all variants at offset 0; a tagged union appends a
    /// `u32` tag after the widest variant.
    pub fn finish_union(&mut self, id: TypeId, members: Vec<(Ident, TypeId)>) {
        let mut variants = Vec::with_capacity(members.len());
        let mut data_size = 0usize;
        let mut alignment = 1usize;
        for (name, ty) in members {
            variants.push(StructField {
                name,
                ty,
                offset: 0,
            });
            data_size = data_size.max(self.size_of(ty));
            alignment = alignment.max(self.alignment_of(ty).max(1));
        }

        let info_tagged = {
            let Type::Union(u) = &self.types[id.index()].ty else {
                panic!("finish_union on a non-union type");
            };
            u.tag_offset.is_some()
        };
        let (tag_offset, size) = if info_tagged {
            alignment = alignment.max(4);
            let tag_offset = align_next_multiple(data_size, 4);
            (Some(tag_offset), align_next_multiple(tag_offset + 4, alignment))
        } else {
            (None, align_next_multiple(data_size, alignment))
        };

        let info = &mut self.types[id.index()];
        let Type::Union(union_type) = &mut info.ty else {
            unreachable!();
        };
        union_type.variants = variants;
        union_type.tag_offset = tag_offset;
        info.size = size;
        info.alignment = alignment;
    }

    /// Enums are `i64`-valued constants stored as `i32` at runtime.
    pub fn create_enum(&mut self, name: Ident, members: Vec<(Ident, i64)>) -> TypeId {
        self.push(Type::Enum(EnumType { name, members }), 4, 4)
    }

    pub fn struct_field(&self, id: TypeId, name: Ident) -> Option<&StructField> {
        match self.ty(id) {
            Type::Struct(s) => s.fields.iter().find(|f| f.name == name),
            Type::Union(u) => u.variants.iter().find(|f| f.name == name),
            _ => None,
        }
    }

    /// Human-readable type name for error messages.
    pub fn display(&self, id: TypeId) -> String {
        let pool = upp_base::identifier_pool();
        match self.ty(id) {
            Type::Primitive(p) => p.name().to_string(),
            Type::Pointer(child) => format!("*{}", self.display(*child)),
            Type::Array { size, element } => format!("[{}]{}", size, self.display(*element)),
            Type::Slice(element) => format!("[]{}", self.display(*element)),
            Type::Struct(s) => pool.resolve_owned(s.name),
            Type::Union(u) => pool.resolve_owned(u.name),
            Type::Enum(e) => pool.resolve_owned(e.name),
            Type::Function(f) => {
                let params: Vec<String> =
                    f.parameters.iter().map(|p| self.display(*p)).collect();
                format!(
                    "({}) -> {}",
                    params.join(", "),
                    self.display(f.return_type)
                )
            }
            Type::Error => "<error>".to_string(),
        }
    }
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_base::identifier_pool;

    #[test]
    fn align_next_multiple_rounds_up() {
        assert_eq!(align_next_multiple(0, 4), 0);
        assert_eq!(align_next_multiple(1, 4), 4);
        assert_eq!(align_next_multiple(4, 4), 4);
        assert_eq!(align_next_multiple(5, 8), 8);
        assert_eq!(align_next_multiple(13, 1), 13);
    }

    #[test]
    fn primitives_are_preregistered() {
        let types = TypeSystem::new();
        let i32_ty = types.primitive(Primitive::I32);
        assert_eq!(types.size_of(i32_ty), 4);
        assert_eq!(types.alignment_of(i32_ty), 4);
    }

    #[test]
    fn derived_types_are_interned() {
        let mut types = TypeSystem::new();
        let i32_ty = types.primitive(Primitive::I32);
        let a = types.pointer_to(i32_ty);
        let b = types.pointer_to(i32_ty);
        assert_eq!(a, b);

        let arr_a = types.array_of(4, i32_ty);
        let arr_b = types.array_of(4, i32_ty);
        assert_eq!(arr_a, arr_b);
        assert_ne!(arr_a, types.array_of(5, i32_ty));
    }

    #[test]
    fn array_layout_multiplies_stride() {
        let mut types = TypeSystem::new();
        let i32_ty = types.primitive(Primitive::I32);
        let arr = types.array_of(4, i32_ty);
        assert_eq!(types.size_of(arr), 16);
        assert_eq!(types.alignment_of(arr), 4);
    }

    #[test]
    fn struct_layout_uses_natural_alignment() {
        let mut types = TypeSystem::new();
        let pool = identifier_pool();
        let id = types.declare_struct(pool.intern("Mixed"));
        let u8_ty = types.primitive(Primitive::U8);
        let i32_ty = types.primitive(Primitive::I32);
        types.finish_struct(
            id,
            vec![
                (pool.intern("a"), u8_ty),
                (pool.intern("b"), i32_ty),
                (pool.intern("c"), u8_ty),
            ],
        );
        let field_b = types.struct_field(id, pool.intern("b")).unwrap();
        assert_eq!(field_b.offset, 4);
        assert_eq!(types.size_of(id), 12); // trailing padding to alignment 4
        assert_eq!(types.alignment_of(id), 4);
    }

    #[test]
    fn tagged_union_layout_appends_tag() {
        let mut types = TypeSystem::new();
        let pool = identifier_pool();
        let id = types.declare_union(pool.intern("Value"), true);
        let i64_ty = types.primitive(Primitive::I64);
        let f32_ty = types.primitive(Primitive::F32);
        types.finish_union(
            id,
            vec![(pool.intern("i"), i64_ty), (pool.intern("f"), f32_ty)],
        );
        let Type::Union(u) = types.ty(id) else {
            panic!()
        };
        assert_eq!(u.tag_offset, Some(8));
        assert_eq!(types.size_of(id), 16);
    }

    #[test]
    fn slice_is_pointer_plus_length() {
        let mut types = TypeSystem::new();
        let u8_ty = types.primitive(Primitive::U8);
        let slice = types.slice_of(u8_ty);
        assert_eq!(types.size_of(slice), SLICE_SIZE);
        assert_eq!(types.alignment_of(slice), POINTER_SIZE);
    }

    #[test]
    fn function_types_are_structural() {
        let mut types = TypeSystem::new();
        let i32_ty = types.primitive(Primitive::I32);
        let a = types.function_type(vec![i32_ty], i32_ty);
        let b = types.function_type(vec![i32_ty], i32_ty);
        assert_eq!(a, b);
    }
}
