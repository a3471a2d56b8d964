//! The read-only module form consumed by code generation, plus the value
//! and reference types shared with the runtime.

use core::fmt;
use std::sync::Mutex;

use cranelift_entity::{entity_impl, PrimaryMap};
use once_cell::sync::Lazy;

use crate::util::{DenseStaticIntSet, HashIndex};

/// The largest element count any table may reach, regardless of its
/// declared maximum.
pub const MAX_TABLE_ELEMS: u64 = 1 << 32;

/// Index of a function type within a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TypeIndex(u32);
entity_impl!(TypeIndex);

/// Index of a function within a module (imports precede defs).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct FuncIndex(u32);
entity_impl!(FuncIndex);

/// Index of a defined (non-imported) function within a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct DefinedFuncIndex(u32);
entity_impl!(DefinedFuncIndex);

/// Index of a table within a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TableIndex(u32);
entity_impl!(TableIndex);

/// Index of a linear memory within a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct MemoryIndex(u32);
entity_impl!(MemoryIndex);

/// Index of a global within a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct GlobalIndex(u32);
entity_impl!(GlobalIndex);

/// Index of an exception type within a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ExceptionTypeIndex(u32);
entity_impl!(ExceptionTypeIndex);

/// Index of an element segment within a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ElemSegmentIndex(u32);
entity_impl!(ElemSegmentIndex);

/// A WebAssembly value type. `Any` is a sentinel with no runtime
/// representation of its own.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueType {
    Any,
    I32,
    I64,
    F32,
    F64,
    V128,
    AnyRef,
    FuncRef,
    NullRef,
}

impl ValueType {
    /// Fixed bit width of the value's runtime representation; `Any` has
    /// none, references are platform words.
    pub fn bit_width(self) -> Option<u32> {
        match self {
            ValueType::Any => None,
            ValueType::I32 | ValueType::F32 => Some(32),
            ValueType::I64 | ValueType::F64 => Some(64),
            ValueType::V128 => Some(128),
            ValueType::AnyRef | ValueType::FuncRef | ValueType::NullRef => Some(usize::BITS),
        }
    }

    pub fn is_reference(self) -> bool {
        self.as_ref_type().is_some()
    }

    pub fn as_ref_type(self) -> Option<RefType> {
        match self {
            ValueType::AnyRef => Some(RefType::Any),
            ValueType::FuncRef => Some(RefType::Func),
            ValueType::NullRef => Some(RefType::Null),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Any => "any",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::V128 => "v128",
            ValueType::AnyRef => "anyref",
            ValueType::FuncRef => "funcref",
            ValueType::NullRef => "nullref",
        };
        f.write_str(name)
    }
}

/// A reference type: `Any` is the top of the subtype lattice, `Null` the
/// bottom.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Any,
    Func,
    Null,
}

impl RefType {
    pub fn is_subtype_of(self, superty: RefType) -> bool {
        self == superty || self == RefType::Null || superty == RefType::Any
    }

    pub fn to_value_type(self) -> ValueType {
        match self {
            RefType::Any => ValueType::AnyRef,
            RefType::Func => ValueType::FuncRef,
            RefType::Null => ValueType::NullRef,
        }
    }
}

/// A 128-bit vector value, stored as little-endian lane bytes.
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub struct V128(pub [u8; 16]);

macro_rules! v128_lanes {
    ($set:ident, $get:ident, $ty:ty, $count:expr) => {
        pub fn $set(&mut self, lane: usize, value: $ty) {
            assert!(lane < $count);
            let bytes = value.to_le_bytes();
            let size = core::mem::size_of::<$ty>();
            self.0[lane * size..(lane + 1) * size].copy_from_slice(&bytes);
        }

        pub fn $get(&self, lane: usize) -> $ty {
            assert!(lane < $count);
            let size = core::mem::size_of::<$ty>();
            <$ty>::from_le_bytes(self.0[lane * size..(lane + 1) * size].try_into().unwrap())
        }
    };
}

impl V128 {
    v128_lanes!(set_u8, u8_lane, u8, 16);
    v128_lanes!(set_u16, u16_lane, u16, 8);
    v128_lanes!(set_u32, u32_lane, u32, 4);
    v128_lanes!(set_u64, u64_lane, u64, 2);
    v128_lanes!(set_f32, f32_lane, f32, 4);
    v128_lanes!(set_f64, f64_lane, f64, 2);
}

/// An arity-tagged function signature.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct FunctionSig {
    pub params: Box<[ValueType]>,
    pub results: Box<[ValueType]>,
}

impl FunctionSig {
    pub fn new(
        params: impl Into<Box<[ValueType]>>,
        results: impl Into<Box<[ValueType]>>,
    ) -> Self {
        Self {
            params: params.into(),
            results: results.into(),
        }
    }
}

impl fmt::Display for FunctionSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> (")?;
        for (i, result) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{result}")?;
        }
        write!(f, ")")
    }
}

/// The process-wide encoding of a function signature: equal encodings mean
/// equal signatures, so indirect-call type checks compare one word.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TypeEncoding(usize);

impl TypeEncoding {
    /// The encoding carried by sentinel objects that are not callable.
    pub const NONE: TypeEncoding = TypeEncoding(0);

    pub fn as_usize(self) -> usize {
        self.0
    }

    /// Reconstitutes an encoding a generated caller passed back as a
    /// pointer-sized integer.
    pub fn from_usize(raw: usize) -> TypeEncoding {
        TypeEncoding(raw)
    }
}

struct TypeRegistry {
    by_sig: HashIndex<FunctionSig, TypeEncoding>,
    sigs: Vec<FunctionSig>,
}

static TYPE_REGISTRY: Lazy<Mutex<TypeRegistry>> = Lazy::new(|| {
    Mutex::new(TypeRegistry {
        by_sig: HashIndex::new(),
        sigs: Vec::new(),
    })
});

/// Interns `sig`, returning its process-wide encoding.
pub fn intern_sig(sig: &FunctionSig) -> TypeEncoding {
    let mut registry = TYPE_REGISTRY.lock().unwrap();
    let TypeRegistry { by_sig, sigs } = &mut *registry;
    *by_sig.get_or_add(sig.clone(), || {
        sigs.push(sig.clone());
        TypeEncoding(sigs.len())
    })
}

/// The signature a previously interned encoding stands for.
pub fn signature_of(encoding: TypeEncoding) -> Option<FunctionSig> {
    if encoding == TypeEncoding::NONE {
        return None;
    }
    let registry = TYPE_REGISTRY.lock().unwrap();
    registry.sigs.get(encoding.0 - 1).cloned()
}

/// Unsigned size bounds; an absent maximum is `u64::MAX`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SizeConstraints {
    pub min: u64,
    pub max: u64,
}

impl SizeConstraints {
    pub fn at_least(min: u64) -> Self {
        Self { min, max: u64::MAX }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TableType {
    pub element_type: RefType,
    pub size: SizeConstraints,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MemoryType {
    pub size: SizeConstraints,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub is_mutable: bool,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExceptionType {
    pub params: Box<[ValueType]>,
}

/// An imported function: resolved by name at load time.
#[derive(Clone, Debug)]
pub struct FunctionImport {
    pub module: String,
    pub name: String,
    pub type_index: TypeIndex,
}

/// A validated instruction stream. Opaque to this crate; a per-function
/// emitter supplied to code generation consumes it.
#[derive(Clone, Debug, Default)]
pub struct FunctionBody(pub Box<[u8]>);

#[derive(Clone, Debug)]
pub struct FunctionDef {
    pub type_index: TypeIndex,
    pub locals: Box<[ValueType]>,
    pub body: FunctionBody,
}

/// The module's functions: imports first, then defs, sharing one
/// [`FuncIndex`] space.
#[derive(Default, Debug)]
pub struct FunctionIndexSpace {
    pub imports: Vec<FunctionImport>,
    pub defs: PrimaryMap<DefinedFuncIndex, FunctionDef>,
}

impl FunctionIndexSpace {
    pub fn len(&self) -> usize {
        self.imports.len() + self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_of(&self, func: FuncIndex) -> TypeIndex {
        match self.defined_index(func) {
            None => self.imports[func.as_u32() as usize].type_index,
            Some(def) => self.defs[def].type_index,
        }
    }

    pub fn function_index(&self, def: DefinedFuncIndex) -> FuncIndex {
        FuncIndex::from_u32(self.imports.len() as u32 + def.as_u32())
    }

    pub fn defined_index(&self, func: FuncIndex) -> Option<DefinedFuncIndex> {
        let num_imports = self.imports.len() as u32;
        if func.as_u32() < num_imports {
            None
        } else {
            Some(DefinedFuncIndex::from_u32(func.as_u32() - num_imports))
        }
    }
}

/// One entry of an element segment.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Elem {
    RefNull,
    RefFunc(FuncIndex),
}

#[derive(Clone, Debug)]
pub struct ElemSegment {
    /// The table an active segment initializes; passive segments have none.
    pub table_index: Option<TableIndex>,
    pub entries: Box<[Elem]>,
}

/// WebAssembly proposals a module may require.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Feature {
    ReferenceTypes,
    BulkMemory,
    Simd,
    ExceptionHandling,
    SharedTables,
    NonTrappingFloatToInt,
}

impl Feature {
    const ALL: [Feature; 6] = [
        Feature::ReferenceTypes,
        Feature::BulkMemory,
        Feature::Simd,
        Feature::ExceptionHandling,
        Feature::SharedTables,
        Feature::NonTrappingFloatToInt,
    ];
}

/// The set of features a module requires, dense over [`Feature`].
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct FeatureSet(DenseStaticIntSet<1>);

impl FeatureSet {
    pub const fn new() -> Self {
        Self(DenseStaticIntSet::new())
    }

    /// Every feature the implementation knows about.
    pub fn all() -> Self {
        let mut set = Self::new();
        for feature in Feature::ALL {
            set.add(feature);
        }
        set
    }

    pub fn add(&mut self, feature: Feature) {
        self.0.add(feature as usize);
    }

    pub fn contains(self, feature: Feature) -> bool {
        self.0.contains(feature as usize)
    }

    pub fn union(self, other: FeatureSet) -> FeatureSet {
        FeatureSet(self.0 | other.0)
    }

    pub fn is_subset_of(self, other: FeatureSet) -> bool {
        (self.0 & !other.0).is_empty()
    }
}

/// A validated module, ready for code generation. Malformed contents are a
/// caller precondition; nothing here re-validates.
#[derive(Default, Debug)]
pub struct Module {
    pub types: PrimaryMap<TypeIndex, FunctionSig>,
    pub functions: FunctionIndexSpace,
    pub tables: PrimaryMap<TableIndex, TableType>,
    pub memories: PrimaryMap<MemoryIndex, MemoryType>,
    pub globals: PrimaryMap<GlobalIndex, GlobalType>,
    pub exception_types: PrimaryMap<ExceptionTypeIndex, ExceptionType>,
    pub elem_segments: PrimaryMap<ElemSegmentIndex, ElemSegment>,
    pub required_features: FeatureSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_subtyping() {
        assert!(RefType::Null.is_subtype_of(RefType::Func));
        assert!(RefType::Null.is_subtype_of(RefType::Any));
        assert!(RefType::Func.is_subtype_of(RefType::Any));
        assert!(RefType::Func.is_subtype_of(RefType::Func));
        assert!(!RefType::Any.is_subtype_of(RefType::Func));
        assert!(!RefType::Func.is_subtype_of(RefType::Null));
    }

    #[test]
    fn interning_is_identity_per_signature() {
        let a = FunctionSig::new([ValueType::I32], [ValueType::I64]);
        let b = FunctionSig::new([ValueType::I32], [ValueType::I64]);
        let c = FunctionSig::new([ValueType::I64], [ValueType::I64]);
        assert_eq!(intern_sig(&a), intern_sig(&b));
        assert_ne!(intern_sig(&a), intern_sig(&c));
        assert_ne!(intern_sig(&a), TypeEncoding::NONE);
        assert_eq!(signature_of(intern_sig(&a)), Some(a));
        assert_eq!(signature_of(TypeEncoding::NONE), None);
    }

    #[test]
    fn function_index_space_partitions() {
        let mut functions = FunctionIndexSpace::default();
        functions.imports.push(FunctionImport {
            module: "env".into(),
            name: "f".into(),
            type_index: TypeIndex::from_u32(0),
        });
        functions.defs.push(FunctionDef {
            type_index: TypeIndex::from_u32(1),
            locals: Box::new([]),
            body: FunctionBody::default(),
        });
        assert_eq!(functions.len(), 2);
        assert_eq!(functions.defined_index(FuncIndex::from_u32(0)), None);
        assert_eq!(
            functions.defined_index(FuncIndex::from_u32(1)),
            Some(DefinedFuncIndex::from_u32(0))
        );
        assert_eq!(
            functions.function_index(DefinedFuncIndex::from_u32(0)),
            FuncIndex::from_u32(1)
        );
        assert_eq!(
            functions.type_of(FuncIndex::from_u32(1)),
            TypeIndex::from_u32(1)
        );
    }

    #[test]
    fn v128_lane_round_trip() {
        let mut v = V128::default();
        v.set_u32(0, 0xdead_beef);
        v.set_u32(3, 1);
        assert_eq!(v.u32_lane(0), 0xdead_beef);
        assert_eq!(v.u32_lane(3), 1);
        assert_eq!(v.u64_lane(0) as u32, 0xdead_beef);

        // Float lanes are bit-exact over the same bytes.
        v.set_f32(1, -0.0);
        assert_eq!(v.f32_lane(1).to_bits(), 0x8000_0000);
        assert_eq!(v.u32_lane(1), 0x8000_0000);
        v.set_f64(1, f64::NEG_INFINITY);
        assert_eq!(v.f64_lane(1).to_bits(), f64::NEG_INFINITY.to_bits());
        assert_eq!(v.u64_lane(1), f64::NEG_INFINITY.to_bits());
    }

    #[test]
    fn sig_display() {
        let sig = FunctionSig::new([ValueType::I32, ValueType::FuncRef], [ValueType::F64]);
        assert_eq!(sig.to_string(), "(i32, funcref) -> (f64)");
    }
}
