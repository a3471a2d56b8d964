//! Module code generation.
//!
//! [`emit_module`] walks a validated module and produces a relocatable
//! native image: one function per IR function under the uniform "wasm"
//! calling convention, each defined function carrying a runtime prefix and
//! the host personality for unwinding, with every runtime object reached
//! through the closed external-symbol set of [`ExternalRef`]. The
//! per-function instruction emitter is pluggable and opaque to the driver.

mod abi;
mod debug;
mod externals;
mod image;

use std::time::Instant;

use cranelift_codegen::ir::Signature;
use cranelift_entity::PrimaryMap;
use gimli::RunTimeEndian;
use target_lexicon::{OperatingSystem, Triple};

use crate::ir::{DefinedFuncIndex, FuncIndex, FunctionBody, MemoryIndex, Module, TableIndex};
use crate::runtime::builtins::{IntrinsicIndex, IntrinsicSignatures};

pub use abi::{call_conv, pointer_type, value_type, wasm_call_signature, CallingConvention};
pub use externals::ExternalRef;
pub use image::{
    CodeRelocation, FunctionLoc, ManifestEntry, ModuleImage, RelocKind,
    WINDOWS_EXCEPTION_TYPE_DESCRIPTOR,
};

use debug::DebugInfo;
use image::ImageBuilder;

#[derive(thiserror::Error, Debug)]
pub enum EmitError {
    #[error("unsupported target {0}")]
    UnsupportedTarget(Triple),
    #[error("native image assembly failed: {0}")]
    Object(#[from] object::write::Error),
    #[error("debug info emission failed: {0}")]
    Dwarf(#[from] gimli::write::Error),
    #[error("function emission failed: {0}")]
    Emitter(String),
}

/// Code generation tuning knobs.
#[derive(Clone, Debug)]
pub struct CodegenTuning {
    pub opt_level: OptLevel,
    /// Features the target enables; modules requiring more are rejected.
    pub features: crate::ir::FeatureSet,
}

impl Default for CodegenTuning {
    fn default() -> CodegenTuning {
        CodegenTuning {
            opt_level: OptLevel::default(),
            features: crate::ir::FeatureSet::all(),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

/// The emission target: host triple plus tuning.
#[derive(Clone, Debug)]
pub struct CodegenTarget {
    pub triple: Triple,
    pub tuning: CodegenTuning,
}

impl CodegenTarget {
    pub fn new(triple: Triple) -> CodegenTarget {
        CodegenTarget {
            triple,
            tuning: CodegenTuning::default(),
        }
    }

    pub fn host() -> CodegenTarget {
        CodegenTarget::new(Triple::host())
    }

    /// Whether the target unwinds with Windows structured exception
    /// handling (selects the personality and the embedded type descriptor).
    pub fn uses_windows_seh(&self) -> bool {
        self.triple.operating_system == OperatingSystem::Windows
    }

    pub fn pointer_bytes(&self) -> u8 {
        self.triple
            .pointer_width()
            .map_or(8, |width| width.bytes())
    }

    fn endian(&self) -> RunTimeEndian {
        match self.triple.endianness() {
            Ok(target_lexicon::Endianness::Big) => RunTimeEndian::Big,
            _ => RunTimeEndian::Little,
        }
    }
}

/// Branch-weight and constrained-FP annotations shared across a module's
/// functions.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ModuleMetadata {
    /// Weights `[taken, not taken]` for branches expected to be taken.
    pub likely_true_branch_weights: [i32; 2],
    /// Weights `[taken, not taken]` for branches expected to fall through.
    pub likely_false_branch_weights: [i32; 2],
    pub fp_rounding_mode: &'static str,
    pub fp_exception_behavior: &'static str,
}

impl ModuleMetadata {
    pub fn new() -> ModuleMetadata {
        ModuleMetadata {
            likely_true_branch_weights: [i32::MAX, 0],
            likely_false_branch_weights: [0, i32::MAX],
            fp_rounding_mode: "round.tonearest",
            fp_exception_behavior: "fpexcept.strict",
        }
    }
}

impl Default for ModuleMetadata {
    fn default() -> ModuleMetadata {
        ModuleMetadata::new()
    }
}

/// Everything a per-function emitter can see while lowering one defined
/// function.
pub struct FunctionEmitContext<'a> {
    pub module: &'a Module,
    pub func_index: FuncIndex,
    pub def_index: DefinedFuncIndex,
    /// The function's signature under the "wasm" convention.
    pub signature: Signature,
    pub metadata: &'a ModuleMetadata,
    /// The table instructions index when they omit an explicit one.
    pub default_table: Option<TableIndex>,
    /// The memory instructions index when they omit an explicit one.
    pub default_memory: Option<MemoryIndex>,
    pub target: &'a CodegenTarget,
}

impl FunctionEmitContext<'_> {
    /// The host-convention signature for calling a registry intrinsic,
    /// relocated through its [`ExternalRef::Intrinsic`] symbol.
    pub fn intrinsic_signature(&self, intrinsic: IntrinsicIndex) -> Signature {
        IntrinsicSignatures::new(
            pointer_type(&self.target.triple),
            call_conv(CallingConvention::IntrinsicHost, &self.target.triple),
        )
        .signature(intrinsic)
    }
}

/// Machine code for one function body, with relocations against the
/// external-symbol set.
#[derive(Clone, Debug, Default)]
pub struct EmittedCode {
    pub bytes: Vec<u8>,
    pub relocations: Vec<CodeRelocation>,
    pub alignment: u64,
}

/// The pluggable per-function instruction emitter. The instruction set it
/// understands is opaque to the driver.
pub trait FunctionEmitter {
    fn emit_function(
        &mut self,
        cx: &FunctionEmitContext<'_>,
        body: &FunctionBody,
    ) -> Result<EmittedCode, EmitError>;
}

/// Emits a native-code image for `module`. Deterministic given the same
/// module and target: repeated emissions produce identical manifests and
/// images.
pub fn emit_module(
    module: &Module,
    target: &CodegenTarget,
    emitter: &mut dyn FunctionEmitter,
) -> Result<ModuleImage, EmitError> {
    let started = Instant::now();
    assert!(
        module.required_features.is_subset_of(target.tuning.features),
        "module requires features disabled for the target"
    );
    let mut builder = ImageBuilder::new(target)?;

    // An external reference to the host personality function for
    // exception unwinding.
    builder.external_symbol(ExternalRef::Personality);
    let personality = ExternalRef::Personality.symbol_name(target.uses_windows_seh());

    // Imported constants for the module's indexed function types, table
    // and memory base offsets, globals, and exception type ids.
    for (type_index, _) in module.types.iter() {
        builder.external_symbol(ExternalRef::TypeId(type_index));
    }
    let mut default_table = None;
    for (table_index, _) in module.tables.iter() {
        builder.external_symbol(ExternalRef::TableOffset(table_index));
        default_table.get_or_insert(table_index);
    }
    let mut default_memory = None;
    for (memory_index, _) in module.memories.iter() {
        builder.external_symbol(ExternalRef::MemoryOffset(memory_index));
        default_memory.get_or_insert(memory_index);
    }
    for (global_index, _) in module.globals.iter() {
        builder.external_symbol(ExternalRef::Global(global_index));
    }
    for (exception_index, _) in module.exception_types.iter() {
        builder.external_symbol(ExternalRef::BiasedExceptionTypeId(exception_index));
    }

    // The owning instance's biased id and the table reference bias.
    builder.external_symbol(ExternalRef::BiasedModuleInstanceId);
    builder.external_symbol(ExternalRef::TableReferenceBias);

    // The runtime exception's type descriptor: Windows exception tables
    // reference it image-relative, so those images embed a link-once
    // copy; everywhere else it is an external.
    if target.uses_windows_seh() {
        builder.embed_exception_type_descriptor();
    } else {
        builder.external_symbol(ExternalRef::RuntimeExceptionTypeInfo);
    }

    // Intrinsic entry points from the registry.
    for intrinsic in IntrinsicIndex::all() {
        builder.external_symbol(ExternalRef::Intrinsic(intrinsic));
    }

    // Imported functions are resolved by the loader.
    for import_index in 0..module.functions.imports.len() {
        builder.external_symbol(ExternalRef::FunctionImport(FuncIndex::from_u32(
            import_index as u32,
        )));
    }

    let metadata = ModuleMetadata::new();

    // Lower every defined function body first; layout and relocation run
    // once all entry points are known.
    let mut emitted: Vec<EmittedCode> = Vec::with_capacity(module.functions.defs.len());
    for (def_index, def) in module.functions.defs.iter() {
        let func_index = module.functions.function_index(def_index);
        let cx = FunctionEmitContext {
            module,
            func_index,
            def_index,
            signature: wasm_call_signature(&module.types[def.type_index], &target.triple),
            metadata: &metadata,
            default_table,
            default_memory,
            target,
        };
        emitted.push(emitter.emit_function(&cx, &def.body)?);
    }

    let mut functions: PrimaryMap<DefinedFuncIndex, FunctionLoc> =
        PrimaryMap::with_capacity(emitted.len());
    for (def_index, code) in module.functions.defs.keys().zip(&emitted) {
        functions.push(builder.append_function(def_index, &code.bytes, code.alignment));
    }

    // Relocate the runtime function prefixes and the emitted bodies.
    let pointer_bytes = u64::from(target.pointer_bytes());
    for ((def_index, def), code) in module.functions.defs.iter().zip(&emitted) {
        let loc = &functions[def_index];
        builder.relocate_text(
            loc.prefix_offset,
            ExternalRef::FunctionDefMutableData(def_index),
            RelocKind::Absolute,
            0,
        )?;
        builder.relocate_text(
            loc.prefix_offset + pointer_bytes,
            ExternalRef::BiasedModuleInstanceId,
            RelocKind::Absolute,
            0,
        )?;
        builder.relocate_text(
            loc.prefix_offset + 2 * pointer_bytes,
            ExternalRef::TypeId(def.type_index),
            RelocKind::Absolute,
            0,
        )?;
        for relocation in &code.relocations {
            builder.relocate_text(
                functions[def_index].entry_offset + relocation.offset,
                relocation.target,
                relocation.kind,
                relocation.addend,
            )?;
        }
    }

    // Finalize the debug info.
    let debug = DebugInfo::new(target.pointer_bytes(), target.endian());
    debug.finish(&mut builder)?;

    let image = builder.finish(functions, personality)?;
    log::debug!(
        "emitted {} functions in {:?}",
        module.functions.len(),
        started.elapsed()
    );
    Ok(image)
}
