//! Assembly of the relocatable native image via the `object` crate.

use cranelift_entity::PrimaryMap;
use object::write::{Comdat, Object, Relocation, SectionId, StandardSegment, Symbol, SymbolId, SymbolSection};
use object::{
    Architecture, BinaryFormat, ComdatKind, Endianness, RelocationEncoding, RelocationFlags,
    RelocationKind, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};
use target_lexicon::{OperatingSystem, Triple};

use crate::codegen::externals::ExternalRef;
use crate::codegen::{CodegenTarget, EmitError};
use crate::ir::DefinedFuncIndex;
use crate::util::HashIndex;

/// The MSVC RTTI type descriptor for the runtime exception. The Windows
/// exception tables reference it by a 32-bit image-relative offset, so
/// every image embeds a link-once copy under this mangled name.
pub const WINDOWS_EXCEPTION_TYPE_DESCRIPTOR: &str = "??_R0PEAUException@Runtime@WAVM@@@8";

const EXCEPTION_TYPE_MANGLED_NAME: &[u8] = b".PEAUException@Runtime@WAVM@@\0";

/// One undefined symbol the loader must resolve before execution.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ManifestEntry {
    pub name: String,
    pub external: ExternalRef,
    /// Applied to every use site: biased externals reference `address - 1`.
    pub bias: i64,
}

/// Where a defined function landed in the image's text section.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FunctionLoc {
    pub name: String,
    /// Start of the runtime function prefix.
    pub prefix_offset: u64,
    /// The entry point; always `prefix_offset + size_of_prefix`.
    pub entry_offset: u64,
    pub size: u64,
}

/// A relocation inside an emitted function body, against an external.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CodeRelocation {
    pub offset: u64,
    pub target: ExternalRef,
    pub kind: RelocKind,
    pub addend: i64,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RelocKind {
    /// Pointer-sized absolute address.
    Absolute,
    /// 32-bit PC-relative, as used by call sites.
    PcRel32,
}

/// The finished image: a relocatable object plus the symbol manifest and
/// per-function layout the loader consumes.
#[derive(Debug)]
pub struct ModuleImage {
    pub object: Vec<u8>,
    pub manifest: Vec<ManifestEntry>,
    pub functions: PrimaryMap<DefinedFuncIndex, FunctionLoc>,
    /// The personality symbol attached to every defined function.
    pub personality: String,
}

pub(crate) struct ImageBuilder {
    object: Object<'static>,
    text: SectionId,
    pointer_bytes: u64,
    windows_seh: bool,
    symbols: HashIndex<ExternalRef, SymbolId>,
    function_symbols: PrimaryMap<DefinedFuncIndex, SymbolId>,
    manifest: Vec<ManifestEntry>,
}

impl ImageBuilder {
    pub(crate) fn new(target: &CodegenTarget) -> Result<ImageBuilder, EmitError> {
        let triple = &target.triple;
        let architecture = match triple.architecture {
            target_lexicon::Architecture::X86_32(_) => Architecture::I386,
            target_lexicon::Architecture::X86_64 => Architecture::X86_64,
            target_lexicon::Architecture::Arm(_) => Architecture::Arm,
            target_lexicon::Architecture::Aarch64(_) => Architecture::Aarch64,
            target_lexicon::Architecture::S390x => Architecture::S390x,
            target_lexicon::Architecture::Riscv64(_) => Architecture::Riscv64,
            _ => return Err(EmitError::UnsupportedTarget(triple.clone())),
        };
        let endianness = match triple.endianness() {
            Ok(target_lexicon::Endianness::Big) => Endianness::Big,
            _ => Endianness::Little,
        };
        let format = match triple.operating_system {
            OperatingSystem::Windows => BinaryFormat::Coff,
            _ => BinaryFormat::Elf,
        };

        let mut object = Object::new(format, architecture, endianness);
        let text_segment = object.segment_name(StandardSegment::Text).to_vec();
        let text = object.add_section(text_segment, b".text".to_vec(), SectionKind::Text);

        Ok(ImageBuilder {
            object,
            text,
            pointer_bytes: u64::from(target.pointer_bytes()),
            windows_seh: target.uses_windows_seh(),
            symbols: HashIndex::new(),
            function_symbols: PrimaryMap::new(),
            manifest: Vec::new(),
        })
    }

    pub(crate) fn size_of_function_prefix(&self) -> u64 {
        3 * self.pointer_bytes
    }

    /// The symbol for `external`, creating an undefined reference (and its
    /// manifest entry) on first use. Defined functions resolve to their
    /// text symbols and never enter the manifest.
    pub(crate) fn external_symbol(&mut self, external: ExternalRef) -> SymbolId {
        if let ExternalRef::FunctionDef(def_index) = external {
            return self.function_symbols[def_index];
        }
        if let Some(&symbol) = self.symbols.get(&external) {
            return symbol;
        }

        let name = external.symbol_name(self.windows_seh);
        let symbol = self.object.add_symbol(Symbol {
            name: name.clone().into_bytes(),
            value: 0,
            size: 0,
            kind: if external.is_code() {
                SymbolKind::Text
            } else {
                SymbolKind::Data
            },
            scope: SymbolScope::Unknown,
            weak: false,
            section: SymbolSection::Undefined,
            flags: SymbolFlags::None,
        });
        self.symbols.add_or_fail(external, symbol);
        self.manifest.push(ManifestEntry {
            name,
            external,
            bias: external.bias(),
        });
        symbol
    }

    /// Appends one defined function: the three-word runtime prefix
    /// followed by the entry point, with an external-linkage
    /// `functionDef[j]` symbol at the entry.
    pub(crate) fn append_function(
        &mut self,
        def_index: DefinedFuncIndex,
        body: &[u8],
        alignment: u64,
    ) -> FunctionLoc {
        let prefix_size = self.size_of_function_prefix();
        let mut data = vec![0u8; prefix_size as usize + body.len()];
        data[prefix_size as usize..].copy_from_slice(body);

        let alignment = alignment.max(self.pointer_bytes);
        let prefix_offset = self.object.append_section_data(self.text, &data, alignment);
        let entry_offset = prefix_offset + prefix_size;

        let name = ExternalRef::FunctionDef(def_index).symbol_name(self.windows_seh);
        let symbol = self.object.add_symbol(Symbol {
            name: name.clone().into_bytes(),
            value: entry_offset,
            size: body.len() as u64,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(self.text),
            flags: SymbolFlags::None,
        });
        let pushed = self.function_symbols.push(symbol);
        debug_assert_eq!(pushed, def_index);

        FunctionLoc {
            name,
            prefix_offset,
            entry_offset,
            size: body.len() as u64,
        }
    }

    /// Adds a relocation in the text section against an external. The
    /// external's bias is folded into the addend.
    pub(crate) fn relocate_text(
        &mut self,
        offset: u64,
        target: ExternalRef,
        kind: RelocKind,
        addend: i64,
    ) -> Result<(), EmitError> {
        let symbol = self.external_symbol(target);
        let flags = match kind {
            RelocKind::Absolute => RelocationFlags::Generic {
                kind: RelocationKind::Absolute,
                encoding: RelocationEncoding::Generic,
                size: (self.pointer_bytes * 8) as u8,
            },
            RelocKind::PcRel32 => RelocationFlags::Generic {
                kind: RelocationKind::Relative,
                encoding: RelocationEncoding::Generic,
                size: 32,
            },
        };
        self.object.add_relocation(
            self.text,
            Relocation {
                offset,
                symbol,
                addend: addend + target.bias(),
                flags,
            },
        )?;
        Ok(())
    }

    /// Embeds the link-once exception type descriptor Windows-SEH images
    /// carry: `{ vftable: null, spare: null, mangled name }`.
    pub(crate) fn embed_exception_type_descriptor(&mut self) {
        let segment = self.object.segment_name(StandardSegment::Data).to_vec();
        let section = self
            .object
            .add_section(segment, b".rdata".to_vec(), SectionKind::ReadOnlyData);

        let mut data = vec![0u8; 2 * self.pointer_bytes as usize];
        data.extend_from_slice(EXCEPTION_TYPE_MANGLED_NAME);

        let symbol = self.object.add_symbol(Symbol {
            name: WINDOWS_EXCEPTION_TYPE_DESCRIPTOR.as_bytes().to_vec(),
            value: 0,
            size: data.len() as u64,
            kind: SymbolKind::Data,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(section),
            flags: SymbolFlags::None,
        });
        // Link-once: images loaded together keep a single descriptor.
        self.object.add_comdat(Comdat {
            kind: ComdatKind::Any,
            symbol,
            sections: vec![section],
        });
        self.object.append_section_data(section, &data, self.pointer_bytes);
    }

    pub(crate) fn append_debug_section(&mut self, name: &str, data: &[u8]) {
        let segment = self.object.segment_name(StandardSegment::Debug).to_vec();
        let section =
            self.object
                .add_section(segment, name.as_bytes().to_vec(), SectionKind::Debug);
        self.object.append_section_data(section, data, 1);
    }

    pub(crate) fn finish(
        self,
        functions: PrimaryMap<DefinedFuncIndex, FunctionLoc>,
        personality: String,
    ) -> Result<ModuleImage, EmitError> {
        Ok(ModuleImage {
            object: self.object.write()?,
            manifest: self.manifest,
            functions,
            personality,
        })
    }
}
