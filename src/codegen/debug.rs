//! DWARF debug metadata for emitted modules.
//!
//! One basic debug type per concrete value type, created once and reused
//! by every function. Reference types are described as 8-bit address-kind
//! types: their runtime representation is a pointer, but the debug size is
//! deliberately opaque.

use gimli::write::{AttributeValue, DwarfUnit, EndianVec, Sections, UnitEntryId};
use gimli::{
    DwLang, Encoding, Format, RunTimeEndian, DW_ATE_address, DW_ATE_float, DW_ATE_signed,
    DW_AT_byte_size, DW_AT_encoding, DW_AT_language, DW_AT_name, DW_AT_producer, DW_TAG_base_type,
};

use crate::codegen::image::ImageBuilder;
use crate::codegen::EmitError;
use crate::ir::ValueType;

const VALUE_TYPES: [ValueType; 9] = [
    ValueType::Any,
    ValueType::I32,
    ValueType::I64,
    ValueType::F32,
    ValueType::F64,
    ValueType::V128,
    ValueType::AnyRef,
    ValueType::FuncRef,
    ValueType::NullRef,
];

fn slot(ty: ValueType) -> usize {
    VALUE_TYPES
        .iter()
        .position(|&candidate| candidate == ty)
        .unwrap()
}

pub(crate) struct DebugInfo {
    dwarf: DwarfUnit,
    endian: RunTimeEndian,
    value_types: [Option<UnitEntryId>; VALUE_TYPES.len()],
}

impl DebugInfo {
    pub(crate) fn new(address_size: u8, endian: RunTimeEndian) -> DebugInfo {
        let encoding = Encoding {
            format: Format::Dwarf32,
            version: 4,
            address_size,
        };
        let mut dwarf = DwarfUnit::new(encoding);

        let root = dwarf.unit.root();
        let entry = dwarf.unit.get_mut(root);
        entry.set(DW_AT_producer, AttributeValue::String(b"tern".to_vec()));
        entry.set(DW_AT_language, AttributeValue::Language(DwLang(0xffff)));

        let mut value_types = [None; VALUE_TYPES.len()];
        for ty in VALUE_TYPES {
            // The `any` sentinel has no debug type.
            let Some(bit_width) = ty.bit_width() else {
                continue;
            };
            let (byte_size, ate) = match ty {
                ValueType::I32 | ValueType::I64 | ValueType::V128 => {
                    (u64::from(bit_width / 8), DW_ATE_signed)
                }
                ValueType::F32 | ValueType::F64 => (u64::from(bit_width / 8), DW_ATE_float),
                ValueType::AnyRef | ValueType::FuncRef | ValueType::NullRef => (1, DW_ATE_address),
                ValueType::Any => unreachable!(),
            };

            let id = dwarf.unit.add(root, DW_TAG_base_type);
            let entry = dwarf.unit.get_mut(id);
            entry.set(
                DW_AT_name,
                AttributeValue::String(ty.to_string().into_bytes()),
            );
            entry.set(DW_AT_byte_size, AttributeValue::Udata(byte_size));
            entry.set(DW_AT_encoding, AttributeValue::Encoding(ate));
            value_types[slot(ty)] = Some(id);
        }

        DebugInfo {
            dwarf,
            endian,
            value_types,
        }
    }

    /// The shared debug type for `ty`; `None` for the `any` sentinel.
    pub(crate) fn value_type_entry(&self, ty: ValueType) -> Option<UnitEntryId> {
        self.value_types[slot(ty)]
    }

    /// Writes the DWARF sections into the image.
    pub(crate) fn finish(mut self, builder: &mut ImageBuilder) -> Result<(), EmitError> {
        let mut sections = Sections::new(EndianVec::new(self.endian));
        self.dwarf.write(&mut sections)?;
        sections.for_each(|id, data| -> Result<(), EmitError> {
            if !data.slice().is_empty() {
                builder.append_debug_section(id.name(), data.slice());
            }
            Ok(())
        })
    }
}
