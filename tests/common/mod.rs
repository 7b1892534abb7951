// Copyright (c) 2026 ctfconv Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Synthesized ELF inputs: DWARF written with `gimli::write`, wrapped in an
//! ELF relocatable object built by `object::write`.

#![allow(dead_code)]

use std::io::Write;

use gimli::write::{AttributeValue, DwarfUnit, EndianVec, Sections, UnitEntryId};
use gimli::{DwAt, DwTag, Encoding, Format, LittleEndian};
use object::write::{Object, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope};
use tempfile::NamedTempFile;

pub struct DwarfBuilder {
    pub dwarf: DwarfUnit,
}

impl DwarfBuilder {
    pub fn new() -> Self {
        Self {
            dwarf: DwarfUnit::new(Encoding {
                format: Format::Dwarf32,
                version: 4,
                address_size: 8,
            }),
        }
    }

    pub fn root(&self) -> UnitEntryId {
        self.dwarf.unit.root()
    }

    pub fn add(&mut self, parent: UnitEntryId, tag: DwTag, name: Option<&str>) -> UnitEntryId {
        let id = self.dwarf.unit.add(parent, tag);
        if let Some(name) = name {
            let name = self.dwarf.strings.add(name);
            self.set(id, gimli::DW_AT_name, AttributeValue::StringRef(name));
        }
        id
    }

    pub fn set(&mut self, id: UnitEntryId, attr: DwAt, value: AttributeValue) {
        self.dwarf.unit.get_mut(id).set(attr, value);
    }

    pub fn typed(&mut self, id: UnitEntryId, ty: UnitEntryId) {
        self.set(id, gimli::DW_AT_type, AttributeValue::UnitRef(ty));
    }

    pub fn base(&mut self, name: &str, size: u64, ate: gimli::DwAte) -> UnitEntryId {
        let root = self.root();
        let id = self.add(root, gimli::DW_TAG_base_type, Some(name));
        self.set(id, gimli::DW_AT_byte_size, AttributeValue::Udata(size));
        self.set(id, gimli::DW_AT_encoding, AttributeValue::Encoding(ate));
        id
    }

    pub fn member(&mut self, owner: UnitEntryId, name: &str, ty: UnitEntryId, offset: u64) -> UnitEntryId {
        let id = self.add(owner, gimli::DW_TAG_member, Some(name));
        self.typed(id, ty);
        self.set(id, gimli::DW_AT_data_member_location, AttributeValue::Udata(offset));
        id
    }

    /// Serialized `(section name, contents)` pairs.
    pub fn sections(mut self) -> Vec<(&'static str, Vec<u8>)> {
        let mut sections = Sections::new(EndianVec::new(LittleEndian));
        self.dwarf.write(&mut sections).expect("write DWARF");
        let mut out = Vec::new();
        sections
            .for_each(|id, data| -> Result<(), ()> {
                if !data.slice().is_empty() {
                    out.push((id.name(), data.slice().to_vec()));
                }
                Ok(())
            })
            .expect("collect sections");
        out
    }
}

/// A symbol of the generated ELF: name, function or data, defined or not.
pub struct Sym<'a>(pub &'a str, pub SymbolKind, pub bool);

pub fn build_elf(debug: &[(&str, Vec<u8>)], symbols: &[Sym<'_>]) -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    let data = obj.add_section(Vec::new(), b".data".to_vec(), SectionKind::Data);

    for (name, contents) in debug {
        let id = obj.add_section(Vec::new(), name.as_bytes().to_vec(), SectionKind::Debug);
        obj.set_section_data(id, contents.clone(), 1);
    }

    for Sym(name, kind, defined) in symbols {
        let section = match (defined, kind) {
            (false, _) => SymbolSection::Undefined,
            (true, SymbolKind::Text) => SymbolSection::Section(text),
            (true, _) => SymbolSection::Section(data),
        };
        let value = if *defined {
            let target = if *kind == SymbolKind::Text { text } else { data };
            obj.append_section_data(target, &[0; 4], 4)
        } else {
            0
        };
        obj.add_symbol(Symbol {
            name: name.as_bytes().to_vec(),
            value,
            size: if *defined { 4 } else { 0 },
            kind: *kind,
            scope: SymbolScope::Linkage,
            weak: false,
            section,
            flags: SymbolFlags::None,
        });
    }
    obj.write().expect("write ELF")
}

fn le32(elf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([elf[pos], elf[pos + 1], elf[pos + 2], elf[pos + 3]])
}

fn set_le32(elf: &mut [u8], pos: usize, value: u32) {
    elf[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
}

/// File offsets of every section header in a little-endian ELF64 image.
fn section_headers(elf: &[u8]) -> Vec<usize> {
    let mut shoff = [0; 8];
    shoff.copy_from_slice(&elf[0x28..0x30]);
    let shoff = u64::from_le_bytes(shoff) as usize;
    let entsize = u16::from_le_bytes([elf[0x3a], elf[0x3b]]) as usize;
    let count = u16::from_le_bytes([elf[0x3c], elf[0x3d]]) as usize;
    (0..count).map(|i| shoff + i * entsize).collect()
}

fn symtab_header(elf: &[u8]) -> usize {
    section_headers(elf)
        .into_iter()
        .find(|&hdr| le32(elf, hdr + 4) == object::elf::SHT_SYMTAB)
        .expect("ELF has a symbol table")
}

/// Turn `.symtab` into plain PROGBITS so readers find no symbol table.
pub fn strip_symtab(elf: &mut [u8]) {
    let hdr = symtab_header(elf);
    set_le32(elf, hdr + 4, object::elf::SHT_PROGBITS);
}

/// Give the symbol string table the name of section 1, leaving no section
/// called `.strtab`. Symbols still resolve through the symtab's `sh_link`.
pub fn hide_strtab(elf: &mut [u8]) {
    let headers = section_headers(elf);
    let strtab = headers[le32(elf, symtab_header(elf) + 40) as usize];
    let other_name = le32(elf, headers[1]);
    set_le32(elf, strtab, other_name);
}

/// The program used by most end-to-end tests:
///
/// ```c
/// struct point { int x; int y; };
/// typedef struct point point_t;
/// point_t origin;
/// int counter;
/// int main(int argc);
/// static void helper(void);
/// ```
pub fn sample_dwarf() -> DwarfBuilder {
    let mut b = DwarfBuilder::new();
    let root = b.root();
    let int = b.base("int", 4, gimli::DW_ATE_signed);

    let point = b.add(root, gimli::DW_TAG_structure_type, Some("point"));
    b.set(point, gimli::DW_AT_byte_size, AttributeValue::Udata(8));
    b.member(point, "x", int, 0);
    b.member(point, "y", int, 4);

    let point_t = b.add(root, gimli::DW_TAG_typedef, Some("point_t"));
    b.typed(point_t, point);

    let origin = b.add(root, gimli::DW_TAG_variable, Some("origin"));
    b.typed(origin, point_t);
    let counter = b.add(root, gimli::DW_TAG_variable, Some("counter"));
    b.typed(counter, int);

    let main = b.add(root, gimli::DW_TAG_subprogram, Some("main"));
    b.typed(main, int);
    let argc = b.add(main, gimli::DW_TAG_formal_parameter, Some("argc"));
    b.typed(argc, int);

    b.add(root, gimli::DW_TAG_subprogram, Some("helper"));
    b
}

pub fn sample_symbols() -> Vec<Sym<'static>> {
    vec![
        Sym("main", SymbolKind::Text, true),
        Sym("helper", SymbolKind::Text, true),
        Sym("missing_fn", SymbolKind::Text, true),
        Sym("printf", SymbolKind::Text, false),
        Sym("origin", SymbolKind::Data, true),
        Sym("counter", SymbolKind::Data, true),
        Sym("counter.1", SymbolKind::Data, true),
    ]
}

pub fn sample_elf() -> Vec<u8> {
    build_elf(&sample_dwarf().sections(), &sample_symbols())
}

pub fn temp_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(bytes).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}
