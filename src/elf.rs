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

//! Locate the sections and symbols a conversion needs inside an ELF image.

use std::borrow::Cow;

use log::{info, warn};
use object::{elf, FileKind, Object, ObjectSection, ObjectSymbol, ObjectSymbolTable};

use crate::error::{Error, Result};
use crate::symbols::{Symbol, SymbolSection, SymbolTable, SymbolType};

pub const DEBUG_ABBREV: &str = ".debug_abbrev";
pub const DEBUG_INFO: &str = ".debug_info";
pub const DEBUG_STR: &str = ".debug_str";
pub const DEBUG_STR_OFFSETS: &str = ".debug_str_offsets";
pub const DEBUG_LINE_STR: &str = ".debug_line_str";
pub const ELF_STRTAB: &str = ".strtab";

/// Everything pulled out of the input file, built once and read-only after.
///
/// Section contents borrow from the mapped file unless the section was
/// compressed, in which case they are inflated copies.
pub struct ElfContext<'data> {
    pub endian: gimli::RunTimeEndian,
    pub debug_abbrev: Cow<'data, [u8]>,
    pub debug_info: Cow<'data, [u8]>,
    pub debug_str: Cow<'data, [u8]>,
    pub debug_str_offsets: Cow<'data, [u8]>,
    pub debug_line_str: Cow<'data, [u8]>,
    pub symbols: SymbolTable,
}

impl<'data> ElfContext<'data> {
    pub fn parse(data: &'data [u8]) -> Result<Self> {
        match FileKind::parse(data) {
            Ok(FileKind::Elf32) | Ok(FileKind::Elf64) => {}
            _ => return Err(Error::NotElf),
        }
        let file = object::File::parse(data)?;

        let endian = if file.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };

        let symbols = load_symbols(&file);
        if file.section_by_name(ELF_STRTAB).is_none() {
            warn!("string table not found");
        }

        let debug_abbrev = section_data(&file, DEBUG_ABBREV)?.ok_or(Error::MissingSection(DEBUG_ABBREV))?;
        let debug_info = section_data(&file, DEBUG_INFO)?.ok_or(Error::MissingSection(DEBUG_INFO))?;
        let debug_str = section_data(&file, DEBUG_STR)?.unwrap_or_else(|| {
            warn!("{} section not found", DEBUG_STR);
            Cow::Borrowed(&[])
        });
        let debug_str_offsets = section_data(&file, DEBUG_STR_OFFSETS)?.unwrap_or_default();
        let debug_line_str = section_data(&file, DEBUG_LINE_STR)?.unwrap_or_default();

        info!(
            "located {} bytes of {}, {} symbols",
            debug_info.len(),
            DEBUG_INFO,
            symbols.len()
        );

        Ok(Self {
            endian,
            debug_abbrev,
            debug_info,
            debug_str,
            debug_str_offsets,
            debug_line_str,
            symbols,
        })
    }
}

fn section_data<'data>(file: &object::File<'data>, name: &str) -> Result<Option<Cow<'data, [u8]>>> {
    match file.section_by_name(name) {
        Some(section) => Ok(Some(section.uncompressed_data()?)),
        None => Ok(None),
    }
}

/// Only plain `STT_FUNC`/`STT_OBJECT` symbols carry C types; IFUNC resolvers
/// and TLS objects are left out.
fn symbol_type(st_info: u8) -> SymbolType {
    match st_info & 0xf {
        elf::STT_FUNC => SymbolType::Function,
        elf::STT_OBJECT => SymbolType::Object,
        _ => SymbolType::Other,
    }
}

fn load_symbols(file: &object::File<'_>) -> SymbolTable {
    let Some(table) = file.symbol_table() else {
        warn!("symbol table not found");
        return SymbolTable::new();
    };

    table
        .symbols()
        .map(|sym| {
            let name = sym
                .name_bytes()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            let kind = match sym.flags() {
                object::SymbolFlags::Elf { st_info, .. } => symbol_type(st_info),
                _ => SymbolType::Other,
            };
            let section = match sym.section() {
                object::SymbolSection::Undefined => SymbolSection::Undefined,
                object::SymbolSection::Common => SymbolSection::Common,
                _ => SymbolSection::Defined,
            };
            Symbol::new(sym.index().0, name, kind, section)
        })
        .collect()
}
