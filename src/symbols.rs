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

use crate::itype::SymbolClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    Function,
    Object,
    Other,
}

impl SymbolType {
    pub fn class(self) -> Option<SymbolClass> {
        match self {
            SymbolType::Function => Some(SymbolClass::Function),
            SymbolType::Object => Some(SymbolClass::Object),
            SymbolType::Other => None,
        }
    }
}

/// Where the symbol's definition lives, reduced to what matching cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolSection {
    Defined,
    Undefined,
    Common,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    /// Position in the ELF symbol table.
    pub index: usize,
    pub name: String,
    pub kind: SymbolType,
    pub section: SymbolSection,
}

impl Symbol {
    pub fn new(index: usize, name: impl Into<String>, kind: SymbolType, section: SymbolSection) -> Self {
        Self {
            index,
            name: name.into(),
            kind,
            section,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.section == SymbolSection::Defined
    }

    /// Name with any local-copy suffix (`foo.1`, `foo.isra.0`) stripped.
    /// Leading dots are skipped rather than producing an empty key.
    pub fn base_name(&self) -> &str {
        let name = self.name.trim_start_matches('.');
        match name.find('.') {
            Some(pos) => &name[..pos],
            None => name,
        }
    }
}

/// Symbol table entries in file order.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Symbol> {
        self.symbols.iter()
    }

    #[cfg(test)]
    pub fn get_by_name(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl FromIterator<Symbol> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        Self {
            symbols: iter.into_iter().collect(),
        }
    }
}
