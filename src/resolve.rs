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

//! Match DWARF function/variable records against the ELF symbol table.
//!
//! The CTF function and object sections are indexed by symbol table order,
//! so every defined function or data symbol gets exactly one entry, even when
//! no type information exists for it.

use log::debug;

use crate::itype::{NameIndex, SymbolClass, TypeFlags, TypeGraph, TypeId, TypeKind, TypeRecord};
use crate::symbols::{Symbol, SymbolTable};

/// Counters describing how the symbol table was matched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveStats {
    pub matched: usize,
    pub duplicated: usize,
    pub unknown: usize,
}

/// Fill the graph's function and object lists from `symtab`.
pub fn resolve_symbols(graph: &mut TypeGraph, symtab: &SymbolTable) -> ResolveStats {
    let index = NameIndex::build(graph);
    let mut stats = ResolveStats::default();

    for symbol in symtab.iter() {
        if !symbol.is_defined() {
            continue;
        }
        let Some(class) = symbol.kind.class() else {
            continue;
        };

        let id = match index.find(class, symbol.base_name()) {
            None => {
                debug!("symbol not found: {}", symbol.name);
                stats.unknown += 1;
                placeholder(graph, symbol, class)
            }
            Some(found) if graph.get(found).flags.contains(TypeFlags::CLAIMED) => {
                debug!("{}: already inserted", symbol.name);
                stats.duplicated += 1;
                graph.duplicate(found)
            }
            Some(found) => {
                stats.matched += 1;
                found
            }
        };

        let record = graph.get_mut(id);
        record.symbol_slot = symbol.index;
        record.flags |= TypeFlags::CLAIMED;
        graph.push_matched(class, id);
    }

    stats
}

/// An Unknown record standing in for a symbol without type information.
/// It refers to itself so that no record is ever left dangling.
fn placeholder(graph: &mut TypeGraph, symbol: &Symbol, class: SymbolClass) -> TypeId {
    let mut record = TypeRecord::new(TypeKind::Unknown, Some(symbol.name.clone()));
    record.flags = class.flag();
    let id = graph.push_detached(record);
    graph.get_mut(id).reference = Some(id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{SymbolSection, SymbolType};

    fn graph_with(records: &[(&str, SymbolClass)]) -> (TypeGraph, Vec<TypeId>) {
        let mut graph = TypeGraph::new();
        let mut int = TypeRecord::new(TypeKind::Integer, Some("int".into()));
        int.size = 4;
        let int = graph.push(int);
        let ids = records
            .iter()
            .map(|(name, class)| {
                let kind = match class {
                    SymbolClass::Function => TypeKind::Function,
                    SymbolClass::Object => TypeKind::Unknown,
                };
                let mut it = TypeRecord::new(kind, Some(name.to_string()));
                it.reference = Some(int);
                it.flags = class.flag();
                graph.push(it)
            })
            .collect();
        (graph, ids)
    }

    fn sym(index: usize, name: &str, kind: SymbolType) -> Symbol {
        Symbol::new(index, name, kind, SymbolSection::Defined)
    }

    #[test]
    fn unmatched_function_gets_placeholder() {
        let (mut graph, _) = graph_with(&[]);
        let symtab: SymbolTable = [sym(1, "foo", SymbolType::Function)].into_iter().collect();
        let stats = resolve_symbols(&mut graph, &symtab);

        assert_eq!(stats.unknown, 1);
        assert_eq!(graph.functions().len(), 1);
        let id = graph.functions()[0];
        let it = graph.get(id);
        assert_eq!(it.kind, TypeKind::Unknown);
        assert_eq!(it.name.as_deref(), Some("foo"));
        assert_eq!(it.reference, Some(id));
        assert_eq!(it.symbol_slot, 1);
        assert!(it.flags.contains(TypeFlags::FUNC | TypeFlags::CLAIMED));
        assert!(graph.objects().is_empty());
    }

    #[test]
    fn local_copies_share_one_record_through_duplicates() {
        let (mut graph, ids) = graph_with(&[("bar", SymbolClass::Object)]);
        let symtab: SymbolTable = [
            sym(4, "bar", SymbolType::Object),
            sym(9, "bar.1", SymbolType::Object),
        ]
        .into_iter()
        .collect();
        let stats = resolve_symbols(&mut graph, &symtab);

        assert_eq!(stats, ResolveStats { matched: 1, duplicated: 1, unknown: 0 });
        let objects = graph.objects();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0], ids[0]);
        assert_ne!(objects[1], ids[0]);

        let (first, second) = (graph.get(objects[0]), graph.get(objects[1]));
        assert_eq!(first.name, second.name);
        assert_eq!(first.reference, second.reference);
        assert_eq!(first.symbol_slot, 4);
        assert_eq!(second.symbol_slot, 9);
    }

    #[test]
    fn skips_undefined_common_and_untyped() {
        let (mut graph, _) = graph_with(&[("f", SymbolClass::Function)]);
        let symtab: SymbolTable = [
            Symbol::new(1, "f", SymbolType::Function, SymbolSection::Undefined),
            Symbol::new(2, "c", SymbolType::Object, SymbolSection::Common),
            sym(3, "file.c", SymbolType::Other),
        ]
        .into_iter()
        .collect();
        assert_eq!(resolve_symbols(&mut graph, &symtab), ResolveStats::default());
        assert!(graph.functions().is_empty());
        assert!(graph.objects().is_empty());
    }

    #[test]
    fn class_restricts_lookup() {
        // a data symbol never matches a function record of the same name
        let (mut graph, ids) = graph_with(&[("x", SymbolClass::Function)]);
        let symtab: SymbolTable = [sym(1, "x", SymbolType::Object)].into_iter().collect();
        resolve_symbols(&mut graph, &symtab);
        assert_ne!(graph.objects()[0], ids[0]);
        assert_eq!(graph.get(graph.objects()[0]).kind, TypeKind::Unknown);
    }

    #[test]
    fn order_follows_symbol_table() {
        let (mut graph, ids) = graph_with(&[
            ("a", SymbolClass::Function),
            ("b", SymbolClass::Function),
            ("v", SymbolClass::Object),
        ]);
        let symtab: SymbolTable = [
            sym(1, "b", SymbolType::Function),
            sym(2, "v", SymbolType::Object),
            sym(3, "missing", SymbolType::Function),
            sym(4, "a", SymbolType::Function),
        ]
        .into_iter()
        .collect();
        resolve_symbols(&mut graph, &symtab);

        let names: Vec<_> = graph
            .functions()
            .iter()
            .map(|&id| graph.get(id).name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, ["b", "missing", "a"]);
        assert_eq!(graph.functions()[0], ids[1]);
        assert_eq!(graph.functions()[2], ids[0]);
        assert_eq!(graph.objects(), &[ids[2]]);
    }
}
