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

//! In-memory type graph built from DWARF and matched against the ELF symbol table.
//!
//! Records live in a single arena and point at each other through [`TypeId`]
//! handles, so self-referential types (a struct holding a pointer to itself)
//! need no special handling. The arena only grows.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// CTF encoding flag for variadic argument markers.
pub const CTF_INT_VARARGS: u16 = 0x10;
pub const CTF_INT_SIGNED: u16 = 0x01;
pub const CTF_INT_CHAR: u16 = 0x02;
pub const CTF_INT_BOOL: u16 = 0x04;

pub const CTF_FP_SINGLE: u16 = 1;
pub const CTF_FP_DOUBLE: u16 = 2;
pub const CTF_FP_CPLX: u16 = 3;
pub const CTF_FP_DCPLX: u16 = 4;
pub const CTF_FP_LDCPLX: u16 = 5;
pub const CTF_FP_LDOUBLE: u16 = 6;

/// Stable handle of a record inside a [`TypeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Unknown,
    Integer,
    Float,
    Pointer,
    Array,
    Function,
    Struct,
    Union,
    Enum,
    Typedef,
    Volatile,
    Const,
    Restrict,
}

impl TypeKind {
    /// Kind number used in the CTF `ctt_info` word.
    pub fn ctf_kind(self) -> u16 {
        match self {
            TypeKind::Unknown => 0,
            TypeKind::Integer => 1,
            TypeKind::Float => 2,
            TypeKind::Pointer => 3,
            TypeKind::Array => 4,
            TypeKind::Function => 5,
            TypeKind::Struct => 6,
            TypeKind::Union => 7,
            TypeKind::Enum => 8,
            TypeKind::Typedef => 10,
            TypeKind::Volatile => 11,
            TypeKind::Const => 12,
            TypeKind::Restrict => 13,
        }
    }

    /// Kinds whose `reference` must be set once decoding is done.
    pub fn needs_reference(self) -> bool {
        matches!(
            self,
            TypeKind::Pointer
                | TypeKind::Typedef
                | TypeKind::Volatile
                | TypeKind::Const
                | TypeKind::Restrict
                | TypeKind::Array
                | TypeKind::Function
        )
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeFlags: u8 {
        /// Describes a function symbol.
        const FUNC = 1 << 0;
        /// Describes a data symbol.
        const OBJECT = 1 << 1;
        /// Already taken by a symbol table entry.
        const CLAIMED = 1 << 2;
    }
}

/// Which matched list a symbol-bearing record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymbolClass {
    Function,
    Object,
}

impl SymbolClass {
    pub fn flag(self) -> TypeFlags {
        match self {
            SymbolClass::Function => TypeFlags::FUNC,
            SymbolClass::Object => TypeFlags::OBJECT,
        }
    }
}

/// A struct/union field or a function argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    pub name: Option<String>,
    pub reference: TypeId,
    /// Byte offset inside the aggregate, 0 for function arguments.
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    /// CTF type id, 0 until [`TypeGraph::assign_indices`] runs.
    pub index: u32,
    pub kind: TypeKind,
    pub name: Option<String>,
    pub size: u64,
    pub encoding: u16,
    /// Array length, or argument count for functions.
    pub element_count: u32,
    pub reference: Option<TypeId>,
    pub members: Vec<MemberRecord>,
    pub enumerators: Vec<Enumerator>,
    pub flags: TypeFlags,
    /// Symbol table position, only meaningful once claimed.
    pub symbol_slot: usize,
}

impl TypeRecord {
    pub fn new(kind: TypeKind, name: Option<String>) -> Self {
        Self {
            index: 0,
            kind,
            name,
            size: 0,
            encoding: 0,
            element_count: 0,
            reference: None,
            members: Vec::new(),
            enumerators: Vec::new(),
            flags: TypeFlags::empty(),
            symbol_slot: 0,
        }
    }

    pub fn symbol_class(&self) -> Option<SymbolClass> {
        if self.flags.contains(TypeFlags::FUNC) {
            Some(SymbolClass::Function)
        } else if self.flags.contains(TypeFlags::OBJECT) {
            Some(SymbolClass::Object)
        } else {
            None
        }
    }

    pub fn is_symbol(&self) -> bool {
        self.flags.intersects(TypeFlags::FUNC | TypeFlags::OBJECT)
    }
}

/// Arena of type records plus the ordered lists the output is built from.
#[derive(Debug, Default)]
pub struct TypeGraph {
    records: Vec<TypeRecord>,
    all_types: Vec<TypeId>,
    functions: Vec<TypeId>,
    objects: Vec<TypeId>,
    index_type: Option<TypeId>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parsed record to the arena and to `all_types`.
    pub fn push(&mut self, record: TypeRecord) -> TypeId {
        let id = self.push_detached(record);
        self.all_types.push(id);
        id
    }

    /// Append a record to the arena only. Used for symbol placeholders and
    /// duplicates, which never show up in the type listing.
    pub fn push_detached(&mut self, record: TypeRecord) -> TypeId {
        let id = TypeId(self.records.len() as u32);
        self.records.push(record);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeRecord {
        &self.records[id.as_usize()]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeRecord {
        &mut self.records[id.as_usize()]
    }

    /// Copy a record under a fresh identity.
    ///
    /// Claim state and symbol slot are reset; the FUNC/OBJECT class is kept so
    /// the copy goes to the same matched list. A self-referencing record
    /// yields a self-referencing copy.
    pub fn duplicate(&mut self, id: TypeId) -> TypeId {
        let mut copy = self.get(id).clone();
        copy.flags.remove(TypeFlags::CLAIMED);
        copy.symbol_slot = 0;
        let self_ref = copy.reference == Some(id);
        let new_id = self.push_detached(copy);
        if self_ref {
            self.get_mut(new_id).reference = Some(new_id);
        }
        new_id
    }

    /// Records in parse order.
    pub fn all_types(&self) -> impl Iterator<Item = (TypeId, &TypeRecord)> + '_ {
        self.all_types.iter().map(move |&id| (id, self.get(id)))
    }

    /// Records emitted in the CTF type section, in index order.
    pub fn emitted_types(&self) -> impl Iterator<Item = (TypeId, &TypeRecord)> + '_ {
        self.all_types().filter(|(_, it)| !it.is_symbol())
    }

    pub fn functions(&self) -> &[TypeId] {
        &self.functions
    }

    pub fn objects(&self) -> &[TypeId] {
        &self.objects
    }

    pub(crate) fn push_matched(&mut self, class: SymbolClass, id: TypeId) {
        match class {
            SymbolClass::Function => self.functions.push(id),
            SymbolClass::Object => self.objects.push(id),
        }
    }

    pub fn index_type(&self) -> Option<TypeId> {
        self.index_type
    }

    pub fn set_index_type(&mut self, id: TypeId) {
        self.index_type = Some(id);
    }

    /// Number emitted types from 1 in parse order. Returns the last id given.
    pub fn assign_indices(&mut self) -> u32 {
        let mut next = 0;
        for pos in 0..self.all_types.len() {
            let id = self.all_types[pos];
            let record = &mut self.records[id.as_usize()];
            if record.is_symbol() {
                continue;
            }
            next += 1;
            record.index = next;
        }
        next
    }

    /// The record `id` refers to, or an invariant error if the link is missing.
    pub fn referenced(&self, id: TypeId) -> Result<&TypeRecord> {
        let record = self.get(id);
        match record.reference {
            Some(target) => Ok(self.get(target)),
            None => Err(Error::UnresolvedReference {
                kind: record.kind,
                name: record.name.clone(),
            }),
        }
    }

}

/// Lookup of symbol-bearing records by name, one table per symbol class.
///
/// The first record inserted under a name wins; later ones are ignored.
#[derive(Debug, Default)]
pub struct NameIndex {
    functions: BTreeMap<String, TypeId>,
    objects: BTreeMap<String, TypeId>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every FUNC/OBJECT record of `all_types`.
    pub fn build(graph: &TypeGraph) -> Self {
        let mut index = Self::new();
        for (id, record) in graph.all_types() {
            index.insert(id, record);
        }
        index
    }

    /// Returns `false` when the record is not indexable or its name is taken.
    pub fn insert(&mut self, id: TypeId, record: &TypeRecord) -> bool {
        let (Some(class), Some(name)) = (record.symbol_class(), record.name.as_ref()) else {
            return false;
        };
        let table = self.table_mut(class);
        if table.contains_key(name) {
            return false;
        }
        table.insert(name.clone(), id);
        true
    }

    pub fn find(&self, class: SymbolClass, key: &str) -> Option<TypeId> {
        match class {
            SymbolClass::Function => self.functions.get(key).copied(),
            SymbolClass::Object => self.objects.get(key).copied(),
        }
    }

    fn table_mut(&mut self, class: SymbolClass) -> &mut BTreeMap<String, TypeId> {
        match class {
            SymbolClass::Function => &mut self.functions,
            SymbolClass::Object => &mut self.objects,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.functions.len() + self.objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(graph: &mut TypeGraph, name: &str) -> TypeId {
        let mut it = TypeRecord::new(TypeKind::Integer, Some(name.to_string()));
        it.size = 4;
        it.encoding = CTF_INT_SIGNED;
        graph.push(it)
    }

    fn func(graph: &mut TypeGraph, name: &str, ret: TypeId) -> TypeId {
        let mut it = TypeRecord::new(TypeKind::Function, Some(name.to_string()));
        it.reference = Some(ret);
        it.flags = TypeFlags::FUNC;
        graph.push(it)
    }

    #[test]
    fn duplicate_gets_fresh_identity() {
        let mut graph = TypeGraph::new();
        let ret = int(&mut graph, "int");
        let f = func(&mut graph, "main", ret);
        graph.get_mut(f).members.push(MemberRecord {
            name: Some("argc".into()),
            reference: ret,
            offset: 0,
        });
        graph.get_mut(f).flags |= TypeFlags::CLAIMED;
        graph.get_mut(f).symbol_slot = 7;

        let copy = graph.duplicate(f);
        assert_ne!(copy, f);
        assert_eq!(graph.get(copy).name, graph.get(f).name);
        assert_eq!(graph.get(copy).members, graph.get(f).members);
        assert_eq!(graph.get(copy).reference, Some(ret));
        assert_eq!(graph.get(copy).flags, TypeFlags::FUNC);
        assert_eq!(graph.get(copy).symbol_slot, 0);

        graph.get_mut(copy).symbol_slot = 9;
        assert_eq!(graph.get(f).symbol_slot, 7);
        // duplicates stay out of the type listing
        assert_eq!(graph.all_types().count(), 2);
    }

    #[test]
    fn duplicate_keeps_self_reference_local() {
        let mut graph = TypeGraph::new();
        let placeholder = graph.push_detached(TypeRecord::new(TypeKind::Unknown, None));
        graph.get_mut(placeholder).reference = Some(placeholder);
        let copy = graph.duplicate(placeholder);
        assert_eq!(graph.get(copy).reference, Some(copy));
    }

    #[test]
    fn indices_skip_symbol_records() {
        let mut graph = TypeGraph::new();
        let a = int(&mut graph, "int");
        let f = func(&mut graph, "main", a);
        let b = int(&mut graph, "long");
        assert_eq!(graph.assign_indices(), 2);
        assert_eq!(graph.get(a).index, 1);
        assert_eq!(graph.get(f).index, 0);
        assert_eq!(graph.get(b).index, 2);
        let emitted: Vec<_> = graph.emitted_types().map(|(id, _)| id).collect();
        assert_eq!(emitted, vec![a, b]);
    }

    #[test]
    fn name_index_first_insert_wins() {
        let mut graph = TypeGraph::new();
        let ret = int(&mut graph, "int");
        let first = func(&mut graph, "helper", ret);
        let second = func(&mut graph, "helper", ret);
        let index = NameIndex::build(&graph);

        assert_eq!(index.find(SymbolClass::Function, "helper"), Some(first));
        assert_ne!(index.find(SymbolClass::Function, "helper"), Some(second));
        assert_eq!(index.find(SymbolClass::Object, "helper"), None);
        // plain types are not indexed
        assert_eq!(index.find(SymbolClass::Function, "int"), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn referenced_reports_missing_link() {
        let mut graph = TypeGraph::new();
        let ptr = graph.push(TypeRecord::new(TypeKind::Pointer, None));
        match graph.referenced(ptr) {
            Err(Error::UnresolvedReference { kind, .. }) => assert_eq!(kind, TypeKind::Pointer),
            other => panic!("unexpected {:?}", other.map(|r| r.kind)),
        }
    }
}
