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

//! Turn `.debug_info` DIEs into [`TypeRecord`]s.
//!
//! Every compilation unit is walked depth first. Type DIEs become records in
//! parse order; functions and global variables become FUNC/OBJECT records
//! that the symbol resolver later matches by name. `DW_AT_type` links are
//! collected while walking and patched once every unit has been read, since
//! they may point forward or into another unit.

use std::collections::HashMap;

use gimli::{AttributeValue, DwAt, DwAte, UnitOffset};
use log::{debug, info};

use crate::elf::ElfContext;
use crate::error::{Error, Result};
use crate::itype::{
    Enumerator, MemberRecord, TypeFlags, TypeGraph, TypeId, TypeKind, TypeRecord, CTF_FP_CPLX,
    CTF_FP_DCPLX, CTF_FP_DOUBLE, CTF_FP_LDCPLX, CTF_FP_LDOUBLE, CTF_FP_SINGLE, CTF_INT_BOOL,
    CTF_INT_CHAR, CTF_INT_SIGNED,
};

type Slice<'a> = gimli::EndianSlice<'a, gimli::RunTimeEndian>;
type Dwarf<'a> = gimli::Dwarf<Slice<'a>>;
type Unit<'a> = gimli::Unit<Slice<'a>>;
type Entry<'abbrev, 'unit, 'a> = gimli::DebuggingInformationEntry<'abbrev, 'unit, Slice<'a>>;

/// How far `DW_AT_specification`/`DW_AT_abstract_origin` chains are followed.
const MAX_ORIGIN_HOPS: usize = 4;

/// Build a gimli view over the located sections.
pub fn load_dwarf<'a>(ctx: &'a ElfContext<'_>) -> Dwarf<'a> {
    let endian = ctx.endian;
    let mut dwarf = Dwarf::default();
    dwarf.debug_abbrev = gimli::DebugAbbrev::new(&ctx.debug_abbrev, endian);
    dwarf.debug_info = gimli::DebugInfo::new(&ctx.debug_info, endian);
    dwarf.debug_str = gimli::DebugStr::new(&ctx.debug_str, endian);
    dwarf.debug_str_offsets = gimli::DebugStrOffsets::from(Slice::new(&ctx.debug_str_offsets, endian));
    dwarf.debug_line_str = gimli::DebugLineStr::new(&ctx.debug_line_str, endian);
    dwarf
}

/// Populate `graph` from the DWARF sections of `ctx`.
pub fn dwarf_parse(ctx: &ElfContext<'_>, graph: &mut TypeGraph) -> Result<()> {
    let dwarf = load_dwarf(ctx);
    let address_size = dwarf.units().next()?.map_or(8, |header| header.address_size());

    let mut decoder = Decoder::new(graph, address_size);
    let mut units = dwarf.units();
    let mut nunits = 0;
    while let Some(header) = units.next()? {
        let unit = dwarf.unit(header)?;
        decoder.parse_unit(&dwarf, &unit)?;
        nunits += 1;
    }
    decoder.finish()?;

    info!("parsed {} compilation units into {} types", nunits, graph.all_types().count());
    Ok(())
}

/// Where a pending `DW_AT_type` lands once resolved.
enum Link {
    Type(TypeId),
    Member { owner: TypeId, pos: usize },
}

struct Pending {
    link: Link,
    die: usize,
    /// `None` stands for `void`.
    target: Option<usize>,
}

enum ScopeKind {
    Other,
    Aggregate(TypeId),
    Enum(TypeId),
    Function(TypeId),
    Array {
        id: TypeId,
        die: usize,
        target: Option<usize>,
        counts: Vec<u32>,
    },
}

struct Scope {
    depth: isize,
    kind: ScopeKind,
}

struct Decoder<'g> {
    graph: &'g mut TypeGraph,
    void: TypeId,
    by_offset: HashMap<usize, TypeId>,
    /// DIEs that produce no record of their own: `None` means void,
    /// `Some(off)` forwards to another DIE.
    aliases: HashMap<usize, Option<usize>>,
    pending: Vec<Pending>,
}

impl<'g> Decoder<'g> {
    fn new(graph: &'g mut TypeGraph, address_size: u8) -> Self {
        let mut void = TypeRecord::new(TypeKind::Integer, Some("void".into()));
        void.encoding = CTF_INT_SIGNED;
        let void = graph.push(void);

        let mut index = TypeRecord::new(TypeKind::Integer, Some("unsigned long".into()));
        index.size = u64::from(address_size);
        let index = graph.push(index);
        graph.set_index_type(index);

        Self {
            graph,
            void,
            by_offset: HashMap::new(),
            aliases: HashMap::new(),
            pending: Vec::new(),
        }
    }

    fn parse_unit<'a>(&mut self, dwarf: &Dwarf<'a>, unit: &Unit<'a>) -> Result<()> {
        let mut scopes: Vec<Scope> = Vec::new();
        let mut depth: isize = 0;
        let mut entries = unit.entries();

        while let Some((delta, entry)) = entries.next_dfs()? {
            depth += delta;
            while let Some(scope) = scopes.last() {
                if scope.depth < depth {
                    break;
                }
                if let Some(scope) = scopes.pop() {
                    self.close_scope(scope);
                }
            }

            let parent = match scopes.last_mut() {
                Some(scope) if scope.depth == depth - 1 => Some(&mut scope.kind),
                _ => None,
            };
            let kind = self.parse_entry(dwarf, unit, entry, depth, parent)?;

            if entry.has_children() {
                scopes.push(Scope {
                    depth,
                    kind: kind.unwrap_or(ScopeKind::Other),
                });
            } else if let Some(kind) = kind {
                self.close_scope(Scope { depth, kind });
            }
        }

        while let Some(scope) = scopes.pop() {
            self.close_scope(scope);
        }
        Ok(())
    }

    /// Handle one DIE. Returns the scope its children should see, if any.
    fn parse_entry<'a>(
        &mut self,
        dwarf: &Dwarf<'a>,
        unit: &Unit<'a>,
        entry: &Entry<'_, '_, 'a>,
        depth: isize,
        parent: Option<&mut ScopeKind>,
    ) -> Result<Option<ScopeKind>> {
        let die = global_offset(unit, entry.offset());

        let kind = match entry.tag() {
            gimli::DW_TAG_base_type => {
                let name = die_name(dwarf, unit, entry)?;
                let size = udata(entry, gimli::DW_AT_byte_size)?.unwrap_or(0);
                let ate = match entry.attr_value(gimli::DW_AT_encoding)? {
                    Some(AttributeValue::Encoding(ate)) => ate,
                    _ => gimli::DW_ATE_signed,
                };
                let (kind, encoding) = base_encoding(ate, size);
                let mut it = TypeRecord::new(kind, name);
                it.size = size;
                it.encoding = encoding;
                self.register(die, it);
                None
            }
            tag @ (gimli::DW_TAG_pointer_type
            | gimli::DW_TAG_reference_type
            | gimli::DW_TAG_rvalue_reference_type
            | gimli::DW_TAG_typedef
            | gimli::DW_TAG_volatile_type
            | gimli::DW_TAG_const_type
            | gimli::DW_TAG_restrict_type) => {
                let kind = match tag {
                    gimli::DW_TAG_typedef => TypeKind::Typedef,
                    gimli::DW_TAG_volatile_type => TypeKind::Volatile,
                    gimli::DW_TAG_const_type => TypeKind::Const,
                    gimli::DW_TAG_restrict_type => TypeKind::Restrict,
                    _ => TypeKind::Pointer,
                };
                let it = TypeRecord::new(kind, die_name(dwarf, unit, entry)?);
                let id = self.register(die, it);
                let target = type_ref(unit, entry.attr_value(gimli::DW_AT_type)?);
                self.defer(Link::Type(id), die, target);
                None
            }
            gimli::DW_TAG_array_type => {
                let it = TypeRecord::new(TypeKind::Array, die_name(dwarf, unit, entry)?);
                let id = self.register(die, it);
                Some(ScopeKind::Array {
                    id,
                    die,
                    target: type_ref(unit, entry.attr_value(gimli::DW_AT_type)?),
                    counts: Vec::new(),
                })
            }
            gimli::DW_TAG_subrange_type => {
                if let Some(ScopeKind::Array { counts, .. }) = parent {
                    counts.push(subrange_count(entry)?);
                }
                None
            }
            tag @ (gimli::DW_TAG_structure_type | gimli::DW_TAG_class_type | gimli::DW_TAG_union_type) => {
                let kind = if tag == gimli::DW_TAG_union_type {
                    TypeKind::Union
                } else {
                    TypeKind::Struct
                };
                let mut it = TypeRecord::new(kind, die_name(dwarf, unit, entry)?);
                it.size = udata(entry, gimli::DW_AT_byte_size)?.unwrap_or(0);
                Some(ScopeKind::Aggregate(self.register(die, it)))
            }
            gimli::DW_TAG_member => {
                if let Some(&mut ScopeKind::Aggregate(owner)) = parent {
                    if !is_declaration(entry)? {
                        let member = MemberRecord {
                            name: die_name(dwarf, unit, entry)?,
                            reference: self.void,
                            offset: member_offset(unit, entry)?,
                        };
                        let target = type_ref(unit, entry.attr_value(gimli::DW_AT_type)?);
                        self.push_member(owner, member, die, target);
                    }
                }
                None
            }
            gimli::DW_TAG_enumeration_type => {
                let mut it = TypeRecord::new(TypeKind::Enum, die_name(dwarf, unit, entry)?);
                it.size = udata(entry, gimli::DW_AT_byte_size)?.unwrap_or(0);
                Some(ScopeKind::Enum(self.register(die, it)))
            }
            gimli::DW_TAG_enumerator => {
                if let Some(&mut ScopeKind::Enum(owner)) = parent {
                    let value = entry
                        .attr_value(gimli::DW_AT_const_value)?
                        .and_then(|v| v.sdata_value().or_else(|| v.udata_value().map(|u| u as i64)))
                        .unwrap_or(0);
                    let name = die_name(dwarf, unit, entry)?.unwrap_or_default();
                    self.graph.get_mut(owner).enumerators.push(Enumerator { name, value });
                }
                None
            }
            gimli::DW_TAG_subroutine_type => {
                let it = TypeRecord::new(TypeKind::Function, die_name(dwarf, unit, entry)?);
                let id = self.register(die, it);
                let target = type_ref(unit, entry.attr_value(gimli::DW_AT_type)?);
                self.defer(Link::Type(id), die, target);
                Some(ScopeKind::Function(id))
            }
            gimli::DW_TAG_subprogram => self.parse_subprogram(dwarf, unit, entry, die)?,
            gimli::DW_TAG_formal_parameter => {
                if let Some(&mut ScopeKind::Function(owner)) = parent {
                    let name = match inherited_attr(unit, entry, gimli::DW_AT_name)? {
                        Some(value) => attr_string(dwarf, unit, value),
                        None => None,
                    };
                    let member = MemberRecord {
                        name,
                        reference: self.void,
                        offset: 0,
                    };
                    let target = type_ref(unit, inherited_attr(unit, entry, gimli::DW_AT_type)?);
                    self.push_member(owner, member, die, target);
                }
                None
            }
            gimli::DW_TAG_variable => {
                self.parse_variable(dwarf, unit, entry, die, depth)?;
                None
            }
            gimli::DW_TAG_unspecified_type | gimli::DW_TAG_ptr_to_member_type => {
                self.aliases.insert(die, None);
                None
            }
            gimli::DW_TAG_atomic_type => {
                let target = type_ref(unit, entry.attr_value(gimli::DW_AT_type)?);
                self.aliases.insert(die, target);
                None
            }
            _ => None,
        };
        Ok(kind)
    }

    fn parse_subprogram<'a>(
        &mut self,
        dwarf: &Dwarf<'a>,
        unit: &Unit<'a>,
        entry: &Entry<'_, '_, 'a>,
        die: usize,
    ) -> Result<Option<ScopeKind>> {
        if is_declaration(entry)? {
            return Ok(None);
        }
        let name = match inherited_attr(unit, entry, gimli::DW_AT_name)? {
            Some(value) => attr_string(dwarf, unit, value),
            None => None,
        };
        if name.is_none() {
            return Ok(None);
        }

        let mut it = TypeRecord::new(TypeKind::Function, name);
        it.flags = TypeFlags::FUNC;
        let id = self.graph.push(it);
        let target = type_ref(unit, inherited_attr(unit, entry, gimli::DW_AT_type)?);
        self.defer(Link::Type(id), die, target);
        Ok(Some(ScopeKind::Function(id)))
    }

    /// Globals and function-scope statics; stack variables have no symbol.
    fn parse_variable<'a>(
        &mut self,
        dwarf: &Dwarf<'a>,
        unit: &Unit<'a>,
        entry: &Entry<'_, '_, 'a>,
        die: usize,
        depth: isize,
    ) -> Result<()> {
        if is_declaration(entry)? {
            return Ok(());
        }
        if depth != 1 && !has_static_location(unit, entry)? {
            return Ok(());
        }
        let name = match inherited_attr(unit, entry, gimli::DW_AT_name)? {
            Some(value) => attr_string(dwarf, unit, value),
            None => None,
        };
        if name.is_none() {
            return Ok(());
        }

        let mut it = TypeRecord::new(TypeKind::Unknown, name);
        it.flags = TypeFlags::OBJECT;
        let id = self.graph.push(it);
        let target = type_ref(unit, inherited_attr(unit, entry, gimli::DW_AT_type)?);
        self.defer(Link::Type(id), die, target);
        Ok(())
    }

    fn close_scope(&mut self, scope: Scope) {
        match scope.kind {
            ScopeKind::Function(id) => {
                let it = self.graph.get_mut(id);
                it.element_count = it.members.len() as u32;
            }
            ScopeKind::Array {
                id,
                die,
                target,
                counts,
            } => self.close_array(id, die, target, counts),
            ScopeKind::Aggregate(_) | ScopeKind::Enum(_) | ScopeKind::Other => {}
        }
    }

    /// `T a[2][3]` is one DIE with two subranges; it becomes an array of 2
    /// arrays of 3 `T`.
    fn close_array(&mut self, id: TypeId, die: usize, target: Option<usize>, counts: Vec<u32>) {
        let mut counts = counts.into_iter();
        self.graph.get_mut(id).element_count = counts.next().unwrap_or(0);

        let mut innermost = id;
        for count in counts {
            let mut inner = TypeRecord::new(TypeKind::Array, None);
            inner.element_count = count;
            let inner = self.graph.push(inner);
            self.graph.get_mut(innermost).reference = Some(inner);
            innermost = inner;
        }
        self.defer(Link::Type(innermost), die, target);
    }

    fn register(&mut self, die: usize, record: TypeRecord) -> TypeId {
        let id = self.graph.push(record);
        self.by_offset.insert(die, id);
        id
    }

    fn push_member(&mut self, owner: TypeId, member: MemberRecord, die: usize, target: Option<usize>) {
        let members = &mut self.graph.get_mut(owner).members;
        let pos = members.len();
        members.push(member);
        self.defer(Link::Member { owner, pos }, die, target);
    }

    fn defer(&mut self, link: Link, die: usize, target: Option<usize>) {
        self.pending.push(Pending { link, die, target });
    }

    fn lookup(&self, mut offset: usize) -> Option<TypeId> {
        for _ in 0..=MAX_ORIGIN_HOPS {
            if let Some(&id) = self.by_offset.get(&offset) {
                return Some(id);
            }
            match self.aliases.get(&offset)? {
                None => return Some(self.void),
                Some(next) => offset = *next,
            }
        }
        None
    }

    /// Patch every deferred link, then put aggregate members in offset order.
    fn finish(mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for Pending { link, die, target } in pending {
            let resolved = match target {
                None => self.void,
                Some(off) => self
                    .lookup(off)
                    .ok_or(Error::DanglingReference { offset: die, target: off })?,
            };
            match link {
                Link::Type(id) => self.graph.get_mut(id).reference = Some(resolved),
                Link::Member { owner, pos } => self.graph.get_mut(owner).members[pos].reference = resolved,
            }
        }

        if let Some((_, it)) = self
            .graph
            .all_types()
            .find(|(_, it)| it.kind.needs_reference() && it.reference.is_none())
        {
            return Err(Error::UnresolvedReference {
                kind: it.kind,
                name: it.name.clone(),
            });
        }

        let aggregates: Vec<TypeId> = self
            .graph
            .all_types()
            .filter(|(_, it)| matches!(it.kind, TypeKind::Struct | TypeKind::Union))
            .map(|(id, _)| id)
            .collect();
        for id in aggregates {
            self.graph.get_mut(id).members.sort_by_key(|im| im.offset);
        }
        Ok(())
    }
}

fn global_offset(unit: &Unit<'_>, offset: UnitOffset) -> usize {
    offset
        .to_debug_info_offset(&unit.header)
        .map_or(offset.0, |o| o.0)
}

fn type_ref(unit: &Unit<'_>, value: Option<AttributeValue<Slice<'_>>>) -> Option<usize> {
    match value? {
        AttributeValue::UnitRef(offset) => Some(global_offset(unit, offset)),
        AttributeValue::DebugInfoRef(offset) => Some(offset.0),
        _ => None,
    }
}

fn udata(entry: &Entry<'_, '_, '_>, name: DwAt) -> Result<Option<u64>> {
    Ok(entry.attr_value(name)?.and_then(|v| v.udata_value()))
}

fn is_declaration(entry: &Entry<'_, '_, '_>) -> Result<bool> {
    Ok(matches!(
        entry.attr_value(gimli::DW_AT_declaration)?,
        Some(AttributeValue::Flag(true))
    ))
}

fn attr_string<'a>(dwarf: &Dwarf<'a>, unit: &Unit<'a>, value: AttributeValue<Slice<'a>>) -> Option<String> {
    match dwarf.attr_string(unit, value) {
        Ok(s) => Some(s.to_string_lossy().into_owned()),
        Err(err) => {
            debug!("unreadable string attribute: {}", err);
            None
        }
    }
}

fn die_name<'a>(dwarf: &Dwarf<'a>, unit: &Unit<'a>, entry: &Entry<'_, '_, 'a>) -> Result<Option<String>> {
    Ok(match entry.attr_value(gimli::DW_AT_name)? {
        Some(value) => attr_string(dwarf, unit, value),
        None => None,
    })
}

fn origin_offset(entry: &Entry<'_, '_, '_>) -> Result<Option<UnitOffset>> {
    for name in [gimli::DW_AT_specification, gimli::DW_AT_abstract_origin] {
        if let Some(AttributeValue::UnitRef(offset)) = entry.attr_value(name)? {
            return Ok(Some(offset));
        }
    }
    Ok(None)
}

/// Look up `name` on the DIE, falling back to its specification or
/// abstract origin within the same unit.
fn inherited_attr<'a>(
    unit: &Unit<'a>,
    entry: &Entry<'_, '_, 'a>,
    name: DwAt,
) -> Result<Option<AttributeValue<Slice<'a>>>> {
    if let Some(value) = entry.attr_value(name)? {
        return Ok(Some(value));
    }
    let mut next = origin_offset(entry)?;
    for _ in 0..MAX_ORIGIN_HOPS {
        let Some(offset) = next else {
            break;
        };
        let origin = unit.entry(offset)?;
        if let Some(value) = origin.attr_value(name)? {
            return Ok(Some(value));
        }
        next = origin_offset(&origin)?;
    }
    Ok(None)
}

fn has_static_location(unit: &Unit<'_>, entry: &Entry<'_, '_, '_>) -> Result<bool> {
    if let Some(AttributeValue::Exprloc(expr)) = entry.attr_value(gimli::DW_AT_location)? {
        let mut ops = expr.operations(unit.encoding());
        return Ok(matches!(
            ops.next()?,
            Some(gimli::Operation::Address { .. }) | Some(gimli::Operation::AddressIndex { .. })
        ));
    }
    Ok(false)
}

/// Byte offset of a member, from either a constant location, a DWARF 2
/// `DW_OP_plus_uconst` expression or a DWARF 4 bit offset.
fn member_offset(unit: &Unit<'_>, entry: &Entry<'_, '_, '_>) -> Result<u64> {
    match entry.attr_value(gimli::DW_AT_data_member_location)? {
        Some(AttributeValue::Exprloc(expr)) => {
            let mut ops = expr.operations(unit.encoding());
            match ops.next()? {
                Some(gimli::Operation::PlusConstant { value }) => Ok(value),
                _ => Ok(0),
            }
        }
        Some(value) => Ok(value.udata_value().unwrap_or(0)),
        None => Ok(udata(entry, gimli::DW_AT_data_bit_offset)?.map_or(0, |bits| bits / 8)),
    }
}

/// Element count of one array dimension; unknown bounds count as 0.
fn subrange_count(entry: &Entry<'_, '_, '_>) -> Result<u32> {
    let count = match udata(entry, gimli::DW_AT_count)? {
        Some(count) => count,
        None => udata(entry, gimli::DW_AT_upper_bound)?.map_or(0, |ub| ub.wrapping_add(1)),
    };
    Ok(u32::try_from(count).unwrap_or(0))
}

fn base_encoding(ate: DwAte, size: u64) -> (TypeKind, u16) {
    match ate {
        gimli::DW_ATE_float => {
            let enc = match size {
                4 => CTF_FP_SINGLE,
                8 => CTF_FP_DOUBLE,
                _ => CTF_FP_LDOUBLE,
            };
            (TypeKind::Float, enc)
        }
        gimli::DW_ATE_complex_float => {
            let enc = match size {
                8 => CTF_FP_CPLX,
                16 => CTF_FP_DCPLX,
                _ => CTF_FP_LDCPLX,
            };
            (TypeKind::Float, enc)
        }
        gimli::DW_ATE_signed => (TypeKind::Integer, CTF_INT_SIGNED),
        gimli::DW_ATE_signed_char => (TypeKind::Integer, CTF_INT_SIGNED | CTF_INT_CHAR),
        gimli::DW_ATE_unsigned_char => (TypeKind::Integer, CTF_INT_CHAR),
        gimli::DW_ATE_boolean => (TypeKind::Integer, CTF_INT_BOOL),
        _ => (TypeKind::Integer, 0),
    }
}
