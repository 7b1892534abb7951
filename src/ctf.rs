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

//! CTF version 2 container writer.
//!
//! Layout: a fixed header followed by the label, object, function, type and
//! string sections. Header offsets are relative to the end of the header, and
//! everything after the header is zlib compressed when `CTF_F_COMPRESS` is set.

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use gimli::{Endianity, RunTimeEndian};
use log::debug;

use crate::error::{Error, Result};
use crate::itype::{TypeGraph, TypeId, TypeKind, TypeRecord};

pub const CTF_MAGIC: u16 = 0xcff1;
pub const CTF_VERSION: u8 = 2;
pub const CTF_F_COMPRESS: u8 = 0x1;

pub const CTF_MAX_SIZE: u64 = 0xfffe;
pub const CTF_LSIZE_SENT: u16 = 0xffff;
pub const CTF_MAX_VLEN: usize = 0x3ff;
pub const CTF_LSTRUCT_THRESH: u64 = 8192;

pub const CTF_HEADER_LEN: usize = 36;

/// The fixed-size CTF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtfHeader {
    pub magic: u16,
    pub version: u8,
    pub flags: u8,
    pub parlabel: u32,
    pub parname: u32,
    pub lbloff: u32,
    pub objtoff: u32,
    pub funcoff: u32,
    pub typeoff: u32,
    pub stroff: u32,
    pub strlen: u32,
}

impl CtfHeader {
    fn write(&self, out: &mut CtfBuf) {
        out.u16(self.magic);
        out.u8(self.version);
        out.u8(self.flags);
        for word in [
            self.parlabel,
            self.parname,
            self.lbloff,
            self.objtoff,
            self.funcoff,
            self.typeoff,
            self.stroff,
            self.strlen,
        ] {
            out.u32(word);
        }
    }

    /// Read back a header, checking magic and version.
    pub fn read(data: &[u8], endian: RunTimeEndian) -> Result<Self> {
        if data.len() < CTF_HEADER_LEN {
            return Err(Error::Encode("truncated CTF header".into()));
        }
        let word = |pos: usize| endian.read_u32(&data[pos..pos + 4]);
        let header = Self {
            magic: endian.read_u16(&data[0..2]),
            version: data[2],
            flags: data[3],
            parlabel: word(4),
            parname: word(8),
            lbloff: word(12),
            objtoff: word(16),
            funcoff: word(20),
            typeoff: word(24),
            stroff: word(28),
            strlen: word(32),
        };
        if header.magic != CTF_MAGIC || header.version != CTF_VERSION {
            return Err(Error::Encode(format!(
                "bad CTF magic {:#x} or version {}",
                header.magic, header.version
            )));
        }
        Ok(header)
    }

    /// The section data following the header, inflated if needed.
    pub fn body(&self, data: &[u8]) -> Result<Vec<u8>> {
        let raw = data.get(CTF_HEADER_LEN..).unwrap_or_default();
        if self.flags & CTF_F_COMPRESS == 0 {
            return Ok(raw.to_vec());
        }
        let mut body = Vec::new();
        ZlibDecoder::new(raw).read_to_end(&mut body)?;
        Ok(body)
    }
}

/// Byte buffer writing in the target's byte order.
struct CtfBuf {
    data: Vec<u8>,
    endian: RunTimeEndian,
}

impl CtfBuf {
    fn new(endian: RunTimeEndian) -> Self {
        Self { data: Vec::new(), endian }
    }

    fn u8(&mut self, v: u8) {
        self.data.push(v);
    }

    fn u16(&mut self, v: u16) {
        let mut buf = [0; 2];
        self.endian.write_u16(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    fn u32(&mut self, v: u32) {
        let mut buf = [0; 4];
        self.endian.write_u32(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    fn len(&self) -> u32 {
        self.data.len() as u32
    }
}

/// Deduplicated string table; offset 0 is the empty string.
#[derive(Debug)]
pub struct StringTable {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl Default for StringTable {
    fn default() -> Self {
        Self {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, s: Option<&str>) -> u32 {
        let s = match s {
            Some(s) if !s.is_empty() => s,
            _ => return 0,
        };
        if let Some(&off) = self.offsets.get(s) {
            return off;
        }
        let off = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        self.offsets.insert(s.to_string(), off);
        off
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

fn type_index(index: u32) -> Result<u16> {
    u16::try_from(index).map_err(|_| Error::Encode(format!("type id {} exceeds the CTF v2 limit", index)))
}

fn vlen(n: usize, it: &TypeRecord) -> Result<u16> {
    if n > CTF_MAX_VLEN {
        return Err(Error::Encode(format!(
            "{} {:?} has {} entries, more than {}",
            it.name.as_deref().unwrap_or("(anon)"),
            it.kind,
            n,
            CTF_MAX_VLEN
        )));
    }
    Ok(n as u16)
}

fn too_wide(it: &TypeRecord, what: &str, value: u64) -> Error {
    Error::Encode(format!(
        "{} {:?} {} {} does not fit in CTF v2 bits",
        it.name.as_deref().unwrap_or("(anon)"),
        it.kind,
        what,
        value
    ))
}

fn info(kind: TypeKind, root: bool, vlen: u16) -> u16 {
    kind.ctf_kind() << 11 | u16::from(root) << 10 | vlen
}

struct Encoder<'g> {
    graph: &'g TypeGraph,
    endian: RunTimeEndian,
    strtab: StringTable,
}

impl<'g> Encoder<'g> {
    fn ref_index(&self, id: TypeId) -> Result<u16> {
        type_index(self.graph.referenced(id)?.index)
    }

    fn labels(&mut self, label: &str, last: u32) -> CtfBuf {
        let mut out = CtfBuf::new(self.endian);
        out.u32(self.strtab.add(Some(label)));
        out.u32(last);
        out
    }

    fn objects(&self) -> Result<CtfBuf> {
        let mut out = CtfBuf::new(self.endian);
        for &id in self.graph.objects() {
            out.u16(self.ref_index(id)?);
        }
        Ok(out)
    }

    fn functions(&self) -> Result<CtfBuf> {
        let mut out = CtfBuf::new(self.endian);
        for &id in self.graph.functions() {
            let it = self.graph.get(id);
            if it.kind == TypeKind::Unknown {
                out.u16(0);
                continue;
            }
            out.u16(info(TypeKind::Function, false, vlen(it.members.len(), it)?));
            out.u16(self.ref_index(id)?);
            for im in &it.members {
                out.u16(type_index(self.graph.get(im.reference).index)?);
            }
        }
        Ok(out)
    }

    fn types(&mut self) -> Result<CtfBuf> {
        let mut out = CtfBuf::new(self.endian);
        let graph = self.graph;
        for (id, _) in graph.emitted_types() {
            self.type_entry(id, &mut out)?;
        }
        Ok(out)
    }

    fn sized(out: &mut CtfBuf, size: u64) {
        if size > CTF_MAX_SIZE {
            out.u16(CTF_LSIZE_SENT);
            out.u32((size >> 32) as u32);
            out.u32(size as u32);
        } else {
            out.u16(size as u16);
        }
    }

    fn type_entry(&mut self, id: TypeId, out: &mut CtfBuf) -> Result<()> {
        let graph = self.graph;
        let it = graph.get(id);
        type_index(it.index)?;
        out.u32(self.strtab.add(it.name.as_deref()));

        match it.kind {
            TypeKind::Integer | TypeKind::Float => {
                out.u16(info(it.kind, true, 0));
                Self::sized(out, it.size);
                let bits = it
                    .size
                    .checked_mul(8)
                    .and_then(|bits| u16::try_from(bits).ok())
                    .ok_or_else(|| too_wide(it, "size", it.size))?;
                out.u32(u32::from(it.encoding) << 24 | u32::from(bits));
            }
            TypeKind::Pointer | TypeKind::Typedef | TypeKind::Volatile | TypeKind::Const | TypeKind::Restrict => {
                out.u16(info(it.kind, true, 0));
                out.u16(self.ref_index(id)?);
            }
            TypeKind::Array => {
                out.u16(info(it.kind, true, 0));
                out.u16(0);
                out.u16(self.ref_index(id)?);
                let index = graph.index_type().map_or(0, |idx| graph.get(idx).index);
                out.u16(type_index(index)?);
                out.u32(it.element_count);
            }
            TypeKind::Function => {
                let argc = vlen(it.members.len(), it)?;
                out.u16(info(it.kind, true, argc));
                out.u16(self.ref_index(id)?);
                for im in &it.members {
                    out.u16(type_index(graph.get(im.reference).index)?);
                }
                if argc & 1 == 1 {
                    out.u16(0);
                }
            }
            TypeKind::Struct | TypeKind::Union => {
                out.u16(info(it.kind, true, vlen(it.members.len(), it)?));
                Self::sized(out, it.size);
                let long = it.size >= CTF_LSTRUCT_THRESH;
                for im in &it.members {
                    out.u32(self.strtab.add(im.name.as_deref()));
                    out.u16(type_index(graph.get(im.reference).index)?);
                    let bits = im.offset.checked_mul(8).ok_or_else(|| too_wide(it, "member offset", im.offset))?;
                    if long {
                        out.u16(0);
                        out.u32((bits >> 32) as u32);
                        out.u32(bits as u32);
                    } else {
                        let bits = u16::try_from(bits).map_err(|_| too_wide(it, "member offset", im.offset))?;
                        out.u16(bits);
                    }
                }
            }
            TypeKind::Enum => {
                out.u16(info(it.kind, true, vlen(it.enumerators.len(), it)?));
                Self::sized(out, it.size);
                for en in &it.enumerators {
                    out.u32(self.strtab.add(Some(&en.name)));
                    out.u32(en.value as i32 as u32);
                }
            }
            TypeKind::Unknown => return Err(Error::UnexpectedKind(it.kind)),
        }
        Ok(())
    }
}

/// Serialize a resolved, indexed graph into a CTF v2 blob.
pub fn encode(graph: &TypeGraph, label: &str, endian: RunTimeEndian, compress: bool) -> Result<Vec<u8>> {
    let last = graph.emitted_types().map(|(_, it)| it.index).max().unwrap_or(0);
    type_index(last)?;

    let mut enc = Encoder {
        graph,
        endian,
        strtab: StringTable::new(),
    };
    let labels = enc.labels(label, last);
    let objects = enc.objects()?;
    let functions = enc.functions()?;
    let types = enc.types()?;

    let mut header = CtfHeader {
        magic: CTF_MAGIC,
        version: CTF_VERSION,
        flags: if compress { CTF_F_COMPRESS } else { 0 },
        ..CtfHeader::default()
    };
    header.lbloff = 0;
    header.objtoff = header.lbloff + labels.len();
    header.funcoff = header.objtoff + objects.len();
    header.typeoff = header.funcoff + functions.len();
    header.stroff = header.typeoff + types.len();
    header.strlen = enc.strtab.as_bytes().len() as u32;

    let mut body = Vec::with_capacity((header.stroff + header.strlen) as usize);
    for section in [&labels, &objects, &functions, &types] {
        body.extend_from_slice(&section.data);
    }
    body.extend_from_slice(enc.strtab.as_bytes());

    let mut out = CtfBuf::new(endian);
    header.write(&mut out);
    if compress {
        let mut z = ZlibEncoder::new(out.data, Compression::default());
        z.write_all(&body)?;
        out.data = z.finish()?;
    } else {
        out.data.extend_from_slice(&body);
    }

    debug!(
        "CTF: {} types, {} objects, {} functions, {} bytes of strings, {} bytes total",
        last,
        graph.objects().len(),
        graph.functions().len(),
        header.strlen,
        out.data.len()
    );
    Ok(out.data)
}
