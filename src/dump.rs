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

//! Text dump of a resolved type graph, laid out like ctfdump(1) so the two can
//! be diffed.

use std::borrow::Cow;
use std::io::Write;

use crate::error::{Error, Result};
use crate::itype::{TypeGraph, TypeId, TypeKind, CTF_INT_VARARGS};

const ENC_NAMES: [&str; 5] = ["SIGNED", "CHAR", "SIGNED CHAR", "BOOL", "SIGNED BOOL"];

/// Object lines pad the `[n] type` prefix out to this column.
const OBJ_COLUMN: usize = 14;

pub fn ctf_enc2name(enc: u16) -> Cow<'static, str> {
    if enc == CTF_INT_VARARGS {
        return Cow::Borrowed("VARARGS");
    }
    match enc {
        1..=5 => Cow::Borrowed(ENC_NAMES[usize::from(enc) - 1]),
        _ => Cow::Owned(format!("0x{:x}", enc)),
    }
}

fn name_or<'a>(name: &'a Option<String>, fallback: &'a str) -> &'a str {
    name.as_deref().unwrap_or(fallback)
}

/// Dump matched objects, matched functions, then every other type.
pub fn dump<W: Write>(graph: &TypeGraph, out: &mut W) -> Result<()> {
    for (n, &id) in graph.objects().iter().enumerate() {
        dump_obj(graph, id, n + 1, out)?;
    }
    writeln!(out)?;

    for (n, &id) in graph.functions().iter().enumerate() {
        dump_func(graph, id, n + 1, out)?;
    }
    writeln!(out)?;

    for (id, _) in graph.emitted_types() {
        dump_type(graph, id, out)?;
    }
    Ok(())
}

pub fn dump_type<W: Write>(graph: &TypeGraph, id: TypeId, out: &mut W) -> Result<()> {
    let it = graph.get(id);
    let idx = it.index;

    match it.kind {
        TypeKind::Integer | TypeKind::Float => {
            writeln!(
                out,
                "  [{}] {} {} encoding={} offset=0 bits={}",
                idx,
                if it.kind == TypeKind::Integer { "INTEGER" } else { "FLOAT" },
                name_or(&it.name, "(anon)"),
                ctf_enc2name(it.encoding),
                it.size.saturating_mul(8)
            )?;
        }
        TypeKind::Pointer | TypeKind::Typedef | TypeKind::Volatile | TypeKind::Const | TypeKind::Restrict => {
            let label = match it.kind {
                TypeKind::Pointer => "POINTER",
                TypeKind::Typedef => "TYPEDEF",
                TypeKind::Volatile => "VOLATILE",
                TypeKind::Const => "CONST",
                _ => "RESTRICT",
            };
            writeln!(
                out,
                "  <{}> {} {} refers to {}",
                idx,
                label,
                name_or(&it.name, "(anon)"),
                graph.referenced(id)?.index
            )?;
        }
        TypeKind::Array => {
            let index_tidx = graph.index_type().map_or(0, |t| graph.get(t).index);
            writeln!(
                out,
                "  [{}] ARRAY {} content: {} index: {} nelems: {}",
                idx,
                name_or(&it.name, "(anon)"),
                graph.referenced(id)?.index,
                index_tidx,
                it.element_count
            )?;
            writeln!(out)?;
        }
        TypeKind::Struct | TypeKind::Union => {
            writeln!(
                out,
                "  [{}] {} {} ({} bytes)",
                idx,
                if it.kind == TypeKind::Struct { "STRUCT" } else { "UNION" },
                name_or(&it.name, "(anon)"),
                it.size
            )?;
            for im in &it.members {
                writeln!(
                    out,
                    "\t{} type={} off={}",
                    name_or(&im.name, "unknown"),
                    graph.get(im.reference).index,
                    im.offset
                )?;
            }
            writeln!(out)?;
        }
        TypeKind::Enum => {
            writeln!(out, "  [{}] ENUM {}", idx, name_or(&it.name, "(anon)"))?;
            writeln!(out)?;
        }
        TypeKind::Function => {
            write!(
                out,
                "  [{}] FUNCTION ({}) returns: {} args: (",
                idx,
                name_or(&it.name, "anon"),
                graph.referenced(id)?.index
            )?;
            write_args(graph, id, out)?;
        }
        TypeKind::Unknown => return Err(Error::UnexpectedKind(it.kind)),
    }
    Ok(())
}

/// One line of the function section. `n` still advances for skipped
/// placeholders so numbering follows the symbol table.
pub fn dump_func<W: Write>(graph: &TypeGraph, id: TypeId, n: usize, out: &mut W) -> Result<()> {
    let it = graph.get(id);
    if it.kind == TypeKind::Unknown && it.element_count == 0 {
        return Ok(());
    }

    write!(
        out,
        "  [{}] FUNC ({}) returns: {} args: (",
        n,
        name_or(&it.name, "unknown"),
        graph.referenced(id)?.index
    )?;
    write_args(graph, id, out)
}

pub fn dump_obj<W: Write>(graph: &TypeGraph, id: TypeId, n: usize, out: &mut W) -> Result<()> {
    let it = graph.get(id);
    let prefix = format!("  [{}] {}", n, graph.referenced(id)?.index);
    // a prefix wider than the column still gets |column - width| spaces
    let pad = OBJ_COLUMN.abs_diff(prefix.len());
    writeln!(
        out,
        "{}{:pad$} {} ({})",
        prefix,
        "",
        name_or(&it.name, "(anon)"),
        it.symbol_slot,
        pad = pad
    )?;
    Ok(())
}

fn write_args<W: Write>(graph: &TypeGraph, id: TypeId, out: &mut W) -> Result<()> {
    let args: Vec<String> = graph
        .get(id)
        .members
        .iter()
        .map(|im| graph.get(im.reference).index.to_string())
        .collect();
    writeln!(out, "{})", args.join(", "))?;
    Ok(())
}
