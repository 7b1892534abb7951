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


//! The conversion pipeline: locate, decode, resolve, index.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use gimli::RunTimeEndian;
use log::info;
use memmap2::Mmap;

use crate::ctf;
use crate::dump;
use crate::dwarf::dwarf_parse;
use crate::elf::ElfContext;
use crate::error::{Error, Result};
use crate::itype::TypeGraph;
use crate::resolve::{resolve_symbols, ResolveStats};

/// A fully resolved graph, ready to be dumped or encoded.
#[derive(Debug)]
pub struct Conversion {
    graph: TypeGraph,
    endian: RunTimeEndian,
    stats: ResolveStats,
}

impl Conversion {
    /// Map `path` read-only and convert it.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if usize::try_from(len).is_err() {
            return Err(Error::FileTooBig);
        }
        // SAFETY: shared read-only mapping, dropped before this function
        // returns; nothing borrowed from it escapes. The file must not be
        // truncated or rewritten by another process meanwhile.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_bytes(&mmap)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let ctx = ElfContext::parse(data)?;
        let mut graph = TypeGraph::new();
        dwarf_parse(&ctx, &mut graph)?;

        let stats = resolve_symbols(&mut graph, &ctx.symbols);
        let ntypes = graph.assign_indices();
        info!(
            "{} types, {} functions, {} objects ({} without type information, {} duplicated)",
            ntypes,
            graph.functions().len(),
            graph.objects().len(),
            stats.unknown,
            stats.duplicated
        );

        Ok(Self {
            graph,
            endian: ctx.endian,
            stats,
        })
    }

    pub fn graph(&self) -> &TypeGraph {
        &self.graph
    }

    pub fn stats(&self) -> ResolveStats {
        self.stats
    }

    /// Write the ctfdump-style listing.
    pub fn dump<W: Write>(&self, out: &mut W) -> Result<()> {
        dump::dump(&self.graph, out)
    }

    /// Encode as a compressed CTF blob in the input's byte order.
    pub fn to_ctf(&self, label: &str) -> Result<Vec<u8>> {
        ctf::encode(&self.graph, label, self.endian, true)
    }

    pub fn write_ctf(&self, label: &str, path: &Path) -> Result<()> {
        let blob = self.to_ctf(label)?;
        fs::write(path, &blob)?;
        info!("wrote {} bytes of CTF to {}", blob.len(), path.display());
        Ok(())
    }
}
