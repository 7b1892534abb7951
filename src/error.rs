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

//! Error type shared by every conversion stage.

use thiserror::Error;

use crate::itype::TypeKind;

/// Everything that can stop a conversion.
///
/// Section location and decoding failures are user facing: bad input,
/// missing debug sections. `UnresolvedReference` is different, it means a
/// record escaped the decoder without its `reference` link and is a bug in
/// this crate rather than in the input.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file too big to fit memory")]
    FileTooBig,

    #[error("not an ELF file")]
    NotElf,

    #[error("malformed object file: {0}")]
    Object(#[from] object::read::Error),

    /// A mandatory section is absent.
    #[error("{0} section not found")]
    MissingSection(&'static str),

    #[error("malformed DWARF: {0}")]
    Dwarf(#[from] gimli::Error),

    /// A `DW_AT_type` (or similar) points at a DIE that produced no type.
    #[error("DIE at .debug_info+{offset:#x} refers to unknown DIE at .debug_info+{target:#x}")]
    DanglingReference { offset: usize, target: usize },

    /// Invariant violation: a record that must reference another one does not.
    #[error("unresolved reference in {kind:?} type {name:?}")]
    UnresolvedReference { kind: TypeKind, name: Option<String> },

    /// Invariant violation: a record of this kind has no place in the listing.
    #[error("unexpected {0:?} type in type listing")]
    UnexpectedKind(TypeKind),

    /// The graph cannot be represented in the CTF container.
    #[error("cannot encode CTF: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
