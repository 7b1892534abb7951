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


//! Convert DWARF debugging information from an ELF file into CTF.

pub mod convert;
pub mod ctf;
pub mod dump;
pub mod dwarf;
pub mod elf;
pub mod error;
pub mod itype;
pub mod logging;
pub mod resolve;
pub mod symbols;

pub use convert::Conversion;
pub use error::{Error, Result};
pub use itype::{TypeGraph, TypeId, TypeKind, TypeRecord};
