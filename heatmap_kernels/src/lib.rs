// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Kernel sources for the heatmap tile renderer.
//!
//! A kernel is a WGSL compute shader with a `generate_pixel` entry point which
//! writes one palette index per pixel of a 256×256 tile. This crate finds kernel
//! files along a fixed search path, runs them through a small preprocessor
//! (`#ifdef`, `#ifndef`, `#else`, `#endif` and `#import`), prepends the constants
//! every kernel can rely on and checks the result against the binding contract
//! with [naga].
//!
//! The [`cpu`] module contains Rust versions of the bundled kernels which are
//! used by the CPU backend and by tests.
//!
//! [naga]: https://github.com/gfx-rs/wgpu/tree/trunk/naga

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs, reason = "We have many as-yet undocumented items.")]
#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_assert_message,
    reason = "Deferred"
)]

mod compile;
pub mod cpu;
mod preprocess;
mod types;

pub use compile::KernelInfo;
pub use types::{BindType, BindingInfo, KERNEL_LAYOUT, KernelParams};

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::{fs, io};

use thiserror::Error;

/// Width and height of every tile, in pixels.
pub const TILE_SIZE: u32 = 256;
/// Number of palette entries a kernel may index into.
pub const COLORS_LEN: u32 = 256;
/// Edge length of the square workgroup the bundled kernels use.
pub const WORKGROUP_SIZE: u32 = 16;
/// Name of the compute entry point every kernel must provide.
pub const ENTRY_POINT: &str = "generate_pixel";

pub(crate) const KERNEL_EXTENSION: &str = "wgsl";

/// Directories searched, in order, for a kernel given by name.
///
/// The bundled kernel directory is tried after these.
pub const SEARCH_PATHS: &[&str] = &[
    "./",
    "../kernels",
    "./kernels",
    "/usr/share/heatmap/kernels",
    "/usr/local/share/heatmap/kernels",
];

/// Errors that can occur while loading or checking a kernel.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Kernel `{name}` not found ({} locations tried)", .searched.len())]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("Invalid define `{0}`, expected NAME or NAME=VALUE")]
    InvalidDefine(String),

    #[error("Failed to parse kernel `{name}`:\n{message}")]
    Parse { name: String, message: String },

    #[error("Kernel `{name}` failed validation:\n{message}")]
    Validate { name: String, message: String },

    #[error("Kernel `{name}` has no compute entry point named `{ENTRY_POINT}`")]
    EntryPointNotFound { name: String },

    #[error("Kernel `{name}` binds {location:?} as {found:?}, expected {expected}")]
    BindingMismatch {
        name: String,
        location: (u32, u32),
        found: BindType,
        expected: String,
    },

    #[error("Kernel `{name}` never writes the output raster at binding 3")]
    MissingRaster { name: String },
}

/// The bundled kernel directory shipped with this crate.
pub fn bundled_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("kernels")
}

/// The full list of directories [`resolve`] tries.
pub fn search_dirs() -> Vec<PathBuf> {
    SEARCH_PATHS
        .iter()
        .map(PathBuf::from)
        .chain(std::iter::once(bundled_dir()))
        .collect()
}

/// Finds the file for kernel `name` along [`search_dirs`].
pub fn resolve(name: &str) -> Result<PathBuf, Error> {
    resolve_in(name, &search_dirs())
}

/// Finds the file for kernel `name` in `dirs`, first hit wins.
///
/// A name which contains a path separator is taken as a path and not searched for.
pub fn resolve_in(name: &str, dirs: &[PathBuf]) -> Result<PathBuf, Error> {
    if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(name);
        if path.is_file() {
            return Ok(path);
        }
        return Err(Error::NotFound {
            name: name.to_owned(),
            searched: vec![path],
        });
    }
    let file_name = if Path::new(name)
        .extension()
        .is_some_and(|ext| ext == KERNEL_EXTENSION)
    {
        name.to_owned()
    } else {
        format!("{name}.{KERNEL_EXTENSION}")
    };
    let mut searched = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let candidate = dir.join(&file_name);
        if candidate.is_file() {
            log::debug!("Kernel `{name}` resolved to {}", candidate.display());
            return Ok(candidate);
        }
        searched.push(candidate);
    }
    Err(Error::NotFound {
        name: name.to_owned(),
        searched,
    })
}

/// Preprocessor defines passed on the command line as `NAME` or `NAME=VALUE`.
///
/// Every name is visible to `#ifdef`. Valued defines also become a WGSL
/// `const NAME = VALUE;` declaration at the top of the kernel.
#[derive(Clone, Debug, Default)]
pub struct Defines {
    names: HashSet<String>,
    values: Vec<(String, String)>,
}

impl Defines {
    pub fn parse<I, S>(items: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut defines = Self::default();
        for item in items {
            let item = item.as_ref().trim();
            let (name, value) = match item.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value.trim())),
                None => (item, None),
            };
            if !is_identifier(name) || value.is_some_and(str::is_empty) {
                return Err(Error::InvalidDefine(item.to_owned()));
            }
            defines.names.insert(name.to_owned());
            if let Some(value) = value {
                defines.values.retain(|(existing, _)| existing != name);
                defines.values.push((name.to_owned(), value.to_owned()));
            }
        }
        Ok(defines)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> &HashSet<String> {
        &self.names
    }

    /// The value given to `name`, if any.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// The value given to `name` read as a WGSL float literal.
    pub fn value_f32(&self, name: &str) -> Option<f32> {
        let value = self.value(name)?;
        value
            .strip_suffix('f')
            .unwrap_or(value)
            .parse()
            .ok()
    }

    fn prelude(&self) -> String {
        let mut prelude = String::new();
        let _ = writeln!(prelude, "const TILE_SIZE: u32 = {TILE_SIZE}u;");
        let _ = writeln!(prelude, "const COLORS_LEN: u32 = {COLORS_LEN}u;");
        let _ = writeln!(prelude, "const WORKGROUP_SIZE: u32 = {WORKGROUP_SIZE}u;");
        for (name, value) in &self.values {
            let _ = writeln!(prelude, "const {name} = {value};");
        }
        prelude
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// A preprocessed kernel, ready to be compiled by a backend.
#[derive(Clone, Debug)]
pub struct KernelSource {
    /// File stem of the kernel, used to find its CPU implementation.
    pub name: String,
    pub path: PathBuf,
    /// Complete WGSL, prelude included.
    pub code: String,
    pub defines: Defines,
}

impl KernelSource {
    /// Resolves `name` along the search path and preprocesses it.
    pub fn load(name: &str, defines: &Defines) -> Result<Self, Error> {
        let path = resolve(name)?;
        Self::from_path(&path, defines)
    }

    pub fn from_path(path: &Path, defines: &Defines) -> Result<Self, Error> {
        let raw = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        let kernel_dir = path.parent().unwrap_or(Path::new("."));
        let imports = preprocess::get_imports(kernel_dir)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut code = defines.prelude();
        code.push_str(&preprocess::preprocess(
            &raw,
            &name,
            defines.names(),
            &imports,
        ));
        Ok(Self {
            name,
            path: path.to_owned(),
            code,
            defines: defines.clone(),
        })
    }
}
