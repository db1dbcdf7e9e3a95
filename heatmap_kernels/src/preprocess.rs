// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A small line based preprocessor for kernel sources.
//!
//! Supported directives, each at the start of its line:
//!
//! - `#ifdef NAME`, `#ifndef NAME`, `#else`, `#endif`, tested against the
//!   define names;
//! - `#import NAME`, replaced by `shared/NAME.wgsl` the first time it appears.
//!
//! Malformed directives are logged and skipped rather than rejected; naga
//! reports whatever they break.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::{Error, KERNEL_EXTENSION};

/// Loads every `shared/*.wgsl` file next to a kernel, keyed by file stem.
///
/// A kernel directory without a `shared` subdirectory has no imports.
pub fn get_imports(kernel_dir: &Path) -> Result<HashMap<String, String>, Error> {
    let shared = kernel_dir.join("shared");
    let entries = match fs::read_dir(&shared) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(source) => {
            return Err(Error::Io {
                path: shared,
                source,
            });
        }
    };
    let mut imports = HashMap::new();
    for path in entries.filter_map(|entry| entry.ok().map(|entry| entry.path())) {
        if path.extension().is_none_or(|ext| ext != KERNEL_EXTENSION) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let stem = stem.to_owned();
        let contents = fs::read_to_string(&path).map_err(|source| Error::Io { path, source })?;
        imports.insert(stem, contents);
    }
    Ok(imports)
}

/// Expands `input`, the source of kernel `kernel_name`.
pub fn preprocess(
    input: &str,
    kernel_name: &str,
    defines: &HashSet<String>,
    imports: &HashMap<String, String>,
) -> String {
    let mut preprocessor = Preprocessor {
        kernel_name,
        defines,
        imports,
        imported: HashSet::new(),
    };
    let mut output = String::with_capacity(input.len());
    preprocessor.expand(input, &mut output);
    output
}

struct Preprocessor<'a> {
    kernel_name: &'a str,
    defines: &'a HashSet<String>,
    imports: &'a HashMap<String, String>,
    /// Imports already inlined, each is emitted once.
    imported: HashSet<String>,
}

/// One open `#ifdef`/`#ifndef`.
struct Branch {
    taken: bool,
    seen_else: bool,
}

/// A line holding a directive, split around it.
struct Directive<'l> {
    indent: &'l str,
    name: &'l str,
    argument: &'l str,
}

impl<'l> Directive<'l> {
    /// Finds a directive on `line`, ignoring any inside a `//` comment.
    fn parse(line: &'l str) -> Option<Self> {
        let hash = line.find('#')?;
        if line.find("//").is_some_and(|comment| comment < hash) {
            return None;
        }
        let rest = &line[hash + 1..];
        let name_len = rest
            .find(|c: char| !c.is_alphanumeric())
            .unwrap_or(rest.len());
        Some(Self {
            indent: &line[..hash],
            name: &rest[..name_len],
            argument: rest[name_len..].trim(),
        })
    }

    /// The argument without any trailing comment.
    fn argument_code(&self) -> &'l str {
        match self.argument.find("//") {
            Some(comment) => self.argument[..comment].trim_end(),
            None => self.argument,
        }
    }
}

impl Preprocessor<'_> {
    fn warn(&self, line_number: usize, message: &str) {
        log::warn!(
            "{message} (line {line_number} of {}.wgsl)",
            self.kernel_name
        );
    }

    fn expand(&mut self, input: &str, output: &mut String) {
        let mut branches: Vec<Branch> = Vec::new();
        for (line_number, line) in (1..).zip(input.lines()) {
            let active = branches.iter().all(|branch| branch.taken);
            let Some(directive) = Directive::parse(line) else {
                if active {
                    output.push_str(line);
                    output.push('\n');
                }
                continue;
            };
            let conditional = matches!(directive.name, "ifdef" | "ifndef" | "else" | "endif");
            if conditional && !directive.indent.trim().is_empty() {
                self.warn(
                    line_number,
                    &format!("#{} must start its line, ignoring it", directive.name),
                );
                if active {
                    output.push_str(line);
                    output.push('\n');
                }
                continue;
            }
            match directive.name {
                "ifdef" | "ifndef" => {
                    let defined = self.defines.contains(directive.argument_code());
                    branches.push(Branch {
                        taken: defined == (directive.name == "ifdef"),
                        seen_else: false,
                    });
                }
                "else" => {
                    match branches.last_mut() {
                        Some(branch) if branch.seen_else => {
                            self.warn(line_number, "Second #else for the same #ifdef, ignoring it");
                        }
                        Some(branch) => {
                            branch.seen_else = true;
                            branch.taken = !branch.taken;
                        }
                        None => self.warn(line_number, "#else without #ifdef"),
                    }
                    if !directive.argument_code().is_empty() {
                        self.warn(line_number, "#else takes no argument, dropping it");
                    }
                }
                "endif" => {
                    if branches.pop().is_none() {
                        self.warn(line_number, "#endif without #ifdef");
                    }
                    if !directive.argument_code().is_empty() {
                        self.warn(line_number, "#endif takes no argument, dropping it");
                    }
                }
                "import" => {
                    if active {
                        self.import(line_number, &directive, output);
                    }
                }
                other => {
                    self.warn(
                        line_number,
                        &format!("Unknown directive `#{other}`, keeping the line"),
                    );
                    if active {
                        output.push_str(line);
                        output.push('\n');
                    }
                }
            }
        }
        if !branches.is_empty() {
            log::warn!(
                "{} unterminated #ifdef in {}.wgsl",
                branches.len(),
                self.kernel_name
            );
        }
    }

    fn import(&mut self, line_number: usize, directive: &Directive<'_>, output: &mut String) {
        let argument = directive.argument;
        let name_len = argument
            .find(|c: char| !(c == '_' || c.is_alphanumeric()))
            .unwrap_or(argument.len());
        let (name, rest) = argument.split_at(name_len);
        if name.is_empty() {
            self.warn(line_number, "#import needs a name");
            return;
        }
        let imports = self.imports;
        let Some(source) = imports.get(name) else {
            self.warn(line_number, &format!("Unknown import `{name}`"));
            return;
        };
        output.push_str(directive.indent);
        if self.imported.insert(name.to_owned()) {
            self.expand(source, output);
        } else {
            log::debug!("`{name}` already imported into {}", self.kernel_name);
        }
        output.push_str(rest.trim_start());
        output.push('\n');
    }
}
