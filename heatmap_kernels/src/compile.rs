// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use naga::{
    AddressSpace, Module, ShaderStage, StorageAccess,
    front::wgsl,
    valid::{Capabilities, ModuleInfo, ValidationFlags},
};

use crate::types::{BindType, BindingInfo, KERNEL_LAYOUT};
use crate::{ENTRY_POINT, Error, KernelSource};

/// Reflection data for a validated kernel.
#[derive(Debug)]
pub struct KernelInfo {
    pub module: Module,
    pub module_info: ModuleInfo,
    pub workgroup_size: [u32; 3],
    /// Bindings used by the entry point, sorted by location.
    pub bindings: Vec<BindingInfo>,
}

impl KernelInfo {
    /// Parses and validates `source`, then checks that it fits the kernel contract.
    pub fn new(source: &KernelSource) -> Result<Self, Error> {
        let name = &source.name;
        let module = wgsl::parse_str(&source.code).map_err(|e| Error::Parse {
            name: name.clone(),
            message: e.emit_to_string(&source.code),
        })?;
        let module_info = naga::valid::Validator::new(
            ValidationFlags::all() & !ValidationFlags::CONTROL_FLOW_UNIFORMITY,
            Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| Error::Validate {
            name: name.clone(),
            message: e.emit_to_string(&source.code),
        })?;
        let (entry_index, entry) = module
            .entry_points
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.name == ENTRY_POINT && entry.stage == ShaderStage::Compute)
            .ok_or_else(|| Error::EntryPointNotFound { name: name.clone() })?;
        let mut bindings = vec![];
        let entry_info = module_info.get_entry_point(entry_index);
        for (var_handle, var) in module.global_variables.iter() {
            if entry_info[var_handle].is_empty() {
                continue;
            }
            let Some(binding) = &var.binding else {
                continue;
            };
            let ty = match var.space {
                AddressSpace::Storage { access } if access.contains(StorageAccess::STORE) => {
                    BindType::Buffer
                }
                AddressSpace::Uniform => BindType::Uniform,
                _ => BindType::BufReadOnly,
            };
            bindings.push(BindingInfo {
                name: var.name.clone(),
                location: (binding.group, binding.binding),
                ty,
            });
        }
        bindings.sort_by_key(|res| res.location);
        check_layout(name, &bindings)?;
        let workgroup_size = entry.workgroup_size;
        log::debug!(
            "Kernel `{name}` validated: workgroup {workgroup_size:?}, {} bindings",
            bindings.len()
        );
        Ok(Self {
            module,
            module_info,
            workgroup_size,
            bindings,
        })
    }
}

/// Every used binding must sit where [`KERNEL_LAYOUT`] expects it, and the
/// raster must be written.
fn check_layout(name: &str, bindings: &[BindingInfo]) -> Result<(), Error> {
    for binding in bindings {
        let (group, slot) = binding.location;
        let expected = (group == 0)
            .then(|| KERNEL_LAYOUT.get(slot as usize))
            .flatten();
        match expected {
            Some(&ty) if ty == binding.ty => {}
            Some(ty) => {
                return Err(Error::BindingMismatch {
                    name: name.to_owned(),
                    location: binding.location,
                    found: binding.ty,
                    expected: format!("{ty:?}"),
                });
            }
            None => {
                return Err(Error::BindingMismatch {
                    name: name.to_owned(),
                    location: binding.location,
                    found: binding.ty,
                    expected: "no binding".to_owned(),
                });
            }
        }
    }
    if !bindings.iter().any(|b| b.location == (0, 3)) {
        return Err(Error::MissingRaster {
            name: name.to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::KernelInfo;
    use crate::{Defines, Error, KernelSource};

    fn source(code: &str) -> KernelSource {
        KernelSource {
            name: "test".to_owned(),
            path: PathBuf::from("test.wgsl"),
            code: code.to_owned(),
            defines: Defines::default(),
        }
    }

    const RASTER: &str = "@group(0) @binding(3) var<storage, read_write> raster: array<u32>;\n";

    #[test]
    fn minimal_kernel_is_accepted() {
        let code = format!(
            "{RASTER}@compute @workgroup_size(8, 8)\n\
             fn generate_pixel(@builtin(global_invocation_id) id: vec3<u32>) {{\n\
                 raster[id.y * 256u + id.x] = 1u;\n\
             }}\n"
        );
        let info = KernelInfo::new(&source(&code)).unwrap();
        assert_eq!(info.workgroup_size, [8, 8, 1]);
        assert_eq!(info.bindings.len(), 1);
    }

    #[test]
    fn wrong_entry_point_is_rejected() {
        let code = format!(
            "{RASTER}@compute @workgroup_size(1)\n\
             fn main() {{ raster[0] = 1u; }}\n"
        );
        assert!(matches!(
            KernelInfo::new(&source(&code)),
            Err(Error::EntryPointNotFound { .. })
        ));
    }

    #[test]
    fn read_only_raster_is_rejected() {
        let code = "@group(0) @binding(3) var<storage, read> raster: array<u32>;\n\
                    @group(0) @binding(4) var<storage, read_write> out: array<u32>;\n\
                    @compute @workgroup_size(1)\n\
                    fn generate_pixel() { out[0] = raster[0]; }\n";
        assert!(matches!(
            KernelInfo::new(&source(code)),
            Err(Error::BindingMismatch {
                location: (0, 3),
                ..
            })
        ));
    }

    #[test]
    fn kernel_without_raster_is_rejected() {
        let code = "@group(0) @binding(2) var<storage, read> values: array<f32>;\n\
                    var<private> sink: f32;\n\
                    @compute @workgroup_size(1)\n\
                    fn generate_pixel() { sink = values[0]; }\n";
        assert!(matches!(
            KernelInfo::new(&source(code)),
            Err(Error::MissingRaster { .. })
        ));
    }

    #[test]
    fn syntax_errors_carry_the_kernel_name() {
        let err = KernelInfo::new(&source("fn generate_pixel( {")).unwrap_err();
        assert!(matches!(err, Error::Parse { ref name, .. } if name == "test"));
    }
}
