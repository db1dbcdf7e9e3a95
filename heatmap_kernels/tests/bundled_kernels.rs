// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loads the bundled kernels the way the renderer does.

use heatmap_kernels::{Defines, KernelInfo, KernelSource, cpu};

#[test]
fn bundled_kernels_resolve_by_name() {
    let defines = Defines::parse(["POWER=3.0", "RADIUS=500.0"]).unwrap();
    for name in ["idw", "density"] {
        let source = KernelSource::load(name, &defines).unwrap();
        assert!(source.path.ends_with(format!("{name}.wgsl")));
        assert!(source.code.contains("fn generate_pixel"));
        // Host constants come first, shared code is inlined.
        assert!(source.code.starts_with("const TILE_SIZE: u32 = 256u;"));
        assert!(source.code.contains("fn value_to_index"));
        assert!(!source.code.contains("#import"));
        KernelInfo::new(&source).unwrap();
        assert!(cpu::lookup(&source.name).is_some());
    }
}

#[test]
fn value_defines_replace_kernel_defaults() {
    let plain = KernelSource::load("idw", &Defines::default()).unwrap();
    assert!(plain.code.contains("const POWER: f32 = 2.0;"));
    let tuned = KernelSource::load("idw", &Defines::parse(["POWER=4.0"]).unwrap()).unwrap();
    assert!(!tuned.code.contains("const POWER: f32 = 2.0;"));
    assert!(tuned.code.contains("const POWER = 4.0;"));
    KernelInfo::new(&tuned).unwrap();
}
