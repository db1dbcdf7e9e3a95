// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::borrow::Cow;

use heatmap_kernels::{BindType, KERNEL_LAYOUT, KernelInfo, KernelParams, KernelSource};
use wgpu::{
    BindGroupLayout, Buffer, BufferUsages, CommandEncoderDescriptor, ComputePassDescriptor,
    ComputePipeline, Device, PipelineCompilationOptions, Queue,
};

use crate::backend::{TILE_PIXELS, check_capacity, narrow};
use crate::util::{DeviceHandle, block_on_wgpu};
use crate::{ComputeBackend, Error, Result, TILE_SIZE, TileRaster, TileTransform};

/// Runs kernels on a GPU through wgpu.
pub struct WgpuBackend {
    device: Device,
    queue: Queue,
    pool: Option<DispatchBuffers>,
}

/// A kernel compiled into a compute pipeline.
pub struct WgpuProgram {
    label: String,
    pipeline: ComputePipeline,
    bind_group_layout: BindGroupLayout,
    /// Workgroups along x and y needed to cover a tile.
    workgroups: (u32, u32),
}

impl WgpuProgram {
    pub fn workgroups(&self) -> (u32, u32) {
        self.workgroups
    }
}

/// Device buffers sized once for the largest selection and reused for every tile.
struct DispatchBuffers {
    capacity: usize,
    params: Buffer,
    points: Buffer,
    values: Buffer,
    raster: Buffer,
    readback: Buffer,
}

const RASTER_BYTES: u64 = (TILE_PIXELS * size_of::<u32>()) as u64;

impl WgpuBackend {
    pub fn new(handle: DeviceHandle) -> Self {
        Self::from_parts(handle.device, handle.queue)
    }

    pub fn from_parts(device: Device, queue: Queue) -> Self {
        Self {
            device,
            queue,
            pool: None,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn create_bind_group_layout_entries(
        layout: impl Iterator<Item = (BindType, wgpu::ShaderStages)>,
    ) -> Vec<wgpu::BindGroupLayoutEntry> {
        layout
            .enumerate()
            .map(|(i, (bind_type, visibility))| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: match bind_type {
                        BindType::Uniform => wgpu::BufferBindingType::Uniform,
                        BindType::Buffer | BindType::BufReadOnly => {
                            wgpu::BufferBindingType::Storage {
                                read_only: !bind_type.is_mutable(),
                            }
                        }
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect::<Vec<_>>()
    }

    /// Runs `f` inside a validation error scope and surfaces anything it caught.
    fn scoped<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = f(self);
        let error = pollster::block_on(self.device.pop_error_scope());
        if let Some(error) = error {
            return Err(Error::WgpuErrorFromScope(error.to_string()));
        }
        result
    }

    fn read_raster(&self, readback: &Buffer, raster: &mut TileRaster) -> Result<()> {
        let buf_slice = readback.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buf_slice.map_async(wgpu::MapMode::Read, move |v| {
            // The receiver only goes away if the wait below failed.
            let _ = sender.send(v);
        });
        block_on_wgpu(&self.device, receiver.receive())?.ok_or(Error::ReadbackChannelClosed)??;
        {
            let mapped = buf_slice.get_mapped_range();
            let words: &[u32] = bytemuck::cast_slice(&mapped);
            for (pixel, &word) in raster.pixels_mut().iter_mut().zip(words) {
                *pixel = narrow(word);
            }
        }
        readback.unmap();
        Ok(())
    }
}

impl ComputeBackend for WgpuBackend {
    type Program = WgpuProgram;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn compile(&mut self, source: &KernelSource) -> Result<WgpuProgram> {
        let info = KernelInfo::new(source)?;
        let [wg_x, wg_y, _] = info.workgroup_size;
        let workgroups = (TILE_SIZE.div_ceil(wg_x), TILE_SIZE.div_ceil(wg_y));
        let label = source.name.clone();
        self.scoped(|this| {
            let device = &this.device;
            let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&source.code)),
            });
            let entries = Self::create_bind_group_layout_entries(
                KERNEL_LAYOUT
                    .iter()
                    .map(|b| (*b, wgpu::ShaderStages::COMPUTE)),
            );
            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: None,
                    entries: &entries,
                });
            let compute_pipeline_layout =
                device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: None,
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&label),
                layout: Some(&compute_pipeline_layout),
                module: &shader_module,
                entry_point: Some(heatmap_kernels::ENTRY_POINT),
                compilation_options: PipelineCompilationOptions::default(),
                cache: None,
            });
            log::debug!("Compiled kernel `{label}`, {workgroups:?} workgroups per tile");
            Ok(WgpuProgram {
                label: label.clone(),
                pipeline,
                bind_group_layout,
                workgroups,
            })
        })
    }

    fn reserve(&mut self, capacity: usize) -> Result<()> {
        // Zero sized storage bindings aren't allowed.
        let slots = capacity.max(1) as u64;
        let storage = BufferUsages::STORAGE | BufferUsages::COPY_DST;
        // Oversized pools fail validation and are reported from the scope.
        let pool = self.scoped(|engine| {
            let create = |label: &str, size: u64, usage: BufferUsages| {
                engine.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size,
                    usage,
                    mapped_at_creation: false,
                })
            };
            Ok(DispatchBuffers {
                capacity,
                params: create(
                    "params",
                    size_of::<KernelParams>() as u64,
                    BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                ),
                points: create(
                    "points",
                    slots.saturating_mul(size_of::<[f32; 2]>() as u64),
                    storage,
                ),
                values: create(
                    "values",
                    slots.saturating_mul(size_of::<f32>() as u64),
                    storage,
                ),
                raster: create("raster", RASTER_BYTES, storage | BufferUsages::COPY_SRC),
                readback: create(
                    "readback",
                    RASTER_BYTES,
                    BufferUsages::MAP_READ | BufferUsages::COPY_DST,
                ),
            })
        })?;
        log::debug!("Reserved dispatch pool for {capacity} points");
        self.pool = Some(pool);
        Ok(())
    }

    fn dispatch(
        &mut self,
        program: &WgpuProgram,
        transform: &TileTransform,
        points: &[[f32; 2]],
        values: &[f32],
        raster: &mut TileRaster,
    ) -> Result<()> {
        let pool = self.pool.as_ref().ok_or(Error::PoolNotReserved)?;
        check_capacity(points.len(), Some(pool.capacity))?;
        self.scoped(|this| {
            let params = transform.to_params(points.len() as u32);
            this.queue
                .write_buffer(&pool.params, 0, bytemuck::bytes_of(&params));
            if !points.is_empty() {
                this.queue
                    .write_buffer(&pool.points, 0, bytemuck::cast_slice(points));
                this.queue
                    .write_buffer(&pool.values, 0, bytemuck::cast_slice(values));
            }
            let bind_group = this.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: None,
                layout: &program.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: pool.params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: pool.points.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: pool.values.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: pool.raster.as_entire_binding(),
                    },
                ],
            });
            let mut encoder = this
                .device
                .create_command_encoder(&CommandEncoderDescriptor {
                    label: Some(&program.label),
                });
            encoder.clear_buffer(&pool.raster, 0, None);
            {
                let mut cpass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
                cpass.set_pipeline(&program.pipeline);
                cpass.set_bind_group(0, &bind_group, &[]);
                let (x, y) = program.workgroups;
                cpass.dispatch_workgroups(x, y, 1);
            }
            encoder.copy_buffer_to_buffer(&pool.raster, 0, &pool.readback, 0, RASTER_BYTES);
            this.queue.submit(Some(encoder.finish()));
            this.read_raster(&pool.readback, raster)
        })
    }
}
