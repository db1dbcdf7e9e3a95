// Copyright 2022 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simple helpers for managing wgpu state.

use std::future::Future;

use wgpu::{Adapter, AdapterInfo, Backends, Device, Instance, Limits, Queue};

use crate::{Error, Result};

/// Owns the wgpu instance that adapters are picked from.
pub struct ComputeContext {
    pub instance: Instance,
}

pub struct DeviceHandle {
    adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
}

impl ComputeContext {
    #[expect(
        clippy::new_without_default,
        reason = "Creating a wgpu Instance is something which should only be done rarely"
    )]
    pub fn new() -> Self {
        let instance = Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());
        Self { instance }
    }

    /// Every adapter the instance can see, in the order `--device` indexes them.
    pub fn adapters(&self) -> Vec<AdapterInfo> {
        self.instance
            .enumerate_adapters(Backends::all())
            .iter()
            .map(Adapter::get_info)
            .collect()
    }

    /// Creates a device on adapter `index`, or on the default adapter.
    ///
    /// The default honours the `WGPU_ADAPTER_NAME` and `WGPU_BACKEND`
    /// environment variables.
    pub async fn device(&self, index: Option<usize>) -> Result<DeviceHandle> {
        let adapter = match index {
            Some(index) => {
                let mut adapters = self.instance.enumerate_adapters(Backends::all());
                let available = adapters.len();
                if index >= available {
                    return Err(Error::DeviceNotFound { index, available });
                }
                adapters.swap_remove(index)
            }
            None => wgpu::util::initialize_adapter_from_env_or_default(&self.instance, None)
                .await
                .map_err(|_| Error::NoCompatibleDevice)?,
        };
        let info = adapter.get_info();
        log::info!(
            "Using adapter {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("heatmap"),
                required_features: wgpu::Features::empty(),
                required_limits: Limits::default(),
                ..Default::default()
            })
            .await?;
        Ok(DeviceHandle {
            adapter,
            device,
            queue,
        })
    }
}

impl DeviceHandle {
    /// Returns the adapter associated with the device.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }
}

struct NullWake;

impl std::task::Wake for NullWake {
    fn wake(self: std::sync::Arc<Self>) {}
}

/// Block on a future, polling the device as needed.
///
/// This will deadlock if the future is awaiting anything other than GPU progress.
#[cfg_attr(docsrs, doc(hidden))]
pub fn block_on_wgpu<F: Future>(device: &Device, fut: F) -> Result<F::Output> {
    let waker = std::task::Waker::from(std::sync::Arc::new(NullWake));
    let mut context = std::task::Context::from_waker(&waker);
    let mut fut = std::pin::pin!(fut);
    loop {
        match fut.as_mut().poll(&mut context) {
            std::task::Poll::Pending => {
                device.poll(wgpu::PollType::Wait)?;
            }
            std::task::Poll::Ready(item) => break Ok(item),
        }
    }
}
