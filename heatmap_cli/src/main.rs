// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Renders one zoom level of a heatmap tile pyramid.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use heatmap::kernels::{Defines, KernelSource};
use heatmap::util::ComputeContext;
use heatmap::{
    ColorMap, ComputeBackend, CpuBackend, Dataset, GeoBounds, Projection, RenderOptions,
    TileRenderer, WgpuBackend,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let bounds: GeoBounds = args
        .boundaries
        .parse()
        .with_context(|| format!("Invalid --boundaries `{}`", args.boundaries))?;
    let colormap = ColorMap::by_name(&args.colormap)?;
    let projection = Projection::new(&args.projection)?;
    let defines = Defines::parse(&args.define).context("Invalid --define")?;
    let source = KernelSource::load(&args.kernel, &defines)
        .with_context(|| format!("Couldn't load kernel `{}`", args.kernel))?;
    log::info!("Kernel `{}` from {}", source.name, source.path.display());
    let dataset = Dataset::from_path(&args.input)?;

    let options = RenderOptions {
        zoom: args.zoom,
        bounds,
        outdir: args.outdir,
        cache_dir: args.cache_dir,
        colormap,
        prefilter: args.prefilter,
    };
    let range = options.validate()?;
    log::debug!("Tile range {range:?}");

    if args.use_cpu {
        run(CpuBackend::new(), &source, &dataset, &projection, &options)
    } else {
        let context = ComputeContext::new();
        let handle = pollster::block_on(context.device(args.device))
            .context("Couldn't create a GPU device, try --use-cpu")?;
        run(
            WgpuBackend::new(handle),
            &source,
            &dataset,
            &projection,
            &options,
        )
    }
}

fn run<B: ComputeBackend>(
    backend: B,
    source: &KernelSource,
    dataset: &Dataset,
    projection: &Projection,
    options: &RenderOptions,
) -> Result<()> {
    let mut renderer = TileRenderer::new(backend, source)
        .with_context(|| format!("Couldn't compile kernel `{}`", source.name))?;
    let summary = renderer
        .render(dataset, projection, options)
        .context("Rendering failed")?;
    log::info!(
        "Wrote {} tiles to {}",
        summary.rendered + summary.blank,
        options.outdir.display()
    );
    Ok(())
}

#[derive(Parser, Debug)]
#[command(about, long_about = None, bin_name = "heatmap")]
struct Args {
    /// Zoom level of the pyramid to render
    #[arg(long, short, default_value_t = 12)]
    zoom: u8,
    /// Kernel name, looked up along the kernel search path, or a path to a WGSL file
    #[arg(long, short)]
    kernel: String,
    /// Root of the tile pyramid
    #[arg(long, short, default_value = "./cache")]
    outdir: PathBuf,
    /// Where tile transforms are cached, defaults to the output directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Dataset to render
    #[arg(long, short, default_value = "./input.json")]
    input: PathBuf,
    /// Kernel preprocessor define, `NAME` or `NAME=VALUE`
    #[arg(long = "define", short = 'D', value_name = "DEFINE")]
    define: Vec<String>,
    /// Palette, `heat` or `grayscale`
    #[arg(long, short = 'm', default_value = "heat")]
    colormap: String,
    /// Region to render as `lat,lng,lat,lng`
    #[arg(long, short, allow_hyphen_values = true)]
    boundaries: String,
    /// Index of the GPU adapter to use
    #[arg(long, short)]
    device: Option<usize>,
    /// Planar projection, a proj4 string or `EPSG:NNNN`
    #[arg(long, short, default_value = Projection::DEFAULT)]
    projection: String,
    /// Distance in meters around a tile within which points still affect it
    #[arg(long, short = 'f', default_value_t = f64::INFINITY)]
    prefilter: f64,
    /// Run the kernel on the CPU instead of a GPU
    #[arg(long)]
    use_cpu: bool,
}
