use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use clray::{
    renderer::{Image, Integrator, PixelFilter, RenderSettings},
    scene::{test_scenes, CompiledScene, Scene},
    ComputeBackend,
};
use clray_cpu::HostBackend;
use tracing::info;

#[derive(Debug, clap::Parser)]
struct CommandLineArguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    #[command(about = "Render a builtin scene to PNG")]
    Render(RenderArgs),
    #[command(about = "List all builtin test scenes as JSON")]
    ListScenes,
    #[command(about = "Print the OpenCL source generated for a scene")]
    Source {
        #[arg(help = "Builtin scene name")]
        scene: String,
    },
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Backend {
    #[default]
    Host,
    Opencl,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Filter {
    Tent,
    Box,
    None,
}

#[derive(Debug, clap::Args)]
struct RenderArgs {
    #[arg(help = "Builtin scene name")]
    scene: String,

    #[arg(short, long, default_value = "output.png", help = "Output PNG path")]
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = Backend::Host, help = "Compute back-end")]
    backend: Backend,

    #[arg(short, long, help = "Samples per pixel")]
    spp: Option<u32>,
    #[arg(long, help = "Image width in pixels")]
    width: Option<u32>,
    #[arg(long, help = "Image height in pixels")]
    height: Option<u32>,
    #[arg(long, help = "Bounces before Russian roulette starts")]
    min_bounces: Option<u32>,
    #[arg(long, help = "Hard bounce limit")]
    max_bounces: Option<u32>,
    #[arg(long, value_enum, help = "Subpixel filter")]
    filter: Option<Filter>,
    #[arg(long, help = "Sampler seed")]
    seed: Option<u64>,

    #[arg(long, help = "Disable next-event estimation toward lights")]
    no_bidirectional: bool,
    #[arg(long, help = "Use pseudo-random first diffuse bounces")]
    no_quasirandom: bool,
    #[arg(long, help = "Reuse the first hit across samples (needs --filter none)")]
    cache_first_bounce: bool,

    #[arg(long, default_value_t = 1.0, help = "Linear scale applied before gamma")]
    exposure: f32,
    #[arg(long, help = "Write the output every this many samples")]
    checkpoint: Option<u32>,
}

impl RenderArgs {
    fn apply(&self, settings: &mut RenderSettings, scene: &mut Scene) {
        if let Some(spp) = self.spp {
            settings.samples_per_pixel = spp;
        }
        if let Some(min_bounces) = self.min_bounces {
            settings.min_bounces = min_bounces;
        }
        if let Some(max_bounces) = self.max_bounces {
            settings.max_bounces = max_bounces;
        }
        if let Some(filter) = self.filter {
            settings.pixel_filter = match filter {
                Filter::Tent => PixelFilter::Tent,
                Filter::Box => PixelFilter::Box,
                Filter::None => PixelFilter::None,
            };
        }
        if let Some(seed) = self.seed {
            settings.seed = seed;
        }
        settings.bidirectional &= !self.no_bidirectional;
        settings.quasirandom &= !self.no_quasirandom;
        settings.cache_first_bounce |= self.cache_first_bounce;

        scene.camera.width = self.width.unwrap_or(scene.camera.width);
        scene.camera.height = self.height.unwrap_or(scene.camera.height);
    }
}

fn load_scene(name: &str) -> anyhow::Result<(Scene, RenderSettings)> {
    let descriptor = test_scenes::find_test_scene(name)?;
    let scene = (descriptor.scene_func)().with_context(|| format!("failed to build scene {name}"))?;
    Ok((scene, (descriptor.settings_func)()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli_args = CommandLineArguments::parse();
    match cli_args.command {
        Command::ListScenes => {
            let scenes: Vec<&str> = test_scenes::all_test_scenes().iter().map(|s| s.name).collect();
            println!("{}", serde_json::to_string(&scenes)?);
        }
        Command::Source { scene } => {
            let (scene, _) = load_scene(&scene)?;
            let compiled = CompiledScene::compile(&scene).context("failed to compile scene")?;
            println!("{}", clray_cl::program_source(&compiled.program));
        }
        Command::Render(args) => render(&args)?,
    }
    Ok(())
}

fn render(args: &RenderArgs) -> anyhow::Result<()> {
    let (mut scene, mut settings) = load_scene(&args.scene)?;
    args.apply(&mut settings, &mut scene);
    let compiled = CompiledScene::compile(&scene).context("failed to compile scene")?;

    match args.backend {
        Backend::Host => {
            let mut backend = HostBackend::new();
            render_with(&mut backend, &compiled, &scene, settings, args)
        }
        Backend::Opencl => {
            #[cfg(feature = "opencl")]
            {
                let mut backend = clray_cl::OpenClBackend::new().context("failed to open an OpenCL device")?;
                render_with(&mut backend, &compiled, &scene, settings, args)
            }
            #[cfg(not(feature = "opencl"))]
            {
                bail!("OpenCL back-end not compiled (enable the 'opencl' feature)")
            }
        }
    }
}

fn render_with<B: ComputeBackend>(
    backend: &mut B,
    compiled: &CompiledScene,
    scene: &Scene,
    settings: RenderSettings,
    args: &RenderArgs,
) -> anyhow::Result<()> {
    let total = settings.samples_per_pixel;
    if total == 0 {
        bail!("nothing to render with 0 samples per pixel");
    }
    let batch = args.checkpoint.unwrap_or(total).clamp(1, total);

    let mut integrator = Integrator::new(backend, compiled, &scene.camera, settings).context("failed to set up the renderer")?;
    while integrator.samples() < total {
        let samples = batch.min(total - integrator.samples());
        let image = integrator.render(samples).context("render failed")?;
        save_png(&image, args.exposure, &args.output)?;
        info!("{}/{} samples, wrote {}", image.samples, total, args.output.display());
    }
    Ok(())
}

/// Writes the per-sample average, scaled by `exposure` and gamma corrected
fn save_png(image: &Image, exposure: f32, output_path: &Path) -> anyhow::Result<()> {
    let to_byte = |c: f32| ((c * exposure).max(0.0).powf(1.0 / 2.2) * 255.0).clamp(0.0, 255.0) as u8;
    let data: Vec<u8> = image.averaged().iter().flat_map(|v| [to_byte(v.0), to_byte(v.1), to_byte(v.2)]).collect();
    let buffer = image::RgbImage::from_raw(image.width, image.height, data)
        .context("image size does not match its pixel data")?;
    buffer.save(output_path).with_context(|| format!("failed to write {}", output_path.display()))?;
    Ok(())
}
