use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use image::{DynamicImage, Rgba, RgbaImage};
use screenfx::{
    BackendChoice, CameraTargets, CpuBackend, EffectKind, Entity, FrameReport, Host,
    RenderBackend, SessionConfig, StageOutcome, WgpuBackend,
};

#[derive(Parser)]
#[command(name = "screenfx")]
#[command(about = "Run a screen-space effect chain over a procedural scene")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a session and write the final frame as a PNG
    Render {
        /// Session file (JSON); defaults to a bare scene with no effects
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Render with the wgpu backend instead of the CPU one
        #[arg(long)]
        gpu: bool,

        /// Output image, overriding the session's
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print every effect's attribute schema as JSON
    Schema,
}

/// Backends the CLI can drive, including resolution changes.
trait SessionBackend: RenderBackend {
    fn resize(&mut self, width: u32, height: u32);
}

impl SessionBackend for CpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        CpuBackend::resize(self, width, height);
    }
}

impl SessionBackend for WgpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        WgpuBackend::resize(self, width, height);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Render { config, gpu, out } => {
            let mut session = match config {
                Some(path) => SessionConfig::load(path)?,
                None => SessionConfig::default(),
            };
            if gpu {
                session.backend = BackendChoice::Gpu;
            }
            if let Some(out) = out {
                session.output = out;
            }
            render(&session)
        }
        Command::Schema => {
            let schema: serde_json::Map<String, serde_json::Value> = EffectKind::ALL
                .iter()
                .map(|kind| Ok((kind.name().to_string(), serde_json::to_value(kind.schema())?)))
                .collect::<Result<_, serde_json::Error>>()?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

fn render(session: &SessionConfig) -> Result<(), Box<dyn Error>> {
    let (width, height) = session.resolution_at(0);
    match session.backend {
        BackendChoice::Cpu => run(CpuBackend::new(width, height), session),
        BackendChoice::Gpu => run(WgpuBackend::new(width, height)?, session),
    }
}

fn run<B: SessionBackend>(mut backend: B, session: &SessionConfig) -> Result<(), Box<dyn Error>> {
    let targets = scene_targets(&mut backend, false)?;
    let mut host = Host::new(backend).with_assets(screenfx::AssetLoader::new(&session.asset_root));
    let camera = host.spawn_camera(session.camera.transform(), targets);

    for effect in &session.effects {
        let attributes = effect
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let script = host.attach_script(camera, effect.kind, attributes)?;
        if !effect.enabled {
            host.set_enabled(script, false)?;
        }
    }
    if host.camera_wants_depth(camera)? {
        let size = host.backend().resolution();
        rebuild_targets(&mut host, camera, size)?;
    }

    for frame in 0..session.frames.max(1) {
        let size = session.resolution_at(frame);
        if size != host.backend().resolution() {
            log::info!("frame {frame}: resizing to {}x{}", size.0, size.1);
            rebuild_targets(&mut host, camera, size)?;
        }
        for (camera, report) in host.render_frame() {
            log_report(frame, camera, &report);
        }
    }

    let pixels = host.read_display(camera)?;
    let image = DynamicImage::ImageRgba32F(pixels).to_rgba8();
    image.save(&session.output)?;
    log::info!("wrote {}", session.output.display());
    Ok(())
}

/// Replaces the camera's scene targets at `width` x `height`, with a depth
/// map only when one of its scripts asked for it.
fn rebuild_targets<B: SessionBackend>(
    host: &mut Host<B>,
    camera: Entity,
    (width, height): (u32, u32),
) -> Result<(), Box<dyn Error>> {
    let old = *host
        .world()
        .get::<&CameraTargets>(camera)
        .map_err(|e| format!("camera targets: {e}"))?;
    let depth = host.camera_wants_depth(camera)?;
    let backend = host.backend_mut();
    for id in [Some(old.color), old.depth, Some(old.display)].into_iter().flatten() {
        backend.release_texture(id);
    }
    backend.resize(width, height);
    let targets = scene_targets(backend, depth)?;
    host.set_camera_targets(camera, targets)?;
    Ok(())
}

fn log_report(frame: u32, camera: Entity, report: &FrameReport) {
    match report {
        FrameReport::Bypassed => log::info!("frame {frame} {camera:?}: no effects, scene presented"),
        FrameReport::Rendered { stages } => {
            for (i, (id, outcome)) in stages.iter().enumerate() {
                match outcome {
                    StageOutcome::Drawn => log::debug!("frame {frame} stage {i} {id:?}: drawn"),
                    StageOutcome::Skipped(err) => {
                        log::info!("frame {frame} stage {i} {id:?}: passed through ({err})")
                    }
                }
            }
        }
    }
}

/// Uploads the procedural scene at the backend's resolution, with its depth
/// map when `with_depth` is set.
fn scene_targets(backend: &mut dyn RenderBackend, with_depth: bool) -> Result<CameraTargets, Box<dyn Error>> {
    let (width, height) = backend.resolution();
    let (color, depth) = procedural_scene(width, height);
    let depth = match with_depth {
        true => Some(backend.upload_depth(width, height, &depth, "scene depth")?),
        false => None,
    };
    Ok(CameraTargets {
        color: backend.upload_color(&color, "scene color")?,
        depth,
        display: backend.create_target(width, height, "display")?,
    })
}

/// A sky gradient over a checkered ground plane with one red pillar.
///
/// Depth grows towards the horizon; sky pixels sit at the far plane.
fn procedural_scene(width: u32, height: u32) -> (RgbaImage, Vec<f32>) {
    const SKY_DEPTH: f32 = 1500.0;
    let horizon = height as f32 * 0.4;
    let mut color = RgbaImage::new(width, height);
    let mut depth = vec![SKY_DEPTH; (width * height) as usize];

    for (x, y, pixel) in color.enumerate_pixels_mut() {
        let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
        let index = (y * width + x) as usize;

        let pillar = fx > width as f32 * 0.6 && fx < width as f32 * 0.7 && fy > height as f32 * 0.2;
        if pillar && fy < height as f32 * 0.75 {
            let shade = 0.6 + 0.4 * (fx / width as f32 - 0.6) * 10.0;
            *pixel = Rgba([(200.0 * shade) as u8, 40, 30, 255]);
            depth[index] = 8.0;
        } else if fy < horizon {
            let t = fy / horizon;
            let lerp = |a: f32, b: f32| (a + (b - a) * t) as u8;
            *pixel = Rgba([lerp(70.0, 180.0), lerp(120.0, 210.0), lerp(200.0, 235.0), 255]);
        } else {
            let t = ((fy - horizon) / (height as f32 - horizon)).max(0.02);
            let d = 1.5 / t;
            let u = (fx / width as f32 - 0.5) * d * 2.0;
            let checker = (u.floor() as i32 + d.floor() as i32).rem_euclid(2) == 0;
            *pixel = if checker {
                Rgba([60, 140, 60, 255])
            } else {
                Rgba([110, 180, 90, 255])
            };
            depth[index] = d;
        }
    }
    (color, depth)
}
