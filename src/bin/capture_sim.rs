//! capture_sim - synthetic end-to-end run of the capture engine
//!
//! Moves a set of pseudo-random person tracks across a synthetic RGB frame,
//! feeds them to `CaptureEngine` tick by tick and prints a JSON summary.

use anyhow::{anyhow, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::Serialize;

use target_capture::{
    BBox, CaptureConfig, CaptureEngine, CaptureError, CaptureMode, EngineSettings, Frame,
    ObjectClass, ObjectMetadata, Observation, PersonTarget, PixelFormat, TargetKind,
};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 360;
const DEFAULT_SEED: u64 = 7;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Capture mode (auto, fast, cycle).
    #[arg(long, default_value = "auto")]
    mode: String,
    /// Number of ticks (frames) to simulate.
    #[arg(long, default_value_t = 300)]
    ticks: u64,
    /// Number of concurrent synthetic targets.
    #[arg(long, default_value_t = 6)]
    targets: usize,
    #[arg(long, default_value_t = 10)]
    pool_size: usize,
    /// Crop memory limit in bytes.
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    memory_limit: usize,
    /// Deterministic seed for target motion.
    #[arg(long)]
    seed: Option<u64>,
    /// Take settings from CAPTURE_CONFIG / CAPTURE_* instead of the flags above.
    #[arg(long, env = "CAPTURE_SIM_ENV")]
    env: bool,
}

/// A person walking across the frame, occasionally occluded.
struct Walker {
    track_id: u64,
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
    width: f32,
    height: f32,
    visible: bool,
    ticks_left: u64,
}

impl Walker {
    fn spawn(rng: &mut StdRng, track_id: u64) -> Self {
        let width = rng.gen_range(24.0..96.0);
        Self {
            track_id,
            x: rng.gen_range(0.0..FRAME_WIDTH as f32 - width),
            y: rng.gen_range(0.0..FRAME_HEIGHT as f32 / 3.0),
            dx: rng.gen_range(-3.0..3.0),
            dy: rng.gen_range(-1.0..1.0),
            width,
            height: width * rng.gen_range(1.8..2.8),
            visible: true,
            ticks_left: rng.gen_range(40..240),
        }
    }

    fn step(&mut self, rng: &mut StdRng) {
        let max_x = (FRAME_WIDTH as f32 - self.width).max(0.0);
        let max_y = (FRAME_HEIGHT as f32 - self.height).max(0.0);
        self.x = (self.x + self.dx).clamp(0.0, max_x);
        self.y = (self.y + self.dy).clamp(0.0, max_y);
        // Walking towards the camera.
        self.width *= 1.004;
        self.height *= 1.004;
        self.visible = rng.gen_bool(0.9);
        self.ticks_left = self.ticks_left.saturating_sub(1);
    }

    fn bbox(&self) -> BBox {
        BBox::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

#[derive(Serialize, Debug)]
struct Emission {
    tick: u64,
    slot: usize,
    track_id: u64,
    quality: f32,
    output_count: u32,
    crop_bytes: usize,
}

#[derive(Serialize, Debug, Default)]
struct Summary {
    mode: String,
    ticks: u64,
    tracks_spawned: u64,
    emissions: Vec<Emission>,
    exported_on_reset: usize,
    dropped_tracks: usize,
    rejected_writes: usize,
    errors_by_code: std::collections::BTreeMap<&'static str, usize>,
    peak_mem_used: usize,
    memory_limit: usize,
}

fn settings_from_args(args: &Args) -> Result<EngineSettings> {
    if args.env {
        return EngineSettings::load();
    }
    let mode: CaptureMode = args
        .mode
        .parse()
        .map_err(|e: CaptureError| anyhow!("--mode: {}", e))?;
    let kind = PersonTarget::default();
    let settings = EngineSettings {
        pool_size: args.pool_size,
        memory_limit: args.memory_limit,
        mode,
        capture: CaptureConfig {
            thr_quality: 0.6,
            thr_quality_high: 0.95,
            miss_time_limit: 10,
            fast_interval: 25,
            cycle_interval: 50,
            ..CaptureConfig::for_kind(&kind)
        },
        ..EngineSettings::default()
    };
    settings.validate()?;
    Ok(settings)
}

fn noise_frame(rng: &mut StdRng) -> Result<Frame> {
    let mut data = vec![0u8; PixelFormat::Rgb24.image_len(FRAME_WIDTH, FRAME_HEIGHT)?];
    rng.fill_bytes(&mut data);
    Frame::new(data, FRAME_WIDTH, FRAME_HEIGHT, PixelFormat::Rgb24)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = settings_from_args(&args)?;
    let kind = PersonTarget::default();
    let mut engine = CaptureEngine::with_pixel_cropper(kind.clone(), &settings)?;

    let mut rng = StdRng::seed_from_u64(args.seed.unwrap_or(DEFAULT_SEED));
    let frame = noise_frame(&mut rng)?;

    let mut next_track = 1u64;
    let mut walkers: Vec<Walker> = Vec::with_capacity(args.targets);
    let mut summary = Summary {
        mode: format!("{:?}", engine.mode()).to_lowercase(),
        ticks: args.ticks,
        memory_limit: engine.memory_limit(),
        ..Summary::default()
    };

    for _ in 0..args.ticks {
        walkers.retain(|w| w.ticks_left > 0);
        while walkers.len() < args.targets {
            walkers.push(Walker::spawn(&mut rng, next_track));
            next_track += 1;
        }

        let observations: Vec<Observation<ObjectMetadata>> = walkers
            .iter()
            .filter(|w| w.visible)
            .map(|w| {
                let metadata = ObjectMetadata {
                    class: ObjectClass::Person,
                    confidence: 0.8,
                };
                Observation::assess(&kind, w.track_id, w.bbox(), metadata)
            })
            .collect();

        let result = engine.run_tick(&observations, &frame)?;
        summary.dropped_tracks += result.dropped.len();
        summary.rejected_writes += result.rejected.len();
        for err in result.dropped.iter().chain(&result.rejected) {
            if !err.is_recoverable() {
                return Err(anyhow!("tick {}: {}", result.tick, err));
            }
            *summary.errors_by_code.entry(err.code()).or_default() += 1;
        }
        for index in result.ready {
            if let Some(target) = engine.consume(index) {
                log::info!(
                    "tick {}: {} track {} ready from slot {} (quality {:.2}, output #{})",
                    result.tick,
                    kind.name(),
                    target.track_id,
                    target.slot,
                    target.quality,
                    target.output_count
                );
                summary.emissions.push(Emission {
                    tick: result.tick,
                    slot: target.slot,
                    track_id: target.track_id,
                    quality: target.quality,
                    output_count: target.output_count,
                    crop_bytes: target.crop.byte_len(),
                });
            }
        }
        summary.peak_mem_used = summary.peak_mem_used.max(engine.mem_used());

        for walker in walkers.iter_mut() {
            walker.step(&mut rng);
        }
    }

    summary.exported_on_reset = engine.reset().len();
    summary.tracks_spawned = next_track - 1;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
