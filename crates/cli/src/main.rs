use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use wildvision_core::alerts::alert_dispatcher::AlertDispatcher;
use wildvision_core::alerts::infrastructure::log_alert_sink::LogAlertSink;
use wildvision_core::capture::domain::camera_id::CameraId;
use wildvision_core::capture::domain::capture_device::CaptureRequest;
use wildvision_core::capture::frame_source::FrameSource;
use wildvision_core::capture::infrastructure::ffmpeg_capture::FfmpegCapture;
use wildvision_core::detection::domain::detection_set::{filter_by_species, summarize};
use wildvision_core::detection::domain::object_detector::ObjectDetector;
use wildvision_core::detection::infrastructure::box_renderer::BoxRenderer;
use wildvision_core::detection::infrastructure::model_handle::{ModelHandle, ModelOptions};
use wildvision_core::detection::infrastructure::model_resolver::{self, ModelSource};
use wildvision_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use wildvision_core::pipeline::detection_recorder::DetectionRecorder;
use wildvision_core::pipeline::inspect_image_use_case::InspectImageUseCase;
use wildvision_core::pipeline::live_session::{FrameObserver, LiveSession, LiveSessionConfig};
use wildvision_core::records::domain::detection_repository::DetectionRepository;
use wildvision_core::records::infrastructure::json_lines_detection_repository::JsonLinesDetectionRepository;
use wildvision_core::shared::constants::{IMAGE_EXTENSIONS, YOLO_MODEL_NAME};
use wildvision_core::shared::detection::Detection;
use wildvision_core::shared::frame::Frame;
use wildvision_core::shared::settings::Settings;
use wildvision_core::shared::species::Species;
use wildvision_core::verification::domain::verification_result::VerificationResult;
use wildvision_core::verification::infrastructure::jpeg_snapshot_store::JpegSnapshotStore;
use wildvision_core::verification::verifier::Verifier;

/// Wildlife detection with two-layer verification.
#[derive(Parser)]
#[command(name = "wildvision")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CommonArgs {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Detection model weights (.onnx). Looked up in the cache if omitted.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Download the weights from this URL when the cache has none.
    #[arg(long, global = true)]
    model_url: Option<String>,

    /// Run inference on the CPU only.
    #[arg(long, global = true)]
    cpu: bool,

    /// Directory for verified snapshots.
    #[arg(long, global = true)]
    snapshots: Option<PathBuf>,

    /// Detection record file (JSON lines).
    #[arg(long, global = true)]
    records: Option<PathBuf>,

    /// User the records belong to.
    #[arg(long, global = true, default_value = "local")]
    user: String,

    /// Layer 1 confidence threshold (0.0-1.0).
    #[arg(long, global = true)]
    layer1: Option<f64>,

    /// Layer 2 confidence threshold (0.0-1.0).
    #[arg(long, global = true)]
    layer2: Option<f64>,

    /// Alert recipient.
    #[arg(long, global = true)]
    recipient: Option<String>,

    /// Location reported in alerts.
    #[arg(long, global = true)]
    location: Option<String>,

    /// TTF font for box labels.
    #[arg(long, global = true)]
    font: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Watch a live camera or network stream.
    Watch {
        /// Device index (0, 1, ...) or stream URL.
        #[arg(long, default_value = "0")]
        camera: String,

        /// Confidence that triggers verification (0.0-1.0).
        #[arg(long)]
        auto_snapshot: Option<f64>,

        /// Run detection every Nth frame.
        #[arg(long)]
        every: Option<usize>,

        /// Apply the verification cooldown to local cameras as well.
        #[arg(long)]
        cooldown_all_sources: bool,

        /// Show frames without running detection.
        #[arg(long)]
        no_detection: bool,

        /// Only list these species in the status line (repeatable).
        #[arg(long = "species")]
        species: Vec<Species>,
    },
    /// Verify a single image.
    Inspect {
        /// Image file.
        input: PathBuf,

        /// Write the image with layer 2 boxes drawn to this path.
        #[arg(long)]
        annotated: Option<PathBuf>,
    },
    /// Show verified detection counts per species.
    Stats {
        /// Also list the most recent records.
        #[arg(long, default_value = "0")]
        recent: usize,

        /// Only count these species (repeatable).
        #[arg(long = "species")]
        species: Vec<Species>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    match cli.command {
        Command::Watch {
            camera,
            auto_snapshot,
            every,
            cooldown_all_sources,
            no_detection,
            species,
        } => {
            let mut settings = settings;
            if let Some(t) = auto_snapshot {
                settings.thresholds.auto_snapshot = t;
            }
            if let Some(n) = every {
                settings.capture.process_every_n_frames = n;
            }
            settings.capture.cooldown_all_sources |= cooldown_all_sources;
            settings.validate()?;
            run_watch(&settings, &cli.common, &camera, !no_detection, species)
        }
        Command::Inspect { input, annotated } => {
            run_inspect(&settings, &cli.common, &input, annotated.as_deref())
        }
        Command::Stats { recent, species } => run_stats(&settings, &cli.common.user, recent, &species),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let common = &cli.common;
    let mut settings = match common.config.as_ref() {
        Some(path) => Settings::load(path)?,
        None => match Settings::default_path() {
            Some(path) => Settings::load_or_default(&path)?,
            None => Settings::default(),
        },
    };

    if let Some(path) = &common.model {
        settings.model.path = Some(path.clone());
    }
    if let Some(url) = &common.model_url {
        settings.model.url = Some(url.clone());
    }
    if common.cpu {
        settings.model.platform_providers = false;
    }
    if let Some(dir) = &common.snapshots {
        settings.snapshots.directory = dir.clone();
    }
    if let Some(path) = &common.records {
        settings.records.path = path.clone();
    }
    if let Some(t) = common.layer1 {
        settings.thresholds.layer1 = t;
    }
    if let Some(t) = common.layer2 {
        settings.thresholds.layer2 = t;
    }
    if let Some(r) = &common.recipient {
        settings.alerts.recipient = r.clone();
    }
    if let Some(l) = &common.location {
        settings.alerts.location = l.clone();
    }
    settings.validate()?;
    Ok(settings)
}

/// Builds the shared detector. A model that cannot be resolved or loaded is
/// reported and detection degrades to "nothing found".
fn build_detector(settings: &Settings) -> Arc<dyn ObjectDetector> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let model_path = ModelSource::new(
        YOLO_MODEL_NAME,
        settings.model.url.as_deref(),
        settings.model.path.as_deref(),
    )
    .and_then(|source| model_resolver::resolve(&source, Some(Box::new(download_progress))));
    let model_path = match model_path {
        Ok(path) => path,
        Err(e) => {
            log::error!("Detection model unavailable: {e}");
            settings
                .model
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(YOLO_MODEL_NAME))
        }
    };

    let options = ModelOptions {
        inference_size: settings.model.inference_size,
        intra_threads: settings.model.intra_threads,
        platform_providers: settings.model.platform_providers,
    };
    let handle = Arc::new(ModelHandle::new(model_path, options));
    // Load up front so the first frame does not pay for it.
    if handle.preload().is_err() {
        log::warn!("Continuing without detection");
    }
    Arc::new(OnnxYoloDetector::new(handle))
}

fn build_renderer(common: &CommonArgs) -> Result<Arc<BoxRenderer>, Box<dyn std::error::Error>> {
    Ok(Arc::new(match &common.font {
        Some(path) => BoxRenderer::with_font_file(path)?,
        None => BoxRenderer::new(),
    }))
}

fn build_recorder(settings: &Settings, user: &str) -> DetectionRecorder {
    let records: Arc<dyn DetectionRepository> =
        Arc::new(JsonLinesDetectionRepository::new(&settings.records.path));
    let alerts = Arc::new(AlertDispatcher::new(
        Arc::new(LogAlertSink),
        Duration::from_secs(settings.alerts.cooldown_secs),
    ));
    DetectionRecorder::new(
        records,
        alerts,
        user,
        settings.alerts.recipient.clone(),
        settings.alerts.location.clone(),
    )
}

fn build_verifier(settings: &Settings, detector: Arc<dyn ObjectDetector>) -> Arc<Verifier> {
    let store = JpegSnapshotStore::new(&settings.snapshots.directory)
        .with_quality(settings.snapshots.jpeg_quality);
    Arc::new(Verifier::new(detector, Arc::new(store), settings.thresholds))
}

fn run_watch(
    settings: &Settings,
    common: &CommonArgs,
    camera: &str,
    enable_detection: bool,
    species: Vec<Species>,
) -> Result<(), Box<dyn std::error::Error>> {
    let camera: CameraId = camera.parse()?;
    let detector = build_detector(settings);
    let verifier = build_verifier(settings, detector.clone());
    let recorder = build_recorder(settings, &common.user);

    let request = CaptureRequest {
        width: settings.capture.width,
        height: settings.capture.height,
        fps: settings.capture.fps,
        read_timeout: Duration::from_secs(settings.capture.read_timeout_secs),
    };
    let source = FrameSource::new(camera, request, Box::new(FfmpegCapture::new()), detector)
        .with_renderer(build_renderer(common)?);

    let config = LiveSessionConfig {
        enable_detection,
        ..LiveSessionConfig::from_settings(&settings.capture)
    };
    let mut session = LiveSession::new(source, verifier, recorder, config);

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;
    log::info!("Watching, press Ctrl-C to stop");

    let mut observer = ConsoleObserver {
        frames: 0,
        only: species.into_iter().collect(),
    };
    let summary = session.execute(&running, &mut observer)?;
    eprintln!();
    log::info!(
        "Frames: {} read, {} processed; verification: {} attempts, {} verified, {} rejected; {} records, {} alerts",
        summary.frames_read,
        summary.frames_processed,
        summary.verification_attempts,
        summary.verified,
        summary.rejected,
        summary.records_saved,
        summary.alerts_queued
    );
    Ok(())
}

fn run_inspect(
    settings: &Settings,
    common: &CommonArgs,
    input: &Path,
    annotated: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !input.exists() {
        return Err(format!("Input file not found: {}", input.display()).into());
    }
    if !is_image(input) {
        return Err(format!("Not a supported image: {}", input.display()).into());
    }

    let detector = build_detector(settings);
    let verifier = build_verifier(settings, detector);
    let recorder = build_recorder(settings, &common.user);
    let use_case = InspectImageUseCase::new(verifier, recorder, build_renderer(common)?);

    let report = use_case.execute(input, annotated)?;
    let result = &report.result;
    match (result.best_detection(), result.rejection_reason()) {
        (Some(best), _) => {
            log::info!(
                "{} {} verified (L1 {:.1}%, L2 {:.1}%)",
                best.species.emoji(),
                best.species,
                best.confidence_layer1 * 100.0,
                best.confidence_layer2 * 100.0
            );
            if let Some(path) = result.snapshot_path() {
                log::info!("Snapshot: {}", path.display());
            }
            log::info!("{} detection(s) saved", report.recording.records_saved);
        }
        (None, Some(reason)) => log::info!("Not verified: {reason}"),
        (None, None) => {}
    }
    if let (true, Some(path)) = (result.is_verified(), annotated) {
        log::info!("Annotated image written to {}", path.display());
    }
    Ok(())
}

fn run_stats(
    settings: &Settings,
    user: &str,
    recent: usize,
    species: &[Species],
) -> Result<(), Box<dyn std::error::Error>> {
    let wanted = |name: &str| species.is_empty() || species.iter().any(|s| s.name() == name);
    let repo = JsonLinesDetectionRepository::new(&settings.records.path);
    let mut counts: Vec<_> = repo
        .species_counts(user)
        .into_iter()
        .filter(|(name, _)| wanted(name))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let today = repo
        .detections_today(user)
        .into_iter()
        .filter(|r| wanted(&r.record.species))
        .count();
    println!("Verified detections for {user}: {} ({today} today)", repo.total_verified(user));
    for (name, count) in counts {
        println!("  {name:<10} {count}");
    }
    if recent > 0 {
        println!("Recent:");
        for r in repo.recent(user, recent).into_iter().filter(|r| wanted(&r.record.species)) {
            let d = &r.record;
            println!(
                "  #{:<4} {} {:<10} L1 {:>5.1}%  L2 {:>5.1}%  {}{}",
                r.id,
                d.timestamp.format("%Y-%m-%d %H:%M:%S"),
                d.species,
                d.confidence_layer1 * 100.0,
                d.confidence_layer2 * 100.0,
                d.source,
                if d.alert_sent { "  alerted" } else { "" }
            );
        }
    }
    Ok(())
}

/// Prints a status line with the frame rate and what is in view.
struct ConsoleObserver {
    frames: usize,
    /// Empty shows everything.
    only: HashSet<Species>,
}

impl FrameObserver for ConsoleObserver {
    fn on_frame(&mut self, _frame: &Frame, detections: &[Detection], fps: f64) {
        self.frames += 1;
        if detections.is_empty() && self.frames % 30 != 0 {
            return;
        }
        let shown;
        let detections = if self.only.is_empty() {
            detections
        } else {
            shown = filter_by_species(detections, &self.only);
            &shown[..]
        };
        let seen = summarize(detections)
            .into_iter()
            .map(|(label, n)| format!("{label} x{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        eprint!("\rFrame {:>6}  {fps:>5.1} fps  {seen:<40}", self.frames);
    }

    fn on_verification(&mut self, result: &VerificationResult) {
        eprintln!();
        match (result.best_detection(), result.rejection_reason()) {
            (Some(best), _) => eprintln!(
                "{} {} verified ({:.0}%)",
                best.species.emoji(),
                best.species,
                best.confidence_layer2 * 100.0
            ),
            (None, Some(reason)) => eprintln!("Verification rejected: {reason}"),
            (None, None) => {}
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading detection model... {pct}%");
    } else {
        eprint!("\rDownloading detection model... {downloaded} bytes");
    }
}
