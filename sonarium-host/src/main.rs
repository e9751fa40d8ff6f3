mod tour;

use std::fs::File;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use sonarium_audio::{AudioGraph, AudioSink, RealtimeOutput};
use sonarium_core::{ClientError, Config, ConnectionState, DebugEntry, SoundscapeEngine, SoundscapeObserver};
use sonarium_net::TcpConnector;
use sonarium_types::{PlaybackState, Vec3};

use tour::AnchorTour;

const FRAME: Duration = Duration::from_micros(16_667);

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sonarium")
        .join("sonarium.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path).unwrap_or_else(|_| {
        File::create("/tmp/sonarium.log").expect("Cannot create log file")
    });

    WriteLogger::init(log_level, simplelog::Config::default(), log_file)
        .expect("Failed to initialize logger");

    log::info!("sonarium starting (log level: {:?})", log_level);
}

struct Args {
    verbose: bool,
    config: Option<PathBuf>,
    connect: Option<String>,
    seconds: Option<f64>,
    volume: Option<f32>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let value_of = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    };
    Args {
        verbose: args.iter().any(|a| a == "--verbose" || a == "-v"),
        config: value_of("--config").map(PathBuf::from),
        connect: value_of("--connect"),
        seconds: value_of("--seconds").and_then(|s| s.parse().ok()),
        volume: value_of("--volume").and_then(|s| s.parse().ok()),
    }
}

/// Prints status changes to the terminal; everything else goes to the log.
struct ConsoleObserver;

impl SoundscapeObserver for ConsoleObserver {
    fn on_playback_state_change(&mut self, state: PlaybackState) {
        println!("[playback] {}", state);
    }

    fn on_status_update(&mut self, status: &str) {
        println!("[status] {}", status);
    }

    fn on_error(&mut self, error: &ClientError) {
        if error.is_fatal() {
            eprintln!("[fatal] {}", error);
        } else {
            eprintln!("[warning] {}", error);
        }
    }

    fn on_filtered_prompt(&mut self, text: &str, reason: &str) {
        println!("[filtered] \"{}\" ({})", text, reason);
    }

    fn on_position_changed(&mut self, new: Vec3, _old: Vec3) {
        log::debug!(target: "host", "listener at ({:.1}, {:.1}, {:.1})", new.x, new.y, new.z);
    }

    fn on_debug_update(&mut self, entries: &[DebugEntry]) {
        for entry in entries {
            log::debug!(
                target: "host",
                "  {:<12} w={:.3} d={:.1}",
                entry.id.as_str(), entry.weight, entry.distance
            );
        }
    }

    fn wants_debug(&self) -> bool {
        log::log_enabled!(target: "host", log::Level::Debug)
    }
}

fn main() {
    let args = parse_args();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => match Config::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
        None => Config::load(),
    };

    let anchors = config.anchors();
    if anchors.is_empty() {
        eprintln!("No anchors configured; nothing to listen to.");
        std::process::exit(1);
    }
    let endpoint = args.connect.clone().unwrap_or_else(|| config.endpoint());
    let duration = args.seconds.map(Duration::from_secs_f64);
    let tour = AnchorTour::around(&anchors);

    let engine_config = config.engine_config();
    let connector = Box::new(TcpConnector::new(endpoint.clone()));
    let start = Instant::now();

    match RealtimeOutput::open() {
        Ok(output) => {
            // Chunks keep the stream format from config; the graph resamples to the device.
            if let Some(volume) = args.volume {
                output.set_master_gain(volume.clamp(0.0, 1.0));
            }
            println!("Output: {} ({} Hz)", output.device_name(), output.sample_rate());
            let engine = SoundscapeEngine::new(
                engine_config,
                anchors,
                connector,
                output,
                Box::new(ConsoleObserver),
                tour.position_at(0.0),
                Duration::ZERO,
            );
            run(engine, &tour, &endpoint, start, duration, |_| {});
        }
        Err(e) => {
            // Keep the session logic running against a silent graph.
            log::warn!(target: "host", "no audio output ({}); rendering silently", e);
            eprintln!("No audio output available ({}); continuing without sound.", e);
            let audio = engine_config.client.audio;
            let graph = AudioGraph::new(audio.sample_rate, audio.channels);
            let engine = SoundscapeEngine::new(
                engine_config,
                anchors,
                connector,
                graph,
                Box::new(ConsoleObserver),
                tour.position_at(0.0),
                Duration::ZERO,
            );
            run(engine, &tour, &endpoint, start, duration, |graph: &mut AudioGraph| {
                graph.advance(FRAME.as_secs_f64())
            });
        }
    }
}

/// Drive the engine at 60 Hz until the time budget runs out.
/// `render` advances sinks that have no device clock of their own.
fn run<S, F>(
    mut engine: SoundscapeEngine<S>,
    tour: &AnchorTour,
    endpoint: &str,
    start: Instant,
    duration: Option<Duration>,
    mut render: F,
) where
    S: AudioSink,
    F: FnMut(&mut S),
{
    println!("Connecting to {} ...", endpoint);
    if let Err(e) = engine.connect() {
        eprintln!("Could not connect to {}: {}", endpoint, e);
        std::process::exit(1);
    }
    if let Err(e) = engine.play() {
        log::warn!(target: "host", "play request failed: {}", e);
    }

    loop {
        let now = start.elapsed();
        if duration.is_some_and(|d| now >= d) {
            break;
        }
        render(engine.client_mut().sink_mut());
        engine.tick(tour.position_at(now.as_secs_f32()), now);
        if engine.client().state() == ConnectionState::Closed {
            log::error!(target: "host", "session closed for good; exiting");
            break;
        }
        std::thread::sleep(FRAME);
    }

    let underruns = engine.client().underrun_count();
    println!("Stopping ({} underruns).", underruns);
    log::info!(target: "host", "session ended with {} underruns", underruns);
    if let Err(e) = engine.stop() {
        log::warn!(target: "host", "stop failed: {}", e);
    }
    engine.dispose();
}
