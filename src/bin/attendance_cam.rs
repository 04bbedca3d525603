//! attendance_cam - webcam object detection with named attendance snapshots
//!
//! Controls are read from stdin, one command per line:
//! - `v`: show/hide the raw video surface
//! - `d`: start/stop detecting
//! - `c`: capture the current frame (the next line is the name; empty declines)
//! - `p`: write the overlay canvas and video surface to the output directory
//! - `s`: print status
//! - `q`: quit (Ctrl-C works too)

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use attendance_cam::config::ConfigOverrides;
use attendance_cam::render::{encode_png, load_font};
use attendance_cam::ui::{Ui, UiMode};
use attendance_cam::{
    AppConfig, AttendanceDesk, BackendRegistry, CameraSource, CaptureOutcome, DirectorySink,
    ImageCanvas, PendingCapture, Runtime, RuntimeHandle,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file.
    #[arg(long, env = "ATTENDANCE_CONFIG")]
    config: Option<PathBuf>,
    /// Camera device path or stub://<name>.
    #[arg(long)]
    device: Option<String>,
    /// Detector backend: stub or tract.
    #[arg(long)]
    backend: Option<String>,
    /// ONNX model for the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Directory receiving attendance images.
    #[arg(long)]
    out: Option<PathBuf>,
    /// TrueType/OpenType font used for labels.
    #[arg(long)]
    font: Option<PathBuf>,
    /// Startup output: auto, plain or pretty.
    #[arg(long)]
    ui: Option<String>,
}

enum Input {
    Line(String),
    Eof,
    Interrupt,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = load_config(&args)?;
    let ui = Ui::new(UiMode::parse(args.ui.as_deref()), std::io::stderr().is_terminal());

    let stage = ui.stage("load detector");
    let backend = match BackendRegistry::from_settings(&cfg.detector) {
        Ok(registry) => {
            stage.done(cfg.detector.backend.as_str());
            registry.default_backend()
        }
        Err(err) => {
            drop(stage);
            log::error!("detector unavailable: {:#}", err);
            None
        }
    };

    let stage = ui.stage("open camera");
    let mut source = CameraSource::new(cfg.camera.clone())?;
    source.connect()?;
    let (width, height) = source.dimensions();
    stage.done(format!("{} {}x{}", cfg.camera.device, width, height));

    let mut canvas = ImageCanvas::new(width, height);
    if let Some(path) = &cfg.render.font_path {
        match load_font(path) {
            Ok(font) => canvas = canvas.with_font(font),
            Err(err) => log::warn!("{:#}", err),
        }
    }

    let runtime = Runtime::start(source, backend, canvas, cfg.render.fps)?;
    let mut desk = runtime.attendance_desk(DirectorySink::new(&cfg.output_dir));
    log::info!(
        "attendance_cam running. saving to {}",
        cfg.output_dir.display()
    );
    print_help();

    let (tx, rx) = mpsc::channel();
    let interrupt_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(Input::Interrupt);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(Input::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(Input::Eof);
    });

    let result = command_loop(&rx, &runtime, &mut desk, &cfg.output_dir);
    log::info!("shutting down");
    runtime.stop()?;
    result
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let overrides = ConfigOverrides {
        device: args.device.clone(),
        backend: args.backend.clone(),
        model_path: args.model.clone(),
        output_dir: args.out.clone(),
        font_path: args.font.clone(),
    };
    AppConfig::load_with(args.config.as_deref(), &overrides)
}

fn command_loop(
    rx: &mpsc::Receiver<Input>,
    runtime: &RuntimeHandle,
    desk: &mut AttendanceDesk,
    out_dir: &Path,
) -> Result<()> {
    let session = runtime.session();
    let mut pending: Option<PendingCapture> = None;

    loop {
        let line = match rx.recv() {
            Ok(Input::Line(line)) => line,
            Ok(Input::Eof) | Ok(Input::Interrupt) | Err(_) => break,
        };

        if let Some(capture) = pending.take() {
            report_capture(desk.complete(capture, Some(&line)));
            continue;
        }

        match line.trim() {
            "v" => match session.toggle_video() {
                Some(visible) => println!(
                    "video {} [{}]",
                    if visible { "shown" } else { "hidden" },
                    session.video_label()
                ),
                None => println!("video is not ready yet"),
            },
            "d" => match session.toggle_detecting() {
                Some(detecting) => println!(
                    "detection {} [{}]",
                    if detecting { "started" } else { "stopped" },
                    session.detect_label()
                ),
                None => println!("camera or detector is not ready yet"),
            },
            "c" => match desk.begin() {
                Ok(Some(capture)) => {
                    println!("Enter a name for the attendance record (empty to cancel):");
                    pending = Some(capture);
                }
                Ok(None) => println!("nothing to capture yet"),
                Err(err) => log::error!("capture failed: {:#}", err),
            },
            "p" => {
                if let Err(err) = write_previews(runtime, out_dir) {
                    log::error!("preview failed: {:#}", err);
                }
            }
            "s" => print_status(runtime),
            "q" => break,
            "" => {}
            other => {
                println!("unknown command '{}'", other);
                print_help();
            }
        }
    }

    // Input ended while a name was pending: treat as declined.
    if let Some(capture) = pending.take() {
        report_capture(desk.complete(capture, None));
    }
    Ok(())
}

fn report_capture(outcome: Result<CaptureOutcome>) {
    match outcome {
        Ok(CaptureOutcome::Saved(path)) => println!("saved {}", path.display()),
        Ok(CaptureOutcome::Declined) => println!("capture cancelled"),
        Err(err) => log::error!("saving attendance image failed: {:#}", err),
    }
}

fn write_previews(runtime: &RuntimeHandle, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let canvas_png = runtime
        .canvas()
        .lock()
        .map_err(|_| anyhow!("canvas lock poisoned"))?
        .encode_png()?;
    let canvas_path = out_dir.join("canvas.png");
    std::fs::write(&canvas_path, canvas_png)?;
    println!("wrote {}", canvas_path.display());

    if let Some(frame) = runtime.video().latest() {
        let video_path = out_dir.join("video.png");
        std::fs::write(&video_path, encode_png(&frame.to_image()?)?)?;
        println!("wrote {}", video_path.display());
    }
    Ok(())
}

fn print_status(runtime: &RuntimeHandle) {
    let snapshot = runtime.session().snapshot();
    let stats = runtime.cycle_stats();
    println!(
        "detecting={} video_visible={} controls=[{}] [{}]",
        snapshot.detecting,
        snapshot.video_visible,
        snapshot.detect_label(),
        snapshot.video_label()
    );
    println!(
        "requests issued={} completed={} failed={} objects={}",
        stats.issued,
        stats.completed,
        stats.failed,
        runtime.detections().len()
    );
    for detection in runtime.detections().snapshot() {
        println!(
            "  {} {:.2} at ({:.0}, {:.0}) {:.0}x{:.0}",
            detection.label,
            detection.confidence,
            detection.x,
            detection.y,
            detection.width,
            detection.height
        );
    }
}

fn print_help() {
    println!("commands: v=toggle video, d=toggle detecting, c=capture, p=preview, s=status, q=quit");
}
