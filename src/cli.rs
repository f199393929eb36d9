//! fallwatch - fall detection over a frame stream
//!
//! Subcommands:
//! - `run`: process a source and print the session verdict
//! - `compare`: classify a single image against the stored templates
//! - `templates`: manage the template store

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::classifier::{FeatureImage, KNeighborsClassifier, PoseClassifier};
use crate::config::FallwatchConfig;
use crate::ingest::open_source;
use crate::session::{run_session, ClassifierPair, FallSession, FramePhase, SessionVerdict};
use crate::storage::{import_local_templates, open_store, StoreKind, TemplateCapture, TemplateStore};
use crate::ui::{Ui, UiMode};
use crate::vision::select_pipeline;
use crate::{overlay, Characteristic, PoseLabel};

#[derive(Parser, Debug)]
#[command(name = "fallwatch", version, about = "Detect falls in a stream of video frames")]
struct Args {
    /// TOML configuration file
    #[arg(long, global = true, env = "FALLWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Progress display: auto, plain or pretty
    #[arg(long, global = true)]
    ui: Option<String>,

    /// Template store kind (sqlite, filesystem, memory)
    #[arg(long, global = true)]
    store: Option<StoreKind>,

    /// Template database file or directory
    #[arg(long, global = true)]
    template_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fall-detection session over a frame source
    Run(RunArgs),

    /// Classify one image against the stored templates
    Compare {
        /// Image to classify
        image: PathBuf,
        #[arg(long, default_value = "foreground")]
        characteristic: Characteristic,
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Manage stored templates
    Templates {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Frame directory or stub:// URI
    #[arg(long)]
    source: Option<String>,
    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,
    /// Neighbours consulted per classification
    #[arg(short, long)]
    k: Option<usize>,
    /// Falling frames that must be exceeded to report a fall
    #[arg(long)]
    threshold: Option<u32>,
    /// Track movement without classifying
    #[arg(long)]
    no_classify: bool,
    /// Write annotated frames here
    #[arg(long)]
    overlay_dir: Option<PathBuf>,
    /// Save classified crops here for template curation
    #[arg(long)]
    capture_dir: Option<PathBuf>,
    /// Name prefixed to captured crops (defaults to a millisecond timestamp)
    #[arg(long)]
    session: Option<String>,
    /// Print the verdict as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    /// Layer the flags over `cfg` and re-validate the result.
    fn apply(&self, cfg: &mut FallwatchConfig) -> Result<()> {
        if let Some(source) = &self.source {
            cfg.source.uri = source.clone();
        }
        if self.frames.is_some() {
            cfg.source.frame_limit = self.frames;
        }
        if let Some(k) = self.k {
            cfg.k = k;
        }
        if let Some(threshold) = self.threshold {
            cfg.session.fall_frame_threshold = threshold;
        }
        if self.no_classify {
            cfg.session.classify = false;
        }
        if self.overlay_dir.is_some() {
            cfg.overlay_dir = self.overlay_dir.clone();
        }
        if self.capture_dir.is_some() {
            cfg.capture_dir = self.capture_dir.clone();
        }
        cfg.validate()
    }

    fn session_name(&self) -> Result<String> {
        match &self.session {
            Some(name) => {
                let name = name.trim();
                if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                    bail!("session name '{}' is not usable in a file name", name);
                }
                Ok(name.to_string())
            }
            None => default_session_name(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum TemplateAction {
    /// List stored templates
    List {
        #[arg(long)]
        json: bool,
    },
    /// Store an image as a template
    Add {
        file: PathBuf,
        #[arg(long)]
        pose: PoseLabel,
        #[arg(long)]
        characteristic: Characteristic,
        /// Stored name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a template by id
    Delete { id: i64 },
    /// Write a template's image to a file
    Show {
        id: i64,
        #[arg(long)]
        output: PathBuf,
    },
    /// Upload a `{characteristic}/{pose}/` directory tree
    Import { dir: PathBuf },
    /// Delete every template
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = FallwatchConfig::load_from(args.config.as_deref())?;
    if let Some(store) = args.store {
        cfg.templates.store = store;
    }
    if let Some(path) = args.template_path {
        cfg.templates.path = path;
    }
    let ui = Ui::new(UiMode::parse(args.ui.as_deref()), std::io::stderr().is_terminal());

    match args.command {
        Command::Run(run_args) => {
            run_args.apply(&mut cfg)?;
            cmd_run(&cfg, &ui, &run_args)
        }
        Command::Compare {
            image,
            characteristic,
            k,
        } => {
            if let Some(k) = k {
                cfg.k = k;
                cfg.validate()?;
            }
            cmd_compare(&cfg, &ui, &image, characteristic, cfg.k)
        }
        Command::Templates { action } => {
            let mut store = open_store(cfg.templates.store, &cfg.templates.path)?;
            cmd_templates(store.as_mut(), action)
        }
    }
}

fn default_session_name() -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| anyhow!("system clock is before the unix epoch"))?;
    Ok(now.as_millis().to_string())
}

fn cmd_run(cfg: &FallwatchConfig, ui: &Ui, run_args: &RunArgs) -> Result<()> {
    let classifiers = {
        let _stage = ui.stage("Loading templates");
        let store = open_store(cfg.templates.store, &cfg.templates.path)?;
        let library = store.load_templates()?;
        if cfg.session.classify && library.is_empty() {
            log::warn!(
                "template store {} is empty; every frame will be unrecognized",
                cfg.templates.path.display()
            );
        }
        let (edge, foreground) = library.into_training_sets();
        ClassifierPair::new(
            KNeighborsClassifier::new(edge, cfg.k),
            KNeighborsClassifier::new(foreground, cfg.k),
        )
    };

    let mut pipeline = select_pipeline(&cfg.pipeline)?;
    let mut source = open_source(&cfg.source.uri, cfg.session.bounds, cfg.source.frame_limit)?;
    {
        let _stage = ui.stage("Connecting to source");
        source.connect()?;
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;

    let capture = match &cfg.capture_dir {
        Some(dir) => Some(TemplateCapture::new(dir, run_args.session_name()?)),
        None => None,
    };
    let mut session = FallSession::new(cfg.session, classifiers);
    let mut progress = ui.frames();
    log::info!(
        "session started: source={} pipeline={} k={}",
        cfg.source.uri,
        pipeline.name(),
        cfg.k
    );

    let verdict = run_session(
        source.as_mut(),
        pipeline.as_mut(),
        &mut session,
        &cancel,
        |frame, outcome| {
            progress.record(outcome.is_falling());
            if let Some(dir) = &cfg.overlay_dir {
                overlay::write(dir, frame, outcome)?;
            }
            if let (Some(capture), FramePhase::ClassifyFrame) = (&capture, outcome.phase) {
                if let Some(crop) = &outcome.edge_crop {
                    capture.capture(Characteristic::Edge, frame.index, crop)?;
                }
                if let Some(crop) = &outcome.foreground_crop {
                    capture.capture(Characteristic::Foreground, frame.index, crop)?;
                }
            }
            Ok(())
        },
    )?;
    progress.finish();

    print_verdict(&verdict, run_args.json)
}

fn print_verdict(verdict: &SessionVerdict, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(verdict)?);
        return Ok(());
    }
    println!("=== Session Verdict ===");
    println!(
        "Fall detected:     {}",
        if verdict.fall_detected { "YES" } else { "no" }
    );
    println!("Falling frames:    {}", verdict.fall_frames);
    println!("Classified frames: {}", verdict.classified_frames);
    println!("Frames processed:  {}", verdict.frames_processed);
    if verdict.cancelled {
        println!("(session cancelled before the source was exhausted)");
    }
    Ok(())
}

fn cmd_compare(
    cfg: &FallwatchConfig,
    ui: &Ui,
    image: &Path,
    characteristic: Characteristic,
    k: usize,
) -> Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("failed to read {}", image.display()))?;
    let query = FeatureImage::decode(&bytes)?;
    let training = {
        let _stage = ui.stage("Loading templates");
        let store = open_store(cfg.templates.store, &cfg.templates.path)?;
        let library = store.load_templates()?;
        library.training_set(characteristic).clone()
    };
    let classifier = KNeighborsClassifier::new(training, k);
    let label = classifier.classify(Some(&query));
    println!("{} ({} view, k={}): {}", image.display(), characteristic, classifier.k(), label);
    Ok(())
}

fn cmd_templates(store: &mut dyn TemplateStore, action: TemplateAction) -> Result<()> {
    match action {
        TemplateAction::List { json } => {
            let records = store.list_templates()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            if records.is_empty() {
                println!("No templates stored.");
            }
            for record in records {
                println!(
                    "{:>5}  {:<10}  {:<8}  {}  {}",
                    record.id,
                    record.characteristic,
                    record.pose,
                    &record.content_hash[..12.min(record.content_hash.len())],
                    record.image_name
                );
            }
            Ok(())
        }
        TemplateAction::Add {
            file,
            pose,
            characteristic,
            name,
        } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or_else(|| anyhow!("{} has no file name", file.display()))?,
            };
            let record = store.save_template(pose, characteristic, &name, &bytes)?;
            println!("Stored template {} ({} / {})", record.id, record.characteristic, record.pose);
            Ok(())
        }
        TemplateAction::Delete { id } => {
            if !store.delete_template(id)? {
                bail!("no template with id {}", id);
            }
            println!("Deleted template {}", id);
            Ok(())
        }
        TemplateAction::Show { id, output } => {
            let bytes = store
                .template_image(id)?
                .ok_or_else(|| anyhow!("no template with id {}", id))?;
            std::fs::write(&output, bytes)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Wrote template {} to {}", id, output.display());
            Ok(())
        }
        TemplateAction::Import { dir } => {
            let report = import_local_templates(store, &dir)?;
            println!(
                "Imported {}, skipped {} duplicates, rejected {}",
                report.imported, report.duplicates, report.rejected
            );
            Ok(())
        }
        TemplateAction::Clear { yes } => {
            if !yes {
                bail!("refusing to delete every template without --yes");
            }
            let removed = store.clear()?;
            println!("Deleted {} templates", removed);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_run_flags() {
        let args = Args::try_parse_from([
            "fallwatch",
            "--store",
            "memory",
            "run",
            "--source",
            "stub://fall",
            "-k",
            "7",
            "--no-classify",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.store, Some(StoreKind::Memory));
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.source.as_deref(), Some("stub://fall"));
                assert_eq!(run.k, Some(7));
                assert!(run.no_classify && run.json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    fn run_args(extra: &[&str]) -> RunArgs {
        let argv = ["fallwatch", "run"].iter().chain(extra).copied();
        match Args::try_parse_from(argv).unwrap().command {
            Command::Run(run) => run,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn run_flags_are_validated_like_config() {
        let mut cfg = FallwatchConfig::default();
        assert!(run_args(&["-k", "0"]).apply(&mut cfg).is_err());

        let mut cfg = FallwatchConfig::default();
        run_args(&["-k", "3", "--threshold", "6", "--no-classify"])
            .apply(&mut cfg)
            .unwrap();
        assert_eq!(cfg.k, 3);
        assert_eq!(cfg.session.fall_frame_threshold, 6);
        assert!(!cfg.session.classify);
    }

    #[test]
    fn session_names_for_captures() {
        assert_eq!(
            run_args(&["--session", "ward3-night"]).session_name().unwrap(),
            "ward3-night"
        );
        assert!(run_args(&["--session", "../escape"]).session_name().is_err());
        assert!(run_args(&["--session", " "]).session_name().is_err());

        let generated = run_args(&[]).session_name().unwrap();
        assert!(!generated.is_empty() && generated.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn template_actions_parse_labels() {
        let args = Args::try_parse_from([
            "fallwatch",
            "templates",
            "add",
            "crop.png",
            "--pose",
            "lying",
            "--characteristic",
            "edge",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Templates {
                action: TemplateAction::Add {
                    pose: PoseLabel::Lying,
                    characteristic: Characteristic::Edge,
                    ..
                }
            }
        ));
        assert!(Args::try_parse_from(["fallwatch", "templates", "add", "x.png", "--pose", "crawling", "--characteristic", "edge"]).is_err());
    }

    #[test]
    fn template_commands_run_against_a_store() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("crop.png");
        std::fs::write(&file, FeatureImage::uniform(40).encode_png().unwrap()).unwrap();
        let mut store = crate::storage::InMemoryTemplateStore::new();

        cmd_templates(
            &mut store,
            TemplateAction::Add {
                file,
                pose: PoseLabel::Sitting,
                characteristic: Characteristic::Foreground,
                name: None,
            },
        )
        .unwrap();
        assert_eq!(store.list_templates().unwrap()[0].image_name, "crop.png");

        assert!(cmd_templates(&mut store, TemplateAction::Clear { yes: false }).is_err());
        assert!(cmd_templates(&mut store, TemplateAction::Delete { id: 42 }).is_err());
        cmd_templates(&mut store, TemplateAction::Clear { yes: true }).unwrap();
        assert!(store.list_templates().unwrap().is_empty());
    }
}
