use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parking_annotator::config::{self, AppConfig};
use parking_annotator::editing::{
    CreateKind, EditOutcome, EditRequest, EditingSession, HostView,
};
use parking_annotator::export::PersistenceController;
use parking_annotator::state::{load_collection, AnnotationStore};
use parking_annotator::transform::{CoordinateTransform, Point};
use parking_annotator::utils;

#[derive(Parser, Debug)]
#[command(name = "parking-annotator")]
#[command(about = "Review and correct parking-slot keypoint annotations")]
struct Args {
    /// Path to a TOML config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory scanned for annotation documents, or a single document
    #[arg(long)]
    dataset_root: Option<PathBuf>,

    /// Directory holding the images under review
    #[arg(long)]
    images: Option<PathBuf>,

    /// Root directory for corrected documents
    #[arg(long)]
    output_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Edit interactively with line commands on stdin
    Edit,
    /// Load every document and report what was found
    Validate,
    /// Load and immediately write every document back out
    Resave,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parking_annotator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let mut config = config::load_config(args.config.as_deref()).context("Loading configuration")?;
    if let Some(root) = args.dataset_root {
        config.paths.dataset_root = root;
    }
    if let Some(images) = args.images {
        config.paths.images_dir = images;
    }
    if let Some(output_root) = args.output_root {
        config.paths.output_root = output_root;
    }

    match args.command {
        Command::Validate => validate(&config),
        Command::Resave => resave(&config),
        Command::Edit => edit(&config),
    }
}

fn load_store(config: &AppConfig, next_id: i64) -> Result<AnnotationStore> {
    let transform = CoordinateTransform::new(config.transform.storage_offset, 1.0);
    let collection = load_collection(&config.paths.dataset_root, &transform)
        .with_context(|| format!("Loading {}", config.paths.dataset_root.display()))?;
    if collection.is_empty() {
        bail!(
            "No annotation documents found under {}",
            config.paths.dataset_root.display()
        );
    }
    Ok(AnnotationStore::new(collection, next_id))
}

fn validate(config: &AppConfig) -> Result<()> {
    let store = load_store(config, 0)?;
    for (name, folder) in store.folders() {
        println!(
            "{name}: {} images, {} annotations ({})",
            folder.buckets.len(),
            folder.annotation_count(),
            folder.source_path.display()
        );
    }
    println!("next free session id: {}", store.next_id());
    Ok(())
}

fn resave(config: &AppConfig) -> Result<()> {
    let store = load_store(config, 0)?;
    let persistence = PersistenceController::new(&config.paths, config.transform.storage_offset);
    let report = persistence.save_documents(&store)?;
    for path in report.documents {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn edit(config: &AppConfig) -> Result<()> {
    let persistence = PersistenceController::new(&config.paths, config.transform.storage_offset);
    let resume = persistence.load_session()?;
    let store = load_store(config, resume.next_annotation_id)?;

    let names = utils::list_images(&config.paths.images_dir)
        .with_context(|| format!("Listing {}", config.paths.images_dir.display()))?;
    let images = utils::working_set(&names, &store);

    let mut session = EditingSession::new(store, persistence, images, &resume, config);
    let mut host = StdinHost {
        scale: config.transform.initial_scale,
        lines: io::stdin().lock().lines(),
    };

    print_position(&session);
    while let Some(line) = host.read_line("> ") {
        let words: Vec<&str> = line.split_whitespace().collect();
        match run_command(&mut session, &mut host, &words) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {e:#}"),
        }
    }

    let report = session.finish().context("Saving session")?;
    println!(
        "saved {} annotations to {} documents",
        report.annotations_written,
        report.documents.len()
    );
    Ok(())
}

/// Returns `false` when the reviewer asked to quit.
fn run_command(session: &mut EditingSession, host: &mut StdinHost, words: &[&str]) -> Result<bool> {
    match words {
        [] => {}
        ["down", x, y] => match session.pointer_down(host, point(x, y)?) {
            Some(hit) => println!("selected annotation {} corner {}", hit.annotation, hit.corner + 1),
            None => println!("nothing selected"),
        },
        ["move", x, y] => {
            session.pointer_move(host, point(x, y)?);
        }
        ["up"] => session.pointer_up()?,
        ["double", x, y] => {
            let p = point(x, y)?;
            if session.double_click(host, p)? {
                println!("corner updated");
            }
        }
        ["delete"] => match session.delete_selected()? {
            Some(id) => println!("deleted {id}"),
            None => println!("nothing to delete"),
        },
        ["create", kind] => {
            let kind = match *kind {
                "parking" => CreateKind::ParkingSpace,
                "limiter" => CreateKind::Limiter,
                other => bail!("unknown annotation kind '{other}'"),
            };
            println!("created {}", session.create(kind)?);
        }
        ["next"] => {
            session.next_image();
            print_position(session);
        }
        ["prev"] => {
            session.previous_image();
            print_position(session);
        }
        ["zoom", scale] => {
            host.scale = scale.parse().context("zoom must be a number")?;
        }
        ["list"] => {
            for ann in session.display_annotations(host) {
                let corners: Vec<String> = ann
                    .corners
                    .iter()
                    .zip(&ann.corner_property)
                    .map(|(p, prop)| format!("{prop}@({:.1},{:.1})", p.x, p.y))
                    .collect();
                println!("{} {} {}", ann.id, ann.category, corners.join(" "));
            }
        }
        ["save"] => {
            let report = session.save_documents()?;
            println!("saved {} documents", report.documents.len());
        }
        ["quit"] | ["exit"] => return Ok(false),
        other => bail!("unknown command: {}", other.join(" ")),
    }
    Ok(true)
}

fn point(x: &str, y: &str) -> Result<Point> {
    Ok(Point::new(
        x.parse().context("x must be a number")?,
        y.parse().context("y must be a number")?,
    ))
}

fn print_position(session: &EditingSession) {
    match session.current_image() {
        Some(key) => println!("[{}] {}", session.position_label(), key),
        None => println!("no images in the working set"),
    }
}

/// Terminal stand-in for the GUI: zoom is a plain value and the corner
/// dialog is a prompt.
struct StdinHost {
    scale: f64,
    lines: io::Lines<io::StdinLock<'static>>,
}

impl StdinHost {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        io::stdout().flush().ok();
        self.lines.next().and_then(|line| line.ok())
    }
}

impl HostView for StdinHost {
    fn scale(&self) -> f64 {
        self.scale
    }

    fn edit_corner(&mut self, request: &EditRequest) -> EditOutcome {
        println!(
            "annotation {} ({}) corner {}: property={}{}{}",
            request.annotation_id,
            request.category,
            request.corner + 1,
            request.corner_property,
            request
                .t_or_l
                .map(|v| format!(" t_or_l={v:?}"))
                .unwrap_or_default(),
            if request.group_id_editable {
                format!(" group={:?}", request.group_id)
            } else {
                String::new()
            },
        );

        let Some(line) = self.read_line("edit (key=value ..., empty to cancel)> ") else {
            return EditOutcome::Cancel;
        };
        if line.trim().is_empty() {
            return EditOutcome::Cancel;
        }

        let mut values = request.current_values();
        for pair in line.split_whitespace() {
            let parsed = match pair.split_once('=') {
                Some(("property", v)) => v.parse().map(|p| values.corner_property = p),
                Some(("t_or_l", v)) => v.parse().map(|t| values.t_or_l = Some(t)),
                Some(("group", v)) => v.parse().map(|g| values.group_id = Some(g)),
                _ => Err(format!("unrecognised field '{pair}'")),
            };
            if let Err(e) = parsed {
                eprintln!("error: {e}");
                return EditOutcome::Cancel;
            }
        }
        EditOutcome::Commit(values)
    }
}
