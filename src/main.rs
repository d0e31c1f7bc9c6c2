use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matseg::chat::ChatOutcome;
use matseg::config::Config;
use matseg::coords::{CanvasSize, DisplayPoint};
use matseg::models::{ImagePoint, PromptLabel, PromptSnapshot, Sender};
use matseg::refine::RefinementOutcome;
use matseg::stub::{self, StubState};
use matseg::workbench::{PointerButton, PointerClick, Update, Workbench};

#[derive(Parser)]
#[command(name = "matseg")]
#[command(about = "Interactive microstructure segmentation client")]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ServiceArgs {
    /// Service base URL (overrides MATSEG_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Bearer token (overrides MATSEG_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Coalescing window for refinement requests, in milliseconds
    #[arg(long, global = true)]
    debounce_ms: Option<u64>,

    /// Components smaller than this are not counted as objects
    #[arg(long, global = true)]
    min_object_pixels: Option<usize>,

    /// Physical area of one pixel (e.g. µm²)
    #[arg(long, global = true)]
    pixel_area: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session driven from stdin
    Shell {
        /// Canvas width that click coordinates refer to
        #[arg(long, default_value = "800")]
        canvas_width: f64,

        /// Canvas height that click coordinates refer to
        #[arg(long, default_value = "600")]
        canvas_height: f64,
    },
    /// Upload an image, apply point prompts and print the resulting statistics
    Segment {
        image: PathBuf,

        /// Prompts in image space as `x,y` (foreground) or `x,y,-` (background)
        #[arg(short, long = "point", required = true)]
        points: Vec<String>,

        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
    /// Ask the agent a question, optionally about an image
    Chat {
        text: String,

        #[arg(long)]
        image: Option<PathBuf>,

        #[arg(long, default_value = "120")]
        timeout_secs: u64,
    },
    /// Run the offline stub service
    Stub {
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },
}

/// Initialize tracing with output to stderr (interactive modes) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "matseg=info,tower_http=debug".into()),
    );

    if use_stderr {
        // Keep stdout for command output
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn load_config(args: &ServiceArgs) -> anyhow::Result<Config> {
    let mut config = Config::from_env();
    if let Some(ref url) = args.url {
        config.base_url = url.clone();
    }
    if let Some(ref key) = args.api_key {
        config.api_key = Some(key.clone());
    }
    if let Some(ms) = args.debounce_ms {
        config.debounce_ms = ms;
    }
    if let Some(px) = args.min_object_pixels {
        config.min_object_pixels = px;
    }
    if let Some(area) = args.pixel_area {
        config.pixel_area = area;
    }
    config.validate().context("Invalid settings")?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = !matches!(cli.command, Commands::Stub { .. });
    init_tracing(use_stderr);

    let config = load_config(&cli.service)?;

    match cli.command {
        Commands::Shell {
            canvas_width,
            canvas_height,
        } => run_shell(&config, CanvasSize::new(canvas_width, canvas_height)).await?,
        Commands::Segment {
            image,
            points,
            timeout_secs,
        } => run_segment(&config, &image, &points, Duration::from_secs(timeout_secs)).await?,
        Commands::Chat {
            text,
            image,
            timeout_secs,
        } => run_chat(&config, &text, image.as_deref(), Duration::from_secs(timeout_secs)).await?,
        Commands::Stub { port } => {
            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
            tracing::info!("Stub service listening on http://127.0.0.1:{}/api/v1", port);
            stub::serve(listener, StubState::default()).await?;
        }
    }

    Ok(())
}

async fn upload(workbench: &mut Workbench, path: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    workbench.upload_image(&file_name, bytes).await?;
    Ok(())
}

fn parse_point(arg: &str) -> anyhow::Result<(ImagePoint, PromptLabel)> {
    let parts: Vec<&str> = arg.split(',').map(str::trim).collect();
    let (x, y, label) = match parts.as_slice() {
        [x, y] => (x, y, PromptLabel::Positive),
        [x, y, l] => (
            x,
            y,
            PromptLabel::from_str(l).with_context(|| format!("Unknown label '{}'", l))?,
        ),
        _ => bail!("Expected x,y or x,y,label but got '{}'", arg),
    };
    Ok((ImagePoint::new(x.parse()?, y.parse()?), label))
}

async fn run_segment(
    config: &Config,
    image: &Path,
    points: &[String],
    timeout: Duration,
) -> anyhow::Result<()> {
    let mut workbench = Workbench::from_config(config);
    upload(&mut workbench, image).await?;

    let mut target = 0;
    for arg in points {
        let (point, label) = parse_point(arg)?;
        target = workbench.add_point(point, label)?.version();
    }

    tokio::time::timeout(timeout, async {
        while let Some(update) = workbench.next_update().await {
            if let Update::Refinement { outcome, .. } = update {
                match outcome {
                    RefinementOutcome::Applied { version, .. } if version == target => {
                        return Ok(());
                    }
                    RefinementOutcome::Failed {
                        version, error, ..
                    } if version == target => return Err(anyhow::Error::new(error)),
                    _ => {}
                }
            }
        }
        bail!("Event channel closed")
    })
    .await
    .context("Timed out waiting for the segmentation result")??;

    let stats = workbench
        .stats()
        .context("No statistics for the final mask")?;
    let report = serde_json::json!({
        "session_id": workbench.session().map(|s| s.id.clone()),
        "version": workbench.last_applied_version(),
        "stats": stats,
        "object_areas": workbench.object_areas(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_chat(
    config: &Config,
    text: &str,
    image: Option<&Path>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let mut workbench = Workbench::from_config(config);
    if let Some(path) = image {
        upload(&mut workbench, path).await?;
    }

    for turn in workbench.send_text(text)? {
        println!("[{}] {}", turn.sender.as_str(), turn.text);
    }

    let update = tokio::time::timeout(timeout, workbench.next_update())
        .await
        .context("Timed out waiting for the agent")?;
    if let Some(Update::Chat(outcome)) = update {
        let turn = outcome.turn();
        println!("[{}] {}", turn.sender.as_str(), turn.text);
        if let ChatOutcome::Reply {
            stats: Some(stats), ..
        } = outcome
        {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

const SHELL_HELP: &str = "\
commands:
  upload <path>              start a session on an image
  click <x> <y> [left|right] click on the canvas
  point <x> <y> [+|-]        add a prompt in image space
  remove <seq>               remove a prompt by sequence number
  undo                       remove the latest prompt
  prompts                    list live prompts
  stats                      show statistics of the displayed mask
  say <text>                 ask the agent (bare text works too)
  quit";

async fn run_shell(config: &Config, canvas: CanvasSize) -> anyhow::Result<()> {
    let mut workbench = Workbench::from_config(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0;

    println!("{}", SHELL_HELP);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !shell_command(&mut workbench, canvas, line.trim()).await {
                    break;
                }
            }
            Some(update) = workbench.next_update() => {
                if let Update::Refinement { outcome: RefinementOutcome::Applied { version, stats }, .. } = update {
                    println!(
                        "mask v{}: {:.2}% area, {} objects, mean area {:.2}",
                        version, stats.area_fraction_percent, stats.object_count, stats.mean_object_area
                    );
                }
            }
        }
        printed = print_new_turns(&workbench, printed);
    }
    Ok(())
}

fn print_new_turns(workbench: &Workbench, printed: usize) -> usize {
    let turns = workbench.chat_log().turns();
    for turn in &turns[printed..] {
        let who = match turn.sender {
            Sender::User => continue,
            Sender::Agent => "agent",
            Sender::System => "system",
        };
        println!("[{}] {}", who, turn.text);
    }
    turns.len()
}

/// Run one shell line. Returns false when the shell should exit.
async fn shell_command(workbench: &mut Workbench, canvas: CanvasSize, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    if matches!(command, "quit" | "exit") {
        return false;
    }
    if let Err(e) = run_shell_line(workbench, canvas, line, command, rest).await {
        eprintln!("error: {:#}", e);
    }
    true
}

async fn run_shell_line(
    workbench: &mut Workbench,
    canvas: CanvasSize,
    line: &str,
    command: &str,
    rest: &str,
) -> anyhow::Result<()> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    let report = |snapshot: PromptSnapshot| {
        println!("prompts v{}: {} live", snapshot.version(), snapshot.len());
    };

    match command {
        "" => {}
        "help" => println!("{}", SHELL_HELP),
        "upload" => upload(workbench, Path::new(rest.trim())).await?,
        "click" => {
            let [x, y, button @ ..] = args.as_slice() else {
                bail!("usage: click <x> <y> [left|right]");
            };
            let button = match button.first().copied() {
                None | Some("left") => PointerButton::Left,
                Some("right") => PointerButton::Right,
                Some(other) => bail!("unknown button '{}'", other),
            };
            let click = PointerClick {
                position: DisplayPoint::new(x.parse()?, y.parse()?),
                button,
            };
            report(workbench.click(click, canvas)?);
        }
        "point" => {
            let (point, label) = parse_point(&args.join(","))?;
            report(workbench.add_point(point, label)?);
        }
        "remove" => report(workbench.remove_prompt(rest.trim().parse()?)?),
        "undo" => match workbench.undo()? {
            Some(snapshot) => report(snapshot),
            None => println!("nothing to undo"),
        },
        "prompts" => {
            for prompt in workbench.prompts().prompts() {
                println!(
                    "#{} ({:.1}, {:.1}) {}",
                    prompt.sequence,
                    prompt.position.x,
                    prompt.position.y,
                    prompt.label.as_str()
                );
            }
        }
        "stats" => match workbench.stats() {
            Some(stats) => println!("{}", serde_json::to_string_pretty(stats)?),
            None => println!("no mask yet"),
        },
        "say" => {
            workbench.send_text(rest)?;
        }
        _ => {
            workbench.send_text(line)?;
        }
    }
    Ok(())
}
