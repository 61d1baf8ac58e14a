use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine as Base64Engine;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;

use snippet_studio::{
    Author, EntryState, LoopState, ModelConfig, PreviewDocument, SessionReport, Snippet,
    StepBudget, Studio, StudioConfig, StudioSettings, SubmitOutcome, TranscriptEvent, Viewport,
};

#[derive(Parser)]
#[command(name = "snippet-studio", version, about = "Generate HTML/CSS/JS components and refine them from screenshots")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a component from a description
    Generate {
        prompt: String,
        /// Run an improvement session on the result
        #[arg(long)]
        auto_improve: bool,
        /// Improvement rounds, 1 through 5
        #[arg(long, default_value_t = 3)]
        steps: u8,
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },
    /// Run an improvement session on a saved snippet
    Improve {
        #[arg(long)]
        from: PathBuf,
        #[arg(long, default_value_t = 3)]
        steps: u8,
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },
    /// Write the standalone preview page of a saved snippet
    Preview {
        #[arg(long)]
        from: PathBuf,
        #[arg(long, default_value = "index.html")]
        out: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Generate {
            prompt,
            auto_improve,
            steps,
            out,
        } => {
            let config = studio_config(steps, auto_improve)?;
            let viewport = config.viewport;
            let mut studio = Studio::with_gemini(config)?;
            if auto_improve {
                attach_preview(&mut studio, viewport).await;
            }
            let printer = tokio::spawn(print_events(studio.subscribe()));
            print_existing(&studio);

            let outcome = studio.submit(&prompt).await;
            let snippet = studio.snippet().clone();
            drop(studio);
            let _ = printer.await;

            match outcome {
                SubmitOutcome::Generated { improvement } => {
                    write_outputs(&out, &snippet, improvement.as_ref())?;
                    report_session(improvement.as_ref());
                }
                SubmitOutcome::Rejected { busy } => anyhow::bail!("{} already in progress", busy),
                SubmitOutcome::Failed(e) => return Err(e).context("generation failed"),
            }
        }
        Command::Improve { from, steps, out } => {
            let snippet = read_snippet(&from)?;
            let config = studio_config(steps, false)?;
            let viewport = config.viewport;
            let mut studio = Studio::with_gemini(config)?;
            attach_preview(&mut studio, viewport).await;
            let printer = tokio::spawn(print_events(studio.subscribe()));
            print_existing(&studio);

            studio.load_snippet(snippet).await?;
            let report = studio.improve().await?;
            let snippet = studio.snippet().clone();
            drop(studio);
            let _ = printer.await;

            write_outputs(&out, &snippet, Some(&report))?;
            report_session(Some(&report));
        }
        Command::Preview { from, out } => {
            let snippet = read_snippet(&from)?;
            fs::write(&out, PreviewDocument::from_snippet(&snippet).into_html())
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {}", out.display());
        }
    }
    Ok(())
}

fn studio_config(steps: u8, auto_improve: bool) -> Result<StudioConfig> {
    Ok(StudioConfig {
        model: ModelConfig::from_env(),
        settings: StudioSettings {
            auto_improve,
            steps: StepBudget::new(steps)?,
        },
        ..Default::default()
    })
}

#[cfg(feature = "cdp")]
async fn attach_preview(studio: &mut Studio, viewport: Viewport) {
    use snippet_studio::cdp::{CdpConfig, CdpSurface};

    let config = CdpConfig {
        viewport,
        ..Default::default()
    };
    match CdpSurface::launch(config).await {
        Ok(surface) => studio.attach_surface(Box::new(surface)),
        Err(e) => log::warn!("preview surface unavailable: {}", e),
    }
}

#[cfg(not(feature = "cdp"))]
async fn attach_preview(_studio: &mut Studio, _viewport: Viewport) {
    log::warn!("built without the `cdp` feature, improvement steps have no render surface");
}

fn read_snippet(path: &Path) -> Result<Snippet> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_outputs(dir: &Path, snippet: &Snippet, report: Option<&SessionReport>) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    fs::write(dir.join("snippet.json"), serde_json::to_string_pretty(snippet)?)?;
    fs::write(
        dir.join("index.html"),
        PreviewDocument::from_snippet(snippet).into_html(),
    )?;
    for (i, round) in report.map(|r| r.history.as_slice()).unwrap_or_default().iter().enumerate() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&round.screenshot)
            .context("decoding round screenshot")?;
        fs::write(dir.join(format!("round-{}.jpg", i + 1)), bytes)?;
    }
    println!("Wrote {} (snippet {})", dir.display(), snippet.fingerprint());
    Ok(())
}

fn report_session(report: Option<&SessionReport>) {
    if let Some(report) = report {
        if let LoopState::Failed { step } = report.state {
            eprintln!(
                "improvement stopped at step {} of {}",
                step, report.planned
            );
        }
    }
}

fn print_existing(studio: &Studio) {
    for entry in studio.transcript().entries() {
        println!("{}> {}", who(entry.author), entry.content.describe());
    }
}

fn who(author: Author) -> &'static str {
    match author {
        Author::User => "you",
        Author::Assistant => "assistant",
    }
}

async fn print_events(mut rx: UnboundedReceiver<TranscriptEvent>) {
    let mut stdout = std::io::stdout();
    let mut mid_line = false;
    while let Some(event) = rx.recv().await {
        if mid_line && !matches!(event, TranscriptEvent::Chunk { .. }) {
            println!();
            mid_line = false;
        }
        match event {
            TranscriptEvent::Appended { entry, .. } if entry.state == EntryState::Streaming => {
                print!("{}> ", who(entry.author));
                mid_line = true;
            }
            TranscriptEvent::Appended { entry, .. } | TranscriptEvent::Replaced { entry, .. } => {
                println!("{}> {}", who(entry.author), entry.content.describe());
            }
            TranscriptEvent::Chunk { text, .. } => print!("{}", text),
        }
        let _ = stdout.flush();
    }
    if mid_line {
        println!();
    }
}
