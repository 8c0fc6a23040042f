use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autorec::config::ConfigStore;
use autorec::sites::showroom::Showroom;
use autorec::tracker::{Engine, SHUTDOWN_GRACE};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Override the configuration directory.
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the tracking engine in the foreground (the default).
    Track,
    /// Add a streamer page URL to the track list.
    Add { link: String },
    /// Remove a streamer page URL from the track list.
    Remove { link: String },
    /// Create the configuration directory layout.
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autorec=info,sites=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let dir = cli.config_dir.unwrap_or_else(ConfigStore::default_dir);

    match cli.command.unwrap_or(Command::Track) {
        Command::Init => {
            let config = ConfigStore::init(&dir)?;
            println!("config directory ready: {}", dir.display());
            println!("edit {} to taste", config.display());
        }
        Command::Add { link } => edit_list(&dir, &link, true)?,
        Command::Remove { link } => edit_list(&dir, &link, false)?,
        Command::Track => track(dir).await?,
    }

    Ok(())
}

async fn track(dir: PathBuf) -> anyhow::Result<()> {
    ConfigStore::init(&dir)?;
    let cfg = Arc::new(ConfigStore::open(dir)?);

    let engine = Engine::new(cfg.clone());
    let user_agent = cfg.get().user_agent;
    engine.register_adapter(Arc::new(Showroom::new(engine.scheduler(), &user_agent)?))?;

    engine.start().await?;
    info!("tracking; edit {} to change targets", cfg.list_path().display());

    tokio::signal::ctrl_c().await?;
    engine.shutdown(SHUTDOWN_GRACE).await;
    Ok(())
}

/// Add or remove a line in the track list. A running engine picks the
/// change up through its file watcher.
fn edit_list(dir: &std::path::Path, link: &str, add: bool) -> anyhow::Result<()> {
    ConfigStore::init(dir)?;
    let path = ConfigStore::list_path_in(dir);
    let contents = std::fs::read_to_string(&path)?;
    let mut lines: Vec<&str> = contents.lines().collect();

    let present = lines.iter().any(|line| line.trim() == link);
    if add {
        if present {
            println!("already tracking {link}");
            return Ok(());
        }
        lines.push(link);
        println!("added {link}");
    } else {
        if !present {
            println!("not tracking {link}");
            return Ok(());
        }
        lines.retain(|line| line.trim() != link);
        println!("removed {link}");
    }

    let mut out = lines.join("\n");
    out.push('\n');
    std::fs::write(&path, out)?;
    Ok(())
}
