use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use psb_core::{
    builder::build_sub_files, config::Config, domain::UserId,
    extractor::extract_links_from_posts, feed::PostBuffer, pipeline::UpdateService,
    userdb::JsonUserStore,
};
use psb_git::{GitConfig, GitPublisher};

/// Proxy subscription bot.
#[derive(Debug, Parser)]
#[command(name = "psb")]
#[command(
    about = "Collect proxy links from Telegram channels and publish subscription files",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the Telegram bot and the update scheduler (default).
    Bot,

    /// Extract links from text and write subscription files.
    Build {
        /// Output directory for the generated files.
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
        /// Input text files (stdin when omitted).
        files: Vec<PathBuf>,
    },

    /// Print the links found in text, one per line.
    Extract {
        /// Input text files (stdin when omitted).
        files: Vec<PathBuf>,
    },

    /// Run one update pass from the cached channel posts and exit.
    Update {
        /// Only update this Telegram user.
        #[arg(long, value_name = "ID")]
        user: Option<i64>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run(Cli::parse()).await {
        eprintln!("psb error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    psb_core::logging::init("psb")?;

    match cli.command.unwrap_or(Command::Bot) {
        Command::Bot => run_bot().await,
        Command::Build { out, files } => run_build(out, &files),
        Command::Extract { files } => run_extract(&files),
        Command::Update { user } => run_update(user.map(UserId)).await,
    }
}

async fn run_bot() -> Result<()> {
    let cfg = Arc::new(Config::load()?);
    let (service, feed) = wire(cfg.clone())?;
    psb_telegram::router::run_polling(cfg, service, feed)
        .await
        .context("telegram bot failed")
}

fn run_build(out: PathBuf, files: &[PathBuf]) -> Result<()> {
    let cfg = Config::for_build()?;
    let links = extract_links_from_posts(&read_inputs(files)?);
    let report = build_sub_files(&links, &out, &cfg.categories)?;

    if report.is_empty() {
        println!("No links found, nothing written.");
        return Ok(());
    }
    tracing::info!(
        dir = %out.display(),
        files = report.artifacts.len(),
        "subscription files written"
    );
    for artifact in &report.artifacts {
        println!("{:>6}  {}", artifact.links, artifact.path.display());
    }
    Ok(())
}

fn run_extract(files: &[PathBuf]) -> Result<()> {
    for link in extract_links_from_posts(&read_inputs(files)?) {
        println!("{link}");
    }
    Ok(())
}

async fn run_update(user: Option<UserId>) -> Result<()> {
    let cfg = Arc::new(Config::for_build()?);
    let (service, _) = wire(cfg)?;

    let results = match user {
        Some(user) => vec![(user, service.update_user(user).await)],
        None => service.update_all().await?,
    };

    let mut failed = 0usize;
    for (user, res) in &results {
        match res {
            Ok(outcome) => println!("{user}: {} ({} links)", outcome.label(), outcome.links()),
            Err(e) => {
                failed += 1;
                println!("{user}: failed: {e}");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} updates failed", results.len());
    }
    Ok(())
}

fn wire(cfg: Arc<Config>) -> Result<(Arc<UpdateService>, Arc<PostBuffer>)> {
    fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("creating data dir {}", cfg.data_dir.display()))?;

    let store = Arc::new(JsonUserStore::new(cfg.users_file.clone()));
    let feed = Arc::new(PostBuffer::persistent(cfg.posts_file.clone(), cfg.fetch_limit));
    let publisher = Arc::new(GitPublisher::new(GitConfig::from_config(&cfg)));
    let service = Arc::new(UpdateService::new(cfg, store, feed.clone(), publisher));
    Ok((service, feed))
}

/// Whole files (or all of stdin) as individual posts.
fn read_inputs(files: &[PathBuf]) -> Result<Vec<String>> {
    if files.is_empty() {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("reading stdin")?;
        return Ok(vec![text]);
    }
    files
        .iter()
        .map(|f| fs::read_to_string(f).with_context(|| format!("reading {}", f.display())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Option<Command> {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn no_subcommand_means_bot() {
        assert!(parse(&["psb"]).is_none());
        assert!(matches!(parse(&["psb", "bot"]), Some(Command::Bot)));
    }

    #[test]
    fn build_takes_out_dir_and_files() {
        match parse(&["psb", "build", "--out", "subs", "a.txt", "b.txt"]) {
            Some(Command::Build { out, files }) => {
                assert_eq!(out, PathBuf::from("subs"));
                assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
            }
            other => panic!("expected Build, got {other:?}"),
        }
        assert!(Cli::try_parse_from(["psb", "build"]).is_err());
    }

    #[test]
    fn update_accepts_optional_user() {
        assert!(matches!(
            parse(&["psb", "update", "--user", "42"]),
            Some(Command::Update { user: Some(42) })
        ));
        assert!(matches!(parse(&["psb", "update"]), Some(Command::Update { user: None })));
    }

    #[test]
    fn read_inputs_keeps_one_post_per_file() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        fs::write(&a, "vmess://a\n").unwrap();
        let posts = read_inputs(&[a]).unwrap();
        assert_eq!(posts, vec!["vmess://a\n".to_string()]);
        assert!(read_inputs(&[tmp.path().join("missing.txt")]).is_err());
    }
}
