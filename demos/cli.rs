use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use unsubscribe_engine::{
    annotate, normalize_message, parse_unsubscribe_header, AllowList, Config, Error, RawMessage,
    UnsubscribeClient,
};

#[derive(Parser, Debug)]
#[command(
    name = "unsubscribe",
    about = "Find and follow newsletter unsubscribe links",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, help = "Proxy URL (optional)")]
    proxy: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a JSON array of Gmail-format messages
    Classify {
        #[arg(long)]
        input: PathBuf,
        /// Allow-list file; listed senders are marked whitelisted
        #[arg(long)]
        allow_list: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Pick the unsubscribe target out of a List-Unsubscribe header value
    ParseHeader { value: String },
    /// Follow a single unsubscribe link
    Unsubscribe {
        link: String,
        /// Treat an accepted request without confirmation text as manual
        #[arg(long)]
        strict: bool,
    },
    /// Manage the sender allow-list
    Allow {
        #[arg(long, default_value = "data/whitelist.json")]
        path: PathBuf,
        #[command(subcommand)]
        action: AllowAction,
    },
}

#[derive(Subcommand, Debug)]
enum AllowAction {
    Add {
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    Remove { email: String },
    List,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::default();
    config.proxy_url = cli.proxy.clone();

    match cli.command {
        Commands::Classify {
            input,
            allow_list,
            json,
        } => {
            let raw = std::fs::read_to_string(&input)?;
            let messages: Vec<RawMessage> = serde_json::from_str(&raw)?;
            let candidates = messages
                .iter()
                .filter_map(|m| match normalize_message(m) {
                    Ok(c) => Some(c),
                    Err(err) => {
                        eprintln!("skipping {}: {err}", m.id);
                        None
                    }
                })
                .collect();
            let store = match allow_list {
                Some(path) => AllowList::load(path)?,
                None => AllowList::new(),
            };
            let (newsletters, counts) = annotate(candidates, &store);

            if json {
                println!("{}", serde_json::to_string_pretty(&newsletters)?);
            } else {
                for (idx, n) in newsletters.iter().enumerate() {
                    println!(
                        "{}. [{}] {} <{}>",
                        idx + 1,
                        n.difficulty,
                        n.candidate.sender_name,
                        n.candidate.sender_email
                    );
                    println!("   Subject: {}", n.candidate.subject);
                    if let Some(link) = &n.candidate.unsubscribe_link {
                        println!("   Link: {link}");
                    }
                }
                println!(
                    "easy: {}, medium: {}, hard: {}, whitelisted: {}",
                    counts.easy, counts.medium, counts.hard, counts.whitelisted
                );
            }
        }
        Commands::ParseHeader { value } => match parse_unsubscribe_header(&value) {
            Some(link) => println!("{link}"),
            None => println!("No unsubscribe link found."),
        },
        Commands::Unsubscribe { link, strict } => {
            config.optimistic_completion = !strict;
            let client = build_client(config)?;
            if !client.has_browser() {
                eprintln!("browser fallback disabled (build with --features chromium)");
            }
            let outcome = client.unsubscribe(Some(&link)).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Allow { path, action } => {
            let mut list = AllowList::load(&path)?;
            match action {
                AllowAction::Add { email, name } => {
                    if list.add(&email, name.as_deref()) {
                        list.save(&path)?;
                        println!("Added {email}");
                    } else {
                        println!("{email} is already on the allow-list");
                    }
                }
                AllowAction::Remove { email } => {
                    if list.remove(&email) {
                        list.save(&path)?;
                        println!("Removed {email}");
                    } else {
                        println!("{email} was not on the allow-list");
                    }
                }
                AllowAction::List => {
                    println!("{} sender(s)", list.count());
                    for entry in list.list() {
                        println!(
                            "{} ({}) added {}",
                            entry.sender_email,
                            entry.sender_name.as_deref().unwrap_or("-"),
                            entry.added_date.format("%Y-%m-%d")
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(feature = "chromium")]
fn build_client(config: Config) -> Result<UnsubscribeClient, Error> {
    use std::sync::Arc;
    use unsubscribe_engine::browser::chromium::ChromiumLauncher;
    use unsubscribe_engine::SessionPool;

    let mut launcher = ChromiumLauncher::new(&config);
    if let Ok(path) = std::env::var("CHROME_PATH") {
        launcher = launcher.executable(path);
    }
    let launcher = Arc::new(launcher);
    UnsubscribeClient::builder()
        .config(config)
        .browser_pool(SessionPool::new(launcher))
        .build()
}

#[cfg(not(feature = "chromium"))]
fn build_client(config: Config) -> Result<UnsubscribeClient, Error> {
    UnsubscribeClient::new(Some(config))
}
