//! `sidecar-sim`: run the experiment sidecar against an in-memory page

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use sidecar_agent::{
    ConfigSnapshot, JsonFileStore, MemoryHostPage, MemoryStore, SetupOutcome, Sidecar,
    SidecarParts, StableIdStore, StaticConfigProvider, TracingSink,
};
use sidecar_core::config::{ACTIVE_EXPERIMENTS_KEY, SIDECAR_CONFIG_NAME};
use sidecar_core::{
    matching_experiments, normalize_url, AgentConfig, BootstrapParams, EventSink,
    ExperimentDescriptor, HostPage,
};
use sidecar_dom::{Document, MemoryDocument, ReadyState};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn cli() -> Command {
    Command::new("sidecar-sim")
        .version(sidecar_agent::VERSION)
        .about("Run the experiment sidecar against an in-memory page")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Bootstrap the agent on a page and print the resulting document")
                .arg(
                    Arg::new("script-url")
                        .long("script-url")
                        .required(true)
                        .help("Hosting script src, e.g. https://cdn/sidecar.js?apikey=..."),
                )
                .arg(
                    Arg::new("page")
                        .long("page")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("HTML file to load"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON snapshot of the remote configuration"),
                )
                .arg(
                    Arg::new("href")
                        .long("href")
                        .default_value("https://localhost/")
                        .help("Location of the simulated page"),
                )
                .arg(
                    Arg::new("user-agent")
                        .long("user-agent")
                        .default_value("")
                        .help("User agent of the simulated browser"),
                )
                .arg(
                    Arg::new("language")
                        .long("language")
                        .default_value("en-US")
                        .help("Browser language"),
                )
                .arg(
                    Arg::new("nonce")
                        .long("nonce")
                        .help("CSP nonce of the hosting script"),
                )
                .arg(
                    Arg::new("state")
                        .long("state")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON file persisting the stable id between runs"),
                )
                .arg(
                    Arg::new("load-delay-ms")
                        .long("load-delay-ms")
                        .value_parser(value_parser!(u64))
                        .help("Start the page loading and make it interactive after this delay"),
                )
                .arg(
                    Arg::new("event")
                        .long("event")
                        .action(ArgAction::Append)
                        .help("Analytics event logged before setup (repeatable)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("match")
                .about("List the experiments matching a URL")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON snapshot of the remote configuration"),
                )
                .arg(
                    Arg::new("url")
                        .long("url")
                        .required(true)
                        .help("Page URL"),
                ),
        )
        .subcommand(
            Command::new("bootstrap")
                .about("Parse a hosting script URL")
                .arg(Arg::new("script-url").required(true).help("Script src")),
        )
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn read_snapshot(args: &ArgMatches) -> Result<ConfigSnapshot> {
    let path = args
        .get_one::<PathBuf>("config")
        .context("--config is required")?;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config snapshot {}", path.display()))?;
    ConfigSnapshot::from_json(&raw)
        .with_context(|| format!("parsing config snapshot {}", path.display()))
}

fn arg(args: &ArgMatches, name: &str) -> String {
    args.get_one::<String>(name).cloned().unwrap_or_default()
}

async fn run(args: &ArgMatches) -> Result<()> {
    let params = BootstrapParams::from_script_url(&arg(args, "script-url"))?;
    let mut config = AgentConfig::from_bootstrap(params);
    if let Some(nonce) = args.get_one::<String>("nonce") {
        config = config.with_nonce(nonce.clone());
    }

    let page_path = args.get_one::<PathBuf>("page").context("--page is required")?;
    let markup = std::fs::read_to_string(page_path)
        .with_context(|| format!("reading page {}", page_path.display()))?;
    let load_delay = args.get_one::<u64>("load-delay-ms").copied();
    let state = if load_delay.is_some() {
        ReadyState::Loading
    } else {
        ReadyState::Complete
    };
    let document = Arc::new(MemoryDocument::parse_with_state(&markup, state)?);
    if let Some(delay) = load_delay {
        let document = Arc::clone(&document);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            document.set_ready_state(ReadyState::Interactive);
        });
    }

    let page = Arc::new(
        MemoryHostPage::new(arg(args, "href"))
            .with_user_agent(arg(args, "user-agent"))
            .with_language(arg(args, "language")),
    );
    let store: Arc<dyn StableIdStore> = match args.get_one::<PathBuf>("state") {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };
    let sink = Arc::new(TracingSink::new());

    let agent = Sidecar::new(
        config,
        SidecarParts {
            document: Arc::clone(&document) as Arc<dyn Document>,
            page: Arc::clone(&page) as Arc<dyn HostPage>,
            provider: Arc::new(StaticConfigProvider::new(read_snapshot(args)?)),
            sink: Arc::clone(&sink) as Arc<dyn EventSink>,
            store,
        },
    );

    if let Some(events) = args.get_many::<String>("event") {
        for name in events {
            agent.log_event(name.clone(), Value::Null, BTreeMap::new());
        }
    }

    let outcome = agent.setup().await;
    let html = document.html();

    if args.get_flag("json") {
        let (status, experiments, report) = match &outcome {
            SetupOutcome::Completed {
                experiments,
                report,
            } => ("completed".to_string(), experiments.clone(), Some(*report)),
            SetupOutcome::AutoStartDisabled => ("autostart-disabled".to_string(), Vec::new(), None),
            SetupOutcome::ProviderFailed(e) => (format!("provider-failed: {e}"), Vec::new(), None),
        };
        let summary = serde_json::json!({
            "status": status,
            "experiments": experiments,
            "applied": report.map(|r| r.applied),
            "failed": report.map(|r| r.failed),
            "events_sent": sink.sent().len(),
            "navigations": page.navigations(),
            "html": html,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Outcome: {outcome:?}");
        println!("Events sent: {}", sink.sent().len());
        for url in page.navigations() {
            println!("Navigated: {url}");
        }
        println!();
        println!("{html}");
    }
    Ok(())
}

fn match_url(args: &ArgMatches) -> Result<()> {
    let snapshot = read_snapshot(args)?;
    let entries = snapshot
        .dynamic_configs
        .get(SIDECAR_CONFIG_NAME)
        .and_then(|config| config.get(ACTIVE_EXPERIMENTS_KEY))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let descriptors = ExperimentDescriptor::decode_list(entries);
    let url = normalize_url(&arg(args, "url"));
    for descriptor in matching_experiments(&descriptors, &url) {
        let marker = if descriptor.disable_auto_run { " (manual)" } else { "" };
        println!("{}{marker}", descriptor.id);
    }
    Ok(())
}

fn bootstrap(args: &ArgMatches) -> Result<()> {
    let params = BootstrapParams::from_script_url(&arg(args, "script-url"))?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("match", args)) => match_url(args),
        Some(("bootstrap", args)) => bootstrap(args),
        _ => Ok(()),
    }
}
