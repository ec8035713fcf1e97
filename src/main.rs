use anyhow::{Context, Result};
use clap::Parser;
use debt_guardian::autofix::AutoFixer;
use debt_guardian::cache::{open_store, CacheStore, MemoryStore, StoreBackend};
use debt_guardian::config::Config;
use debt_guardian::github::{parse_repo_url, GitHubClient, RepoMetadata};
use debt_guardian::interest::InterestCalculator;
use debt_guardian::llm::{Backend, OpenRouterClient, Unavailable};
use debt_guardian::pipeline::{AnalysisInput, DetectionInput, Guardian};
use debt_guardian::report::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const HISTORY_LIMIT: usize = 10;

#[derive(Parser, Debug)]
#[command(
    name = "debt-guardian",
    about = "Rank technical debt, propose fixes and open guarded fix PRs",
    version
)]
struct Args {
    /// Detector output: a JSON array of issues, or {repo_metadata, files_scanned, issues}
    #[arg(long)]
    issues: Option<PathBuf>,

    /// GitHub repository (https://github.com/owner/repo, git@github.com:owner/repo.git or owner/repo)
    #[arg(long)]
    repo: Option<String>,

    #[arg(long, default_value = "main")]
    branch: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Rich)]
    format: OutputFormat,

    /// How many top-ranked issues get a fix proposal (defaults to the config value)
    #[arg(long)]
    top: Option<usize>,

    /// Rule-based ranking and template/fallback fixes only
    #[arg(long)]
    no_ai: bool,

    /// Use the in-memory cache instead of SQLite
    #[arg(long)]
    memory_store: bool,

    /// Write the full JSON report to the current directory
    #[arg(long)]
    save: bool,

    /// Price the cost of waiting from the repository's commit history
    #[arg(long)]
    interest: bool,

    /// Open fix pull requests for the top proposals
    #[arg(long)]
    auto_fix: bool,

    #[arg(long, default_value_t = 3)]
    max_prs: usize,

    /// Plan pull requests without creating them
    #[arg(long)]
    dry_run: bool,

    /// Show past analyses of --repo and exit
    #[arg(long)]
    history: bool,

    /// Store an OpenRouter API key in the system keychain and exit
    #[arg(long, value_name = "KEY")]
    set_key: Option<String>,

    /// Store a GitHub token in the system keychain and exit
    #[arg(long, value_name = "TOKEN")]
    set_github_token: Option<String>,
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_cache(config: &Config, memory: bool) -> Box<dyn CacheStore> {
    let backend = if memory {
        StoreBackend::Memory
    } else {
        config.store
    };
    let path = config.resolved_database_path();
    match open_store(backend, &path) {
        Ok(store) => store,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "falling back to in-memory cache");
            Box::new(MemoryStore::new())
        }
    }
}

fn llm_backend(config: &Config, no_ai: bool) -> Backend {
    if no_ai {
        return Backend::Disabled(Unavailable);
    }
    match OpenRouterClient::from_config(config) {
        Ok(client) => Backend::OpenRouter(client),
        Err(err) => {
            tracing::warn!(error = %err, "AI disabled; using rule-based ranking");
            Backend::Disabled(Unavailable)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let config = Config::load();

    if let Some(key) = args.set_key.as_deref() {
        let key = key.trim();
        if !Config::validate_api_key_format(key) {
            anyhow::bail!("OpenRouter keys start with 'sk-'");
        }
        config.set_api_key(key)?;
        eprintln!("+ API key saved to system keychain");
        return Ok(());
    }
    if let Some(token) = args.set_github_token.as_deref() {
        config.set_github_token(token.trim())?;
        eprintln!("+ GitHub token saved to system keychain");
        return Ok(());
    }

    let repo_ref = match args.repo.as_deref() {
        Some(url) => Some(
            parse_repo_url(url).with_context(|| format!("Cannot parse GitHub repository: {url}"))?,
        ),
        None => None,
    };
    let repo_url = args.repo.clone().unwrap_or_else(|| "local".to_string());

    let store = open_cache(&config, args.memory_store);
    let llm = llm_backend(&config, args.no_ai);
    let mut guardian = Guardian::new(store, llm, args.top.unwrap_or(config.fix_limit));

    if args.history {
        let entries = guardian.history(&repo_url, HISTORY_LIMIT)?;
        if entries.is_empty() {
            println!("No analysis history for {repo_url}");
        }
        for entry in entries {
            println!(
                "{}  {:<10} issues {:>4}  critical {:>3}  high {:>3}",
                entry.analyzed_at.format("%Y-%m-%d %H:%M"),
                entry.branch,
                entry.total_issues,
                entry.critical,
                entry.high
            );
        }
        return Ok(());
    }

    let issues_path = args
        .issues
        .as_deref()
        .context("--issues <file.json> is required")?;
    let raw = std::fs::read_to_string(issues_path)
        .with_context(|| format!("Failed to read {}", issues_path.display()))?;
    let detection = DetectionInput::from_json(&raw)
        .with_context(|| format!("Failed to parse detector output in {}", issues_path.display()))?;

    let github = match &repo_ref {
        Some(repo) => Some(GitHubClient::from_config(repo.clone(), &config)?),
        None => None,
    };
    let repo_metadata = match (detection.repo_metadata, &github) {
        (Some(meta), _) => meta,
        (None, Some(client)) => client
            .fetch_repo_metadata()
            .await
            .context("Failed to load repository metadata")?,
        (None, None) => RepoMetadata::default(),
    };

    let input = AnalysisInput {
        repo_url,
        branch: args.branch.clone(),
        repo_metadata,
        files_scanned: detection.files_scanned,
        issues: detection.issues,
    };
    let mut outcome = guardian.analyze(input).await;

    if args.interest {
        let client = github.as_ref().context("--interest needs --repo")?;
        guardian
            .price_interest(&InterestCalculator::new(client), &mut outcome)
            .await;
    }

    if args.auto_fix {
        let client = github
            .as_ref()
            .context("--auto-fix needs --repo")?;
        let mut settings = config.autofix.clone();
        settings.dry_run |= args.dry_run;
        if !settings.dry_run && config.get_github_token().is_none() {
            anyhow::bail!("--auto-fix needs a GitHub token (set GITHUB_TOKEN or use --set-github-token)");
        }
        let mut fixer = AutoFixer::new(client, settings);
        guardian.auto_fix(&mut fixer, &mut outcome, args.max_prs).await;
    }

    println!("{}", outcome.report.render(args.format)?);

    if args.save {
        let path = PathBuf::from(format!(
            "debt-report-{}.json",
            outcome.report.generated_at.format("%Y%m%d-%H%M%S")
        ));
        let json = outcome.report.render(OutputFormat::Json)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("+ Report saved to {}", path.display());
    }

    if let Ok(stats) = guardian.cache_stats() {
        tracing::debug!(
            keys = stats.total_keys,
            hit_rate = stats.hit_rate,
            "cache stats"
        );
    }

    Ok(())
}
