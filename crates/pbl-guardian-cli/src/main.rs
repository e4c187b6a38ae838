//! PBL Guardian - per-commit integrity and progress evaluation
//!
//! The `pbl-guardian` command runs in a team's CI job on every push.
//!
//! ## Commands
//!
//! - `evaluate`: Evaluate one commit and publish its report
//! - `peer-scan`: Compare every team submission against its siblings
//! - `validate-config`: Check a team config file

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use pbl_guardian_domain::{Submission, TeamConfig, Verdict};
use pbl_guardian_engine::collaborators::corpus::FsCorpusProvider;
use pbl_guardian_engine::collaborators::git::{changed_files, commit_metadata, head_sha, GitHistory};
use pbl_guardian_engine::collaborators::peer_store::{
    load_submission, load_submissions, run_peer_scan, FsPeerScanStore,
};
use pbl_guardian_engine::collaborators::proofs::ChangedFilesProofChecker;
use pbl_guardian_engine::collaborators::quality::PylintChecker;
use pbl_guardian_engine::collaborators::search::GitHubCodeSearch;
use pbl_guardian_engine::collaborators::similarity::{CommandSimilarityTool, FingerprintSimilarity};
use pbl_guardian_engine::collaborators::sink::FsReportSink;
use pbl_guardian_engine::collaborators::{PeerScanSnapshot, PeerScanStore, SimilarityTool};
use pbl_guardian_engine::{
    init_tracing, load_tree, Collaborators, EvaluationContext, EvaluationPipeline, HistoryRange,
    LanguageProfile,
};
use tracing::{info, warn, Level};

const DEFAULT_CONFIG: &str = ".pbl/config.json";

#[derive(Parser)]
#[command(name = "pbl-guardian")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Per-commit integrity and progress evaluation for PBL teams", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one commit and publish the report
    Evaluate(EvaluateArgs),

    /// Compare every team submission against its siblings and store the
    /// snapshot read by the peer layer
    PeerScan {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// This team's source tree
        #[arg(long, default_value = ".")]
        source_dir: PathBuf,

        /// Directory with one sub-directory per sibling team submission
        #[arg(long)]
        peers_dir: PathBuf,

        /// Where to write the snapshot
        #[arg(short, long, default_value = ".pbl/peer-scan.json")]
        output: PathBuf,
    },

    /// Load and validate a team config
    ValidateConfig {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Print the effective config, defaults included, as JSON
        #[arg(long)]
        show: bool,
    },
}

#[derive(clap::Args, Debug)]
struct EvaluateArgs {
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Commit to evaluate (default: HEAD of --repo)
    #[arg(long, env = "GITHUB_SHA")]
    sha: Option<String>,

    /// Commit timestamp, RFC 3339 (default: read from git)
    #[arg(long, env = "COMMIT_TIMESTAMP")]
    timestamp: Option<String>,

    /// Commit author (default: read from git)
    #[arg(long, env = "COMMIT_AUTHOR")]
    author: Option<String>,

    /// Checked-out source tree
    #[arg(long, default_value = ".")]
    source_dir: PathBuf,

    /// Git repository holding the team history
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Previous evaluated commit; history before it is ignored
    #[arg(long)]
    since: Option<String>,

    /// Reference corpus root, one sub-directory per reference repository
    #[arg(long)]
    reference_dir: Option<PathBuf>,

    /// Latest peer scan snapshot
    #[arg(long)]
    peer_scan: Option<PathBuf>,

    /// External comparison program used instead of the built-in
    /// fingerprinting; `{subject}` and `{corpus}` in --similarity-arg are
    /// replaced with directories
    #[arg(long)]
    similarity_tool: Option<String>,

    #[arg(long = "similarity-arg", allow_hyphen_values = true)]
    similarity_args: Vec<String>,

    /// Where rendered reports are kept, one file pair per commit
    #[arg(long, default_value = ".pbl/reports")]
    report_dir: PathBuf,

    /// Token for public code search; L3 is skipped without it
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Also write the full JSON report here
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Evaluate(args) => cmd_evaluate(&args).await,
        Commands::PeerScan {
            config,
            source_dir,
            peers_dir,
            output,
        } => cmd_peer_scan(&config, &source_dir, &peers_dir, &output)
            .await
            .map(|_| ExitCode::SUCCESS),
        Commands::ValidateConfig { config, show } => {
            cmd_validate_config(&config, show).map(|_| ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("pbl-guardian: fatal: {:#}", err);
            ExitCode::from(2)
        }
    }
}

/// Evaluate one commit. Exit code 1 means the report verdict is fail.
async fn cmd_evaluate(args: &EvaluateArgs) -> Result<ExitCode> {
    let config = TeamConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {:?}", args.config))?;
    let submission = build_submission(args).await?;
    info!(
        team = %config.team_id,
        commit = %submission.short_sha(),
        files = submission.tree.files.len(),
        "evaluating commit"
    );

    let collaborators = build_collaborators(args, &config)?;
    let mut ctx = EvaluationContext::new(Arc::new(submission), Arc::new(config), collaborators)
        .context("Failed to prepare evaluation")?;
    if let Some(since) = &args.since {
        let until = ctx.submission.commit_sha.clone();
        ctx = ctx.with_history_range(HistoryRange::between(since.clone(), until));
    }

    let pipeline =
        EvaluationPipeline::standard().with_sink(Arc::new(FsReportSink::new(&args.report_dir)));
    let result = pipeline.run(ctx).await.context("Evaluation aborted")?;

    println!("{}", result.rendered.markdown);
    if let Some(path) = &args.output {
        std::fs::write(path, &result.rendered.json)
            .with_context(|| format!("Failed to write report JSON to {:?}", path))?;
    }
    if let Some(outcome) = result.publish {
        info!(outcome = %outcome, dir = %args.report_dir.display(), "report stored");
    }

    Ok(if result.report.verdict == Verdict::Fail {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

async fn build_submission(args: &EvaluateArgs) -> Result<Submission> {
    let sha = match &args.sha {
        Some(sha) => sha.trim().to_string(),
        None => head_sha(&args.repo)
            .await
            .context("Failed to resolve HEAD; pass --sha")?,
    };

    let (author, timestamp) = match (&args.author, &args.timestamp) {
        (Some(author), Some(ts)) => (author.clone(), parse_timestamp(ts)?),
        (author, ts) => {
            let (git_author, git_ts) = commit_metadata(&args.repo, &sha)
                .await
                .with_context(|| format!("Failed to read metadata of commit {}", sha))?;
            let timestamp = match ts {
                Some(ts) => parse_timestamp(ts)?,
                None => git_ts,
            };
            (author.clone().unwrap_or(git_author), timestamp)
        }
    };

    let changed = changed_files(&args.repo, &sha)
        .await
        .with_context(|| format!("Failed to list files changed by {}", sha))?;
    let tree = load_tree(&args.source_dir)
        .with_context(|| format!("Failed to read source tree {:?}", args.source_dir))?;
    if tree.skipped_files > 0 {
        info!(skipped = tree.skipped_files, "binary or oversized files not loaded");
    }

    Ok(Submission {
        commit_sha: sha,
        author,
        timestamp,
        changed_files: changed,
        tree,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .with_context(|| format!("Commit timestamp {:?} is not RFC 3339", raw))
}

fn build_collaborators(args: &EvaluateArgs, config: &TeamConfig) -> Result<Collaborators> {
    let similarity: Arc<dyn SimilarityTool> = match &args.similarity_tool {
        Some(program) => Arc::new(CommandSimilarityTool::new(
            program.clone(),
            args.similarity_args.clone(),
        )),
        None => Arc::new(FingerprintSimilarity::default()),
    };

    let mut collaborators = Collaborators::new()
        .with_history(Arc::new(GitHistory::new(&args.repo)))
        .with_quality(Arc::new(
            PylintChecker::new(&args.source_dir).with_repo(&args.repo),
        ))
        .with_proofs(Arc::new(
            ChangedFilesProofChecker::new().with_repo_root(&args.source_dir),
        ))
        .with_similarity(similarity);

    if let Some(dir) = &args.reference_dir {
        collaborators = collaborators.with_corpus(Arc::new(FsCorpusProvider::new(dir)));
    }
    if let Some(path) = &args.peer_scan {
        collaborators = collaborators.with_peer_scans(Arc::new(FsPeerScanStore::new(path)));
    }
    match args.github_token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => {
            let search = GitHubCodeSearch::new(token)
                .context("Failed to build code search client")?
                .with_language(config.language.clone());
            collaborators = collaborators.with_code_search(Arc::new(search));
        }
        _ => info!("no GitHub token; public code search will be skipped"),
    }
    Ok(collaborators)
}

/// Scan this team against every sibling and store the snapshot.
async fn cmd_peer_scan(
    config_path: &Path,
    source_dir: &Path,
    peers_dir: &Path,
    output: &Path,
) -> Result<PeerScanSnapshot> {
    let config = TeamConfig::load(config_path)
        .with_context(|| format!("Failed to load config {:?}", config_path))?;
    let profile = LanguageProfile::for_language(&config.language)
        .with_context(|| format!("No language profile for {:?}", config.language))?;

    let own = load_submission(config.team_id.clone(), source_dir, profile)
        .with_context(|| format!("Failed to read source tree {:?}", source_dir))?;
    let mut submissions = vec![own];
    let siblings = load_submissions(peers_dir, profile)
        .with_context(|| format!("Failed to read peer submissions in {:?}", peers_dir))?;
    for sibling in siblings {
        if sibling.id == config.team_id {
            warn!(team = %sibling.id, "own submission found among peers; ignoring it");
            continue;
        }
        submissions.push(sibling);
    }

    let snapshot = run_peer_scan(&submissions, &FingerprintSimilarity::default())
        .await
        .context("Peer comparison failed")?;
    FsPeerScanStore::new(output)
        .save(&snapshot)
        .await
        .with_context(|| format!("Failed to write snapshot to {:?}", output))?;

    println!(
        "Peer scan: {} submissions compared, snapshot written to {}",
        snapshot.entries.len(),
        output.display()
    );
    for entry in &snapshot.entries {
        println!(
            "  {:<16} max similarity {:>5.1}% ({} peers)",
            entry.team_id, entry.report.max_percentage, entry.peers_compared
        );
    }
    Ok(snapshot)
}

fn cmd_validate_config(path: &Path, show: bool) -> Result<TeamConfig> {
    let config =
        TeamConfig::load(path).with_context(|| format!("Invalid config {:?}", path))?;

    println!("✓ {} is valid", path.display());
    println!("Team: {} ({})", config.display_name(), config.team_id);
    println!("Timezone: {}", config.timezone);
    println!("Language: {}", config.language);
    if !config.class_days.is_empty() {
        println!("Class days: {}", config.class_days.join(", "));
    }
    let milestones = config.resolved_milestones()?;
    if milestones.is_empty() {
        println!("Milestones: none (timing always passes)");
    } else {
        println!("Milestones:");
        for (milestone, deadline) in &milestones {
            println!("  - {}: {}", milestone.phase, deadline.format("%Y-%m-%d %H:%M %Z"));
        }
    }
    println!(
        "Thresholds: similarity {}%, quality {}/10, contribution {}%",
        config.plagiarism_threshold, config.min_quality_score, config.min_contribution_pct
    );

    if show {
        println!("{}", serde_json::to_string_pretty(&config)?);
    }
    Ok(config)
}
