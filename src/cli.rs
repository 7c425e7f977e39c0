use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Token;
use crate::config::Config;
use crate::history::{update_statistics, HistoryRepository, JsonFileStore};
use crate::metrics::MetricsClient;
use crate::notify::{
    should_send_message_to_channel, AlertNotifier, Delivery, JobLinks, JobOwners, Routing,
    SlackNotifier,
};
use crate::output::{self, CheckOverview, PhaseProgress};
use crate::package::{self, PackageTags};
use crate::providers::{local, GitLabProvider};
use crate::smp::{self, Experiment, ExperimentKind};

#[derive(Parser)]
#[command(name = "pipewatch")]
#[command(
    author,
    version,
    about = "CI failure history and release gates",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./pipewatch.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Args, Default)]
struct JsonOutput {
    /// Write JSON output to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, default_value_t = false)]
    pretty: bool,
}

impl JsonOutput {
    fn render(&self, value: &impl Serialize) -> Result<String> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        })
    }

    /// Writes `value` to the output file, or to stdout without one.
    fn write(&self, value: &impl Serialize, what: &str) -> Result<()> {
        let json_output = self.render(value)?;

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)
                .with_context(|| format!("Failed to write {what}: {}", output_path.display()))?;
            info!("{what} written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record a pipeline's failures and alert on jobs that keep failing
    CheckFailures(CheckFailuresArgs),

    /// Show the stored job history
    History {
        #[arg(short = 'P', long, env = "CI_PROJECT_PATH")]
        project: Option<String>,

        /// History file
        #[arg(long)]
        history: Option<PathBuf>,

        /// Print the raw history as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        json_output: JsonOutput,
    },

    /// Fail when a package grew more than allowed since the last stable release
    CompareSize {
        /// Pattern of the freshly built package
        #[arg(long)]
        new_package: String,

        /// Pattern of the last stable package
        #[arg(long)]
        stable_package: String,

        /// deb, rpm, suse-rpm...
        #[arg(long)]
        package_type: String,

        /// Version of the stable package, for the report
        #[arg(long)]
        last_stable: String,

        /// Maximum allowed increase in bytes
        #[arg(long)]
        threshold: Option<u64>,
    },

    /// Measure a package and submit its size series to Datadog
    SendSize(SendSizeArgs),

    /// Single-machine-performance experiments
    Smp {
        #[command(subcommand)]
        command: SmpCommands,
    },
}

#[derive(Args)]
struct CheckFailuresArgs {
    #[arg(short = 'P', long, env = "CI_PROJECT_PATH")]
    project: Option<String>,

    #[arg(long, env = "CI_PIPELINE_ID")]
    pipeline_id: u64,

    #[arg(short, long, env = "GITLAB_TOKEN")]
    token: Option<String>,

    /// GitLab instance base URL
    #[arg(short, long)]
    url: Option<String>,

    /// Read the failed jobs from a JSON file instead of GitLab
    #[arg(long)]
    failures_file: Option<PathBuf>,

    /// History file
    #[arg(long)]
    history: Option<PathBuf>,

    /// JOBOWNERS file
    #[arg(long)]
    owners: Option<PathBuf>,

    #[arg(short, long, env = "CI_COMMIT_BRANCH")]
    branch: Option<String>,

    /// Slack incoming webhook
    #[arg(long, env = "SLACK_WEBHOOK_URL")]
    webhook: Option<String>,

    /// Print the alerts instead of sending them
    #[arg(long, default_value_t = false)]
    print_to_stdout: bool,

    /// Do not write the updated history
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    #[command(flatten)]
    json_output: JsonOutput,
}

#[derive(Args)]
struct SendSizeArgs {
    /// agent, iot-agent, dogstatsd...
    #[arg(long)]
    flavor: String,

    #[arg(long)]
    package_os: String,

    #[arg(long)]
    package_path: PathBuf,

    #[arg(long)]
    major_version: String,

    #[arg(long, env = "CI_COMMIT_REF_NAME")]
    git_ref: String,

    #[arg(long)]
    bucket_branch: String,

    #[arg(long)]
    arch: String,

    #[arg(long, env = "DD_API_KEY")]
    api_key: Option<String>,

    /// Datadog API site (defaults to [metrics] api-url)
    #[arg(long)]
    api_url: Option<String>,

    /// Print the series without submitting them
    #[arg(long, default_value_t = false)]
    no_send: bool,

    #[command(flatten)]
    json_output: JsonOutput,
}

#[derive(Subcommand)]
enum SmpCommands {
    /// List the available experiments
    List {
        #[arg(value_enum)]
        kind: ExperimentKind,
    },

    /// Build the agent image and run one experiment locally
    #[command(group(
        clap::ArgGroup::new("experiment")
            .required(true)
            .args(["workload_experiment", "regression_experiment"]),
    ))]
    Run {
        #[arg(long)]
        workload_experiment: Option<String>,

        #[arg(long)]
        regression_experiment: Option<String>,

        /// Extra arguments appended to `smp local-run`
        #[arg(long, allow_hyphen_values = true)]
        extra_smp_args: Option<String>,

        #[arg(long, default_value_t = false)]
        skip_build: bool,
    },
}

fn history_store(
    config: &Config,
    flag: Option<&Path>,
    project: Option<&str>,
) -> Result<JsonFileStore> {
    let window_size = config.tracker.window_size;

    if let Some(path) = flag.or(config.history.path.as_deref()) {
        return Ok(JsonFileStore::new(path, window_size));
    }

    let project = project.context("No history file or project given; use --history or --project")?;
    Ok(JsonFileStore::for_project(project, window_size)?)
}

impl Cli {
    async fn execute_check_failures(&self, config: &Config, args: &CheckFailuresArgs) -> Result<()> {
        let settings = &config.tracker;
        let project = args
            .project
            .clone()
            .or_else(|| config.gitlab.project_path.clone())
            .context("No project given; use --project or CI_PROJECT_PATH")?;
        let base_url = args.url.as_deref().unwrap_or(&config.gitlab.base_url);

        info!("Checking failures of pipeline {} for project: {project}", args.pipeline_id);

        let repository = history_store(config, args.history.as_deref(), Some(&project))?;
        let mut store = repository
            .retrieve()
            .with_context(|| format!("Failed to load history: {}", repository.path().display()))?;

        if store.pipeline_id > args.pipeline_id {
            warn!(
                "Pipeline {} is older than the last recorded pipeline {}, skipping",
                args.pipeline_id, store.pipeline_id
            );
            return Ok(());
        }

        let progress = PhaseProgress::start();

        let failures = match &args.failures_file {
            Some(path) => local::load_failed_jobs(path)?,
            None => {
                let token = args
                    .token
                    .clone()
                    .or_else(|| config.gitlab.token.clone())
                    .map(Token::from);
                let provider = GitLabProvider::new(base_url, project.clone(), token)?
                    .with_retry_policy(
                        config.gitlab.max_retries,
                        Duration::from_secs(config.gitlab.retry_delay_seconds),
                    );
                provider.failed_jobs(args.pipeline_id).await?
            }
        };
        if failures.is_empty() {
            info!("No failed jobs in pipeline {}", args.pipeline_id);
        }
        for job in failures.all_failures() {
            debug!("Failed job {} ({}) in stage {}", job.name, job.id, job.stage);
        }
        let progress = progress.advance();

        store.pipeline_id = args.pipeline_id;
        let (alerts, mut store) = update_statistics(store, failures.executions(), settings);
        store.updated_at = Some(Utc::now());
        let progress = progress.advance();

        let channel_worthy = args.branch.as_deref().map_or(true, |branch| {
            should_send_message_to_channel(branch, &config.notify.default_branch)
        });

        if channel_worthy {
            let notifier = self.notifier(config, args, &project, base_url)?;
            let sent = notifier.send_notification(&alerts).await?;
            info!("{sent} alert message(s) handled");
        } else if !alerts.is_empty() {
            info!(
                "Branch {} does not alert team channels, skipping notification",
                args.branch.as_deref().unwrap_or_default()
            );
        }
        progress.finish();

        if args.dry_run {
            info!("Dry run, history not written");
        } else {
            repository.save(&store)?;
            info!("History written to: {}", repository.path().display());
        }

        let overview = CheckOverview {
            project: &project,
            pipeline_id: args.pipeline_id,
            failed_jobs: failures.len(),
            store: &store,
            alerts: &alerts,
            settings,
        };
        output::print_check_summary(&overview);

        if args.json_output.output.is_some() {
            args.json_output.write(&overview, "Report")?;
        }

        Ok(())
    }

    fn notifier(
        &self,
        config: &Config,
        args: &CheckFailuresArgs,
        project: &str,
        base_url: &str,
    ) -> Result<AlertNotifier> {
        let owners = match args.owners.as_deref().or(config.notify.owners_file.as_deref()) {
            Some(path) => JobOwners::load(path)?,
            None => JobOwners::default(),
        };
        if owners.is_empty() {
            info!(
                "No job owners rules, alerts go to {}",
                config.notify.default_channel
            );
        }

        let routing = Routing {
            owners,
            default_owner: config.notify.default_owner.clone(),
            channels: config.notify.channels.clone(),
            default_channel: config.notify.default_channel.clone(),
        };

        let webhook = args.webhook.as_deref().or(config.notify.webhook_url.as_deref());
        let delivery = match webhook {
            Some(url) if !args.print_to_stdout => Delivery::Slack(SlackNotifier::new(url)?),
            _ => Delivery::Stdout,
        };

        let links = config.notify.include_links.then(|| JobLinks {
            base_url: base_url.to_string(),
            project_path: project.to_string(),
        });

        Ok(AlertNotifier::new(
            delivery,
            routing,
            config.tracker.clone(),
            links,
        ))
    }

    fn execute_history(
        &self,
        config: &Config,
        project: Option<&str>,
        history: Option<&Path>,
        json: bool,
        json_output: &JsonOutput,
    ) -> Result<()> {
        let project = project.or(config.gitlab.project_path.as_deref());
        let repository = history_store(config, history, project)?;
        let store = repository.retrieve()?;

        if json || json_output.output.is_some() {
            json_output.write(&store, "History")
        } else {
            output::print_history(&store, &config.tracker);
            Ok(())
        }
    }

    async fn execute_compare_size(
        &self,
        config: &Config,
        new_package: &str,
        stable_package: &str,
        package_type: &str,
        last_stable: &str,
        threshold: Option<u64>,
    ) -> Result<()> {
        let threshold = threshold
            .or(config.package.threshold)
            .context("No size threshold given; use --threshold or [package] threshold")?;

        let comparison = package::compare_size(
            new_package,
            stable_package,
            package_type,
            last_stable,
            threshold,
        )
        .await?;

        let passed = !comparison.is_too_large();
        println!("{}", output::verdict(comparison.report(), passed));

        if !passed {
            bail!("{package_type} size increase is too large");
        }

        Ok(())
    }

    async fn execute_send_size(&self, config: &Config, args: &SendSizeArgs) -> Result<()> {
        let tags = PackageTags {
            flavor: args.flavor.clone(),
            package_os: args.package_os.clone(),
            major_version: args.major_version.clone(),
            git_ref: args.git_ref.clone(),
            bucket_branch: args.bucket_branch.clone(),
            arch: args.arch.clone(),
        };

        let series = package::compute_package_size_metrics(
            &args.package_path,
            &tags,
            Utc::now().timestamp(),
        )
        .await?;
        args.json_output.write(&series, "Series")?;

        if args.no_send {
            info!("Series not sent");
            return Ok(());
        }

        let api_key = args
            .api_key
            .clone()
            .or_else(|| config.metrics.api_key.clone())
            .map(Token::from)
            .context("No Datadog API key; use --api-key, DD_API_KEY or [metrics] api-key")?;
        let api_url = args.api_url.as_deref().unwrap_or(&config.metrics.api_url);

        MetricsClient::new(api_url, api_key)?.send(&series).await?;
        Ok(())
    }

    async fn execute_smp(&self, config: &Config, command: &SmpCommands) -> Result<()> {
        let repo_root = &config.smp.repo_root;

        match command {
            SmpCommands::List { kind } => {
                let cases = smp::list_experiments(repo_root, *kind)?;
                println!(
                    "{} experiments are located in {}, options:",
                    output::cyan(kind),
                    output::dim(kind.cases_dir(repo_root).display())
                );
                for case in cases {
                    println!("{case}");
                }
                Ok(())
            }
            SmpCommands::Run {
                workload_experiment,
                regression_experiment,
                extra_smp_args,
                skip_build,
            } => {
                let experiment = Experiment::from_options(
                    workload_experiment.clone(),
                    regression_experiment.clone(),
                )?;
                let extra_args: Vec<String> = extra_smp_args
                    .as_deref()
                    .map(|args| args.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();

                smp::local_run(
                    repo_root,
                    &experiment,
                    extra_args,
                    config.smp.build_command.as_deref(),
                    *skip_build,
                )
                .await?;

                info!(
                    "Experiment {} finished",
                    output::bright_yellow(&experiment.name)
                );
                Ok(())
            }
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::CheckFailures(args) => self.execute_check_failures(&config, args).await,
            Commands::History {
                project,
                history,
                json,
                json_output,
            } => self.execute_history(
                &config,
                project.as_deref(),
                history.as_deref(),
                *json,
                json_output,
            ),
            Commands::CompareSize {
                new_package,
                stable_package,
                package_type,
                last_stable,
                threshold,
            } => {
                self.execute_compare_size(
                    &config,
                    new_package,
                    stable_package,
                    package_type,
                    last_stable,
                    *threshold,
                )
                .await
            }
            Commands::SendSize(args) => self.execute_send_size(&config, args).await,
            Commands::Smp { command } => self.execute_smp(&config, command).await,
        }
    }
}
