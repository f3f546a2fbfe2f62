use anyhow::Result;
use autobranch::App;
use autobranch::Config;
use autobranch::Issue;
use autobranch::Pipeline;
use autobranch::clients::openai::OpenAiClient;
use autobranch::gateway::RepoGateway;
use autobranch::ignore::IgnoreFilter;
use autobranch::ledger::IssueLedger;
use autobranch::logging::setup_logging;
use autobranch::pipeline::PipelineSettings;
use autobranch::remote::Remote;
use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "autobranch")]
#[command(about = "Turn open issues into pushed branches of generated file changes", long_about = None)]
pub struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process open issues that are not in the ledger yet (default)
    Poll {
        /// Do a single pass instead of polling on an interval
        #[arg(long)]
        once: bool,
    },
    /// Process a single issue
    Handle {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        body: String,
        /// Issue identifier used in the commit message
        #[arg(long, default_value = "manual")]
        id: String,
    },
    /// List open issues
    Issues,
    /// Print the snapshot sent to the generator
    Snapshot {
        /// Include the file contents
        #[arg(long)]
        content: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    setup_logging()?;

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let remote = Remote::from_config(&config.remote, config.git_timeout);
    let gateway = RepoGateway::clone_or_reuse(
        &remote.clone_url(),
        remote.secret(),
        &config.local_path,
        &config.base_branch,
        config.git_timeout,
        config.identity.clone(),
    )
    .await?
    .with_filter(IgnoreFilter::new(&config.ignore, &config.asset_extensions))
    .with_max_file_bytes(config.max_file_bytes);

    let generator = OpenAiClient::new(config.generator.clone(), config.generator_timeout);
    let pipeline = Pipeline::new(gateway, generator, PipelineSettings::from_config(&config));
    let ledger = IssueLedger::load(&config.ledger_path).await?;
    let app = App::new(remote, pipeline, ledger, config.poll_interval).with_json(cli.json);

    let stdout = &mut std::io::stdout();
    match cli.command {
        Some(Commands::Poll { once }) => app.cmd_poll(once, stdout).await?,
        Some(Commands::Handle { title, body, id }) => {
            app.cmd_handle(&Issue::new(id, title, body), stdout).await?;
        }
        Some(Commands::Issues) => app.cmd_issues(stdout).await?,
        Some(Commands::Snapshot { content }) => app.cmd_snapshot(content, stdout).await?,
        None => app.cmd_poll(false, stdout).await?,
    }

    Ok(())
}
