//! repl-article CLI Entry Point
//!
//! Subcommands:
//! - `add` - Add an article to a publication on one or more instances
//! - `profile save` / `profile list` - Manage named instance profiles
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

use repl_article::config::{self, ConfigError, ConfigLocation, StoredInstance};
use repl_article::engine::mssql::MssqlResolver;
use repl_article::{
    add_article, logging, ArticleRequest, CreationScriptOptions, Credential, ErrorEnvelope,
    ErrorInfo, ReportingMode, RunEnvelope, RunOptions,
};

/// repl-article - add replication articles to existing publications
#[derive(Parser)]
#[command(name = "repl-article")]
#[command(about = "Add replication articles to existing SQL Server publications")]
#[command(version)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an article to a publication
    Add(AddArgs),

    /// Manage named instance profiles
    #[command(subcommand)]
    Profile(ProfileCommands),
}

#[derive(Args)]
struct AddArgs {
    /// Target instance or profile name (repeatable)
    #[arg(long = "instance", short = 'S', required = true)]
    instances: Vec<String>,

    /// Publication database
    #[arg(long, short = 'd')]
    database: String,

    /// Publication to add the article to
    #[arg(long, short = 'p')]
    publication: String,

    /// Source object schema
    #[arg(long, default_value = repl_article::provision::DEFAULT_SCHEMA)]
    schema: String,

    /// Source object; the article gets the same name
    #[arg(long, short = 'n')]
    name: String,

    /// Row filter predicate, without the WHERE keyword
    #[arg(long)]
    filter: Option<String>,

    /// Creation options as a tagged JSON bundle
    #[arg(long, value_name = "JSON", conflicts_with = "default_options")]
    creation_options: Option<String>,

    /// Use the recommended creation options bundle
    #[arg(long)]
    default_options: bool,

    #[command(flatten)]
    login: LoginArgs,

    /// Accept the server certificate without validation
    #[arg(long)]
    trust_server_certificate: bool,

    /// Report full error detail and exit non-zero if any target fails
    #[arg(long)]
    strict: bool,

    /// Show what would be done without creating anything
    #[arg(long, visible_alias = "what-if")]
    simulate: bool,
}

#[derive(Args)]
struct LoginArgs {
    /// SQL login name
    #[arg(long, short = 'U')]
    user: Option<String>,

    /// Ask for the password interactively
    #[arg(long, requires = "user", conflicts_with = "password_env")]
    prompt_password: bool,

    /// Environment variable holding the password
    #[arg(long, requires = "user")]
    password_env: Option<String>,
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Save a named instance profile
    Save {
        /// Profile name
        #[arg(long)]
        name: String,

        /// Instance identifier (host, host,port or host\instance)
        #[arg(long)]
        instance: String,

        /// SQL login name
        #[arg(long)]
        user: Option<String>,

        /// Environment variable holding the password
        #[arg(long, requires = "user")]
        password_env: Option<String>,

        /// Save to the per-user config instead of the project config
        #[arg(long)]
        global: bool,
    },

    /// List saved profiles
    List,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let command = match &cli.command {
        Commands::Add(_) => "add-article",
        Commands::Profile(ProfileCommands::Save { .. }) => "profile-save",
        Commands::Profile(ProfileCommands::List) => "profile-list",
    };

    let result = match cli.command {
        Commands::Add(args) => run_add(args).await,
        Commands::Profile(profile) => run_profile(profile),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            let code = match err.downcast_ref::<ConfigError>() {
                Some(config_err) => config_err.error_code(),
                None => "INVALID_INPUT",
            };
            let envelope = ErrorEnvelope::new(command, ErrorInfo::new(code, format!("{err:#}")));
            print_json(&envelope);
            ExitCode::from(2)
        }
    }
}

async fn run_add(args: AddArgs) -> anyhow::Result<ExitCode> {
    let start = Instant::now();

    let explicit = read_credential(&args.login)?;
    let registry = config::load_with_precedence()?;
    let targets = args
        .instances
        .iter()
        .map(|name| config::resolve_target(&registry, name, explicit.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut request = ArticleRequest::new(&args.database, &args.publication, &args.name)
        .with_schema(&args.schema);
    if let Some(filter) = args.filter {
        request = request.with_filter(filter);
    }
    if let Some(raw) = &args.creation_options {
        let value: Value =
            serde_json::from_str(raw).context("--creation-options is not valid JSON")?;
        request = request.with_creation_options(value);
    } else if args.default_options {
        request = request.with_creation_options(CreationScriptOptions::recommended().to_tagged_value());
    }

    let options = RunOptions {
        simulate: args.simulate,
        reporting: if args.strict { ReportingMode::Strict } else { ReportingMode::Friendly },
    };
    let resolver = MssqlResolver::new().trust_server_certificate(args.trust_server_certificate);

    let outcomes = add_article(&resolver, &targets, &request, options).await;

    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let envelope = RunEnvelope::new("add-article", outcomes, elapsed_ms);
    print_json(&envelope);

    if args.strict && !envelope.ok {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_profile(command: ProfileCommands) -> anyhow::Result<ExitCode> {
    match command {
        ProfileCommands::Save { name, instance, user, password_env, global } => {
            let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
            let stored = StoredInstance { instance, user, password: None, password_env };
            config::save_instance(&name, stored, location)?;
            print_json(&json!({ "ok": true, "command": "profile-save", "name": name }));
        }
        ProfileCommands::List => {
            // Stored passwords are never printed
            let profiles: Vec<Value> = config::list_instances()?
                .into_iter()
                .map(|(name, stored)| {
                    json!({
                        "name": name,
                        "instance": stored.instance,
                        "user": stored.user,
                        "password_env": stored.password_env,
                    })
                })
                .collect();
            print_json(&json!({ "ok": true, "command": "profile-list", "profiles": profiles }));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read_credential(login: &LoginArgs) -> anyhow::Result<Option<Credential>> {
    let Some(user) = &login.user else {
        return Ok(None);
    };

    let password = if let Some(var) = &login.password_env {
        std::env::var(var).map_err(|_| ConfigError::MissingPasswordEnv(var.clone()))?
    } else if login.prompt_password {
        dialoguer::Password::new()
            .with_prompt(format!("Password for {user}"))
            .interact()
            .context("Could not read password")?
    } else {
        bail!("--user requires --prompt-password or --password-env");
    };

    Ok(Some(Credential::new(user.clone(), password)))
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Could not serialize output: {e}"),
    }
}
