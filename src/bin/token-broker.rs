use std::process;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use token_broker::cache::token_store::{TokenStore, YamlTokenStore};
use token_broker::cli::listing::{render, token_rows, OutputFormat};
use token_broker::config::connection::{ConnectionConfig, ConnectionField, IMPLICIT_FLOW_FIELDS};
use token_broker::config::provider::{ConfigProvider, YamlConfigProvider};
use token_broker::secrets::InMemorySecretStore;
use token_broker::utils::constants::CONFIG_COMPONENT_ID;
use token_broker::utils::logging::{self, LogLevel};
use token_broker::{NamedTokenRequest, TokenError, TokenRecord, TokenResolver};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, env = "LOG_LEVEL", value_enum, global = true)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a valid access token, acquiring a new one if needed
    Token(TokenArgs),
    /// List stored tokens
    List {
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Delete a stored token
    Delete { name: String },
}

#[derive(ClapArgs)]
struct TokenArgs {
    /// Requested scopes
    scope: Vec<String>,
    /// Store the token under this name
    #[arg(short, long)]
    name: Option<String>,
    #[arg(short, long)]
    realm: Option<String>,
    #[arg(short = 'U', long)]
    user: Option<String>,
    #[arg(short, long)]
    password: Option<String>,
    /// Token Service URL, overrides the configured one
    #[arg(long)]
    url: Option<String>,
    /// Always acquire a new token
    #[arg(long)]
    refresh: bool,
    /// Sign in through the browser instead of the password grant
    #[arg(long)]
    implicit: bool,
    /// Neither read nor remember passwords in the OS keyring
    #[arg(long)]
    no_keyring: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::run(args.log_level);

    let result = match args.command {
        Command::Token(token_args) => token(token_args).await,
        Command::List { output } => list(output).await,
        Command::Delete { name } => delete(&name).await,
    };

    if let Err(err) = result {
        eprintln!("{}", err);
        process::exit(1);
    }
}

async fn token(args: TokenArgs) -> Result<()> {
    // -------------------------------
    // 1. Load connection configuration
    // -------------------------------

    let provider = YamlConfigProvider::for_current_user()?;
    let mut config = provider.load(CONFIG_COMPONENT_ID)?;

    let mut resolver = TokenResolver::for_current_user(config.clone())?;
    if args.no_keyring {
        resolver = resolver
            .with_secret_store(Arc::new(InMemorySecretStore::new()))
            .with_remember_password(false);
    }

    // -------------------------------
    // 2. Resolve the token
    // -------------------------------

    let record = if args.implicit {
        let missing = config.missing_fields(IMPLICIT_FLOW_FIELDS);
        if !missing.is_empty() {
            complete_config(&provider, &mut config, &missing)?;
            resolver.set_connection(config.clone());
        }
        tokio::select! {
            record = resolver.get_token_implicit_flow(args.name.as_deref(), args.refresh) => record?,
            _ = tokio::signal::ctrl_c() => bail!("sign-in cancelled"),
        }
    } else {
        let request = NamedTokenRequest {
            name: args.name,
            scope: args.scope,
            realm: args.realm,
            user: args.user,
            password: args.password,
            url: args.url,
            refresh: args.refresh,
        };
        resolve_interactively(&provider, &mut config, &mut resolver, request).await?
    };

    println!("{}", record.access_token);
    Ok(())
}

/// Re-prompt for whatever the resolver reports as missing or rejected.
async fn resolve_interactively(
    provider: &YamlConfigProvider,
    config: &mut ConnectionConfig,
    resolver: &mut TokenResolver,
    mut request: NamedTokenRequest,
) -> Result<TokenRecord> {
    loop {
        match resolver.get_named_token(&request).await {
            Ok(record) => return Ok(record),
            Err(TokenError::MissingConfiguration(fields)) => {
                complete_config(provider, config, &fields)?;
                resolver.set_connection(config.clone());
            }
            Err(TokenError::MissingPassword(user)) => {
                request.password = Some(prompt_password(&user)?);
            }
            Err(err @ TokenError::AuthenticationFailed(_)) => {
                eprintln!("{}", err);
                eprintln!("Please check your username and password and try again.");
                let user = request
                    .user
                    .clone()
                    .or_else(|| config.get(ConnectionField::User).map(str::to_owned))
                    .ok_or_else(|| anyhow!(err.to_string()))?;
                request.password = Some(prompt_password(&user)?);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn complete_config(
    provider: &YamlConfigProvider,
    config: &mut ConnectionConfig,
    fields: &[ConnectionField],
) -> Result<()> {
    for field in fields {
        let value = Text::new(&format!("{}:", field.label())).prompt()?;
        config.set(*field, value.trim());
    }
    provider.store(CONFIG_COMPONENT_ID, config)?;
    Ok(())
}

fn prompt_password(user: &str) -> Result<String> {
    Password::new(&format!("Password for {}:", user))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .map_err(|e| anyhow!("password input cancelled: {}", e))
}

async fn list(output: OutputFormat) -> Result<()> {
    let store = YamlTokenStore::for_current_user()?;
    let rows = token_rows(&store.get_all().await?);
    let rendered = render(&rows, output).map_err(|e| anyhow!(e))?;
    println!("{}", rendered.trim_end());
    Ok(())
}

async fn delete(name: &str) -> Result<()> {
    let store = YamlTokenStore::for_current_user()?;
    store.delete(name).await?;
    info!("token '{}' removed from {}", name, store.path().display());
    Ok(())
}
