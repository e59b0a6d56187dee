//! Keygate command-line host.
//!
//! Drives the activation workflow against a SQLite file:
//!   keygate create --email ada@example.com --password secret
//!   keygate activate <TOKEN>
//!   keygate login-check <ACCOUNT_ID>
//!
//! Notifications are written to the log instead of being mailed.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keygate_activation::{AccountStore, ActivationError};
use keygate_cli::{build_workflow, load_config, AccountSummary};
use keygate_types::{Account, AccountId};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "keygate")]
#[command(about = "Account activation workflow host")]
struct Args {
    /// Path to the SQLite account database
    #[arg(short, long, default_value = "keygate.db")]
    db: PathBuf,

    /// Path to a JSON activation config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and issue an activation token
    Create {
        #[arg(long)]
        email: String,
        /// Local password; omit together with --provider for federated accounts
        #[arg(long, conflicts_with = "provider")]
        password: Option<String>,
        /// External identity provider name
        #[arg(long)]
        provider: Option<String>,
        /// Do not send the "activation needed" notification
        #[arg(long)]
        quiet: bool,
    },
    /// Activate the account carrying TOKEN
    Activate { token: String },
    /// Replace the token of a pending account
    Reissue { id: String },
    /// Run the login pre-check for an account
    LoginCheck { id: String },
    /// Print an account
    Show { id: String },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let config = load_config(args.config.as_deref())?;
    let (workflow, store) = build_workflow(config, &args.db)?;

    match args.command {
        Command::Create {
            email,
            password,
            provider,
            quiet,
        } => {
            let mut account = match (password, provider) {
                (_, Some(provider)) => Account::external(email, provider),
                (Some(password), None) => Account::local(email, password),
                (None, None) => bail!("either --password or --provider is required"),
            };
            account.skip_activation_needed_email = quiet;

            workflow.on_account_create(&mut account)?;
            if !account.has_local_credential() {
                store
                    .save(&account, &Default::default())
                    .context("Failed to save account")?;
            }
            info!("Account created: {}", account.id);
            print_account(&account)?;
        }
        Command::Activate { token } => match workflow.activate(&token) {
            Ok(account) => {
                info!("Account activated: {}", account.id);
                print_account(&account)?;
            }
            Err(ActivationError::TokenExpired { expired_at }) => {
                warn!("Token expired at {}; use `reissue` to send a new one", expired_at);
                bail!("activation token expired");
            }
            Err(e) => return Err(e.into()),
        },
        Command::Reissue { id } => {
            let mut account = load(&*store, &id)?;
            workflow.reissue_token(&mut account)?;
            print_account(&account)?;
        }
        Command::LoginCheck { id } => {
            let account = load(&*store, &id)?;
            match workflow.check_login_allowed(&account) {
                Ok(()) => println!("allowed"),
                Err(reason) => {
                    println!("denied: {reason}");
                    std::process::exit(1);
                }
            }
        }
        Command::Show { id } => {
            let account = load(&*store, &id)?;
            print_account(&account)?;
        }
    }

    Ok(())
}

fn load(store: &dyn AccountStore, id: &str) -> Result<Account> {
    let id = AccountId::parse(id).context("Invalid account id")?;
    store
        .find_by_id(id)?
        .with_context(|| format!("No account with id {id}"))
}

fn print_account(account: &Account) -> Result<()> {
    let summary = AccountSummary::from(account);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
