use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tenauth_core::auth::{
    parse_callback_input, AuthError, CallbackListener, ExchangeOutcome, LoginFlow, MemoryStore,
    NavigationSink, RecoveryAction,
};
use tenauth_core::config::{AuthConfig, BackendEndpoints};
use tenauth_core::dashboard::{DashboardClient, DashboardError};
use tokio::task;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-tenant OAuth login from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in through the identity provider and show the dashboard
    Login(LoginArgs),
    /// Fetch the protected dashboard payload
    Dashboard,
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Use manual copy/paste flow instead of a local callback listener
    #[arg(long)]
    manual: bool,
    /// Print navigation URLs instead of launching a browser
    #[arg(long = "no-browser")]
    no_browser: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Login(args) => login(args).await?,
        Commands::Dashboard => dashboard().await?,
    }
    Ok(())
}

async fn login(args: LoginArgs) -> Result<()> {
    let config = AuthConfig::from_env().context("invalid TENAUTH_* configuration")?;
    config.validate()?;

    let navigator = Arc::new(TerminalNavigator {
        app_origin: config.app_origin.clone(),
        auto_open: !args.manual && !args.no_browser,
    });
    let mut flow = LoginFlow::new(config.clone(), Arc::new(MemoryStore::new()), navigator)
        .context("failed to build login flow")?;

    let listener = if args.manual {
        None
    } else {
        let redirect_uri = config.redirect_uri()?;
        match CallbackListener::bind(&redirect_uri).await {
            Ok(listener) => Some(listener),
            Err(err) => {
                eprintln!(
                    "Could not listen on {redirect_uri} ({err}); falling back to copy/paste."
                );
                None
            }
        }
    };

    flow.begin()?;

    let mut pending_code: Option<String> = None;
    loop {
        let code = match pending_code.take() {
            Some(code) => code,
            None => next_code(listener.as_ref()).await?,
        };

        println!("Exchanging the authorization code…");
        match flow.submit(&code).await {
            Ok(ExchangeOutcome::Success) => {
                println!("Login complete.");
                match flow.dashboard().await {
                    Ok(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
                    Err(err) => eprintln!("Signed in, but the dashboard request failed: {err}"),
                }
                return Ok(());
            }
            Ok(ExchangeOutcome::TenantMismatch {
                logout_url,
                fresh_login_url,
            }) => {
                println!();
                println!(
                    "This account belongs to a different tenant than the one the login started in."
                );
                let recoverable = logout_url.is_some() || fresh_login_url.is_some();
                if recoverable
                    && !confirm("Sign out of the mismatched tenant and try again? [Y/n] ").await?
                {
                    println!("Login cancelled.");
                    return Ok(());
                }
                match flow.recover(logout_url.as_deref(), fresh_login_url.as_deref())? {
                    RecoveryAction::Logout(_) => {
                        println!("Finish signing out in the browser, then sign in again.");
                    }
                    RecoveryAction::FreshLogin(_) => {
                        println!("Complete the new sign-in in the browser.");
                    }
                    RecoveryAction::Home(_) => {
                        println!(
                            "The identity provider offered no recovery link. Start over with \
                             `tenauth login` from the right tenant."
                        );
                        return Ok(());
                    }
                }
            }
            Ok(ExchangeOutcome::Failure { status, message }) => {
                eprintln!("Token exchange failed: {} {message}.", status.as_u16());
                if !confirm("Retry with the same code? [Y/n] ").await? {
                    bail!("login did not complete");
                }
                pending_code = Some(code);
            }
            Err(AuthError::EmptyCode) => {
                eprintln!("The redirect carried an empty authorization code.");
            }
            Err(AuthError::Transport(reason)) => {
                eprintln!("{reason}");
                if !confirm("Retry the exchange? [Y/n] ").await? {
                    bail!("login did not complete");
                }
                pending_code = Some(code);
            }
            Err(other) => return Err(other.into()),
        }
    }
}

async fn dashboard() -> Result<()> {
    let config = AuthConfig::from_env().context("invalid TENAUTH_* configuration")?;
    let endpoints = BackendEndpoints::from_base(&config.backend_base)?;
    let client =
        DashboardClient::new(endpoints.dashboard_url).context("failed to build dashboard client")?;
    match client.fetch().await {
        Ok(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
        Err(DashboardError::Unauthorized) => {
            bail!("not signed in; run `tenauth login` first")
        }
        Err(other) => return Err(other.into()),
    }
    Ok(())
}

/// Wait for the next authorization code, from the loopback listener when
/// one is bound and from a terminal prompt otherwise.
async fn next_code(listener: Option<&CallbackListener>) -> Result<String> {
    match listener {
        Some(listener) => {
            println!("Waiting for the identity provider to redirect back…");
            Ok(listener.recv().await?)
        }
        None => {
            let input = prompt_line("Paste the redirect URL or authorization code: ").await?;
            Ok(parse_callback_input(&input)?)
        }
    }
}

async fn prompt_line(message: &'static str) -> Result<String> {
    task::spawn_blocking(move || {
        use std::io::{self, Write};
        print!("{message}");
        io::stdout().flush()?;
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            bail!("standard input closed");
        }
        Ok(input.trim().to_owned())
    })
    .await
    .context("input prompt interrupted")?
}

async fn confirm(message: &'static str) -> Result<bool> {
    let answer = prompt_line(message).await?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "" | "y" | "yes"))
}

/// Navigation sink that treats the terminal as the browser chrome.
/// Application routes are announced; external destinations open in the
/// system browser.
struct TerminalNavigator {
    app_origin: Url,
    auto_open: bool,
}

impl NavigationSink for TerminalNavigator {
    fn navigate(&self, url: &Url) -> Result<(), AuthError> {
        if url.origin() == self.app_origin.origin() {
            println!("-> {url}");
            return Ok(());
        }
        println!("\nOpen this link in your browser to continue:\n  {url}\n");
        if self.auto_open {
            if let Err(err) = open::that(url.as_str()) {
                eprintln!("Could not launch a browser ({err}); open the link manually.");
            }
        }
        Ok(())
    }
}
