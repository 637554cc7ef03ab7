//! CLI module for the Atelier operator console.
//!
//! Every invocation is one "browser context": durable storage lives in the
//! data directory and survives between runs, ephemeral storage dies with the
//! process. Subcommands:
//! - `login` - Sign in, answering a second-factor prompt when required
//! - `whoami` - Restore the stored session and show the operator
//! - `logout` - End the session and clear local state
//! - `check-session` - Ask the server whether the session is still valid
//! - `scope show|set-seller|set-artisan` - Inspect or change the hierarchy scope
//! - `routes` - List the route table for the operator's role
//! - `open <path>` - Show what navigating to a path would do
//! - `forgot-password` - Request a password reset email
//! - `activity` - Show recent login attempts

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::api;
use crate::config::Config;
use crate::console::Console;
use crate::error::SessionError;
use crate::guard::GateDecision;
use crate::models::{Role, SessionState, User};
use crate::router::RoleRouter;
use crate::session::LoginOutcome;
use crate::storage::{BrowserStorage, FileStore, MemoryStore, TENANT_ID_KEY};
use crate::tenant::{self, DEFAULT_TENANT};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(author, version, about = "Operator console for a multi-tenant craft marketplace", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "atelier.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Marketplace API URL (overrides the configuration file)
    #[arg(long, env = "ATELIER_API_URL")]
    pub api_url: Option<String>,

    /// Use the built-in mock marketplace instead of the remote API
    #[arg(long)]
    pub mock: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in
    Login {
        #[arg(short, long)]
        email: String,
        /// Password (can also be set via ATELIER_PASSWORD env var)
        #[arg(short, long, env = "ATELIER_PASSWORD", hide_env_values = true)]
        password: String,
        /// Tenant to sign in to
        #[arg(short, long, default_value = DEFAULT_TENANT)]
        tenant: String,
        /// Keep the session across runs
        #[arg(long)]
        remember_me: bool,
        /// Second-factor code; prompted for when omitted
        #[arg(long)]
        code: Option<String>,
    },

    /// Show the signed-in operator
    Whoami,

    /// Sign out and clear local session state
    Logout,

    /// Revalidate the session with the server
    CheckSession,

    /// Hierarchy scope commands
    #[command(subcommand)]
    Scope(ScopeCommands),

    /// List routes available to a role (defaults to the signed-in operator)
    Routes {
        #[arg(long)]
        role: Option<Role>,
    },

    /// Resolve a console path through the tenant, gate and router
    Open {
        /// e.g. /acme/admin/orders
        path: String,
    },

    /// Request a password reset email
    ForgotPassword {
        #[arg(short, long)]
        email: String,
    },

    /// Show recent login attempts
    Activity,
}

/// Scope subcommands
#[derive(Subcommand, Debug)]
pub enum ScopeCommands {
    /// Show the seller and artisan in view
    Show,
    /// Pick a seller; omit the id for the platform-wide view
    SetSeller { id: Option<String> },
    /// Pick an artisan; omit the id to clear the selection
    SetArtisan { id: Option<String> },
}

/// Durable scope on disk, ephemeral scope in memory.
pub fn open_storage(config: &Config) -> BrowserStorage {
    let durable = FileStore::open(config.storage.data_dir.join("storage.json"));
    BrowserStorage::new(Arc::new(durable), Arc::new(MemoryStore::new()))
}

/// Run a CLI command
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    let api = api::connect(&config.api, cli.mock)?;
    let console = Console::new(config, api, open_storage(config));

    match &cli.command {
        Commands::Login {
            email,
            password,
            tenant,
            remember_me,
            code,
        } => cmd_login(&console, email, password, tenant, *remember_me, code.as_deref()).await,
        Commands::Whoami => cmd_whoami(&console).await,
        Commands::Logout => cmd_logout(&console).await,
        Commands::CheckSession => cmd_check_session(&console).await,
        Commands::Scope(ScopeCommands::Show) => cmd_scope_show(&console).await,
        Commands::Scope(ScopeCommands::SetSeller { id }) => {
            cmd_set_seller(&console, id.as_deref()).await
        }
        Commands::Scope(ScopeCommands::SetArtisan { id }) => {
            cmd_set_artisan(&console, id.as_deref()).await
        }
        Commands::Routes { role } => cmd_routes(&console, *role).await,
        Commands::Open { path } => cmd_open(&console, path).await,
        Commands::ForgotPassword { email } => cmd_forgot_password(&console, email).await,
        Commands::Activity => cmd_activity(&console),
    }
}

async fn prompt(label: &str) -> Result<String> {
    println!("{}", label);
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

/// Restore the stored session or stop with a hint.
async fn require_session(console: &Console) -> Result<User> {
    match console.start().await {
        Some(user) => Ok(user),
        None => bail!("Not signed in. Run `atelier login` first."),
    }
}

fn print_user(user: &User, tenant_id: Option<&str>) {
    println!("Name:        {}", user.name);
    println!("Email:       {}", user.email);
    println!("Role:        {}", user.role);
    println!("Tenant:      {}", tenant_id.unwrap_or(&user.tenant_id));
    if let Some(last_login) = user.last_login {
        println!("Last login:  {}", last_login.format("%Y-%m-%d %H:%M UTC"));
    }
}

async fn cmd_login(
    console: &Console,
    email: &str,
    password: &str,
    tenant: &str,
    remember_me: bool,
    code: Option<&str>,
) -> Result<()> {
    let user = match console.login(email, password, remember_me, tenant).await? {
        LoginOutcome::Authenticated(user) => user,
        LoginOutcome::TwoFactorRequired { session_id } => {
            complete_two_factor(console, &session_id, code).await?
        }
    };

    println!();
    println!("[OK] Signed in");
    println!();
    print_user(&user, console.session().tenant_id().as_deref());
    println!(
        "Session:     {}",
        if remember_me {
            "kept across runs"
        } else {
            "this run only"
        }
    );
    println!();
    Ok(())
}

/// Prompt for codes until one is accepted or the challenge is abandoned.
async fn complete_two_factor(
    console: &Console,
    session_id: &str,
    code: Option<&str>,
) -> Result<User> {
    if let Some(code) = code {
        return Ok(console.verify_two_factor(code, session_id).await?);
    }

    loop {
        let code = prompt("Enter the 6-digit code from your authenticator app:").await?;
        if code.is_empty() {
            console.session().cancel_two_factor();
            bail!("Sign-in cancelled");
        }

        match console.verify_two_factor(&code, session_id).await {
            Ok(user) => return Ok(user),
            Err(SessionError::TwoFactor)
                if matches!(console.session().state(), SessionState::PendingTwoFactor { .. }) =>
            {
                eprintln!("{}", SessionError::TwoFactor);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn cmd_whoami(console: &Console) -> Result<()> {
    let user = require_session(console).await?;
    println!();
    print_user(&user, console.session().tenant_id().as_deref());
    println!();
    Ok(())
}

async fn cmd_logout(console: &Console) -> Result<()> {
    // A stale token still gets cleared by the teardown
    console.start().await;
    let redirect = console.logout().await;
    println!("[OK] Signed out");
    println!("Next:        {}", redirect);
    Ok(())
}

async fn cmd_check_session(console: &Console) -> Result<()> {
    require_session(console).await?;
    match console.check_session().await {
        Ok(_) => {
            println!("[OK] Session is valid");
            Ok(())
        }
        Err(SessionError::SessionExpired { redirect_to }) => {
            println!("[!!] Session expired");
            println!("Next:        {}", redirect_to);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_scope_show(console: &Console) -> Result<()> {
    require_session(console).await?;
    print_scope(console);
    Ok(())
}

fn print_scope(console: &Console) {
    let scope = console.scope();
    println!();
    println!(
        "Seller:      {}{}",
        scope.current_seller_id().unwrap_or("(all sellers)"),
        if scope.can_select_seller() { "" } else { " [fixed]" }
    );
    println!(
        "Artisan:     {}{}",
        scope.current_artisan_id().unwrap_or("(none)"),
        if scope.can_select_artisan() { "" } else { " [fixed]" }
    );

    let sellers = scope.available_sellers();
    if !sellers.is_empty() {
        println!();
        println!("Sellers:");
        for seller in sellers {
            let marker = if Some(seller.id.as_str()) == scope.current_seller_id() {
                "*"
            } else {
                " "
            };
            println!("  {} {:8} {}", marker, seller.id, seller.name);
        }
    }

    let artisans = scope.available_artisans();
    if !artisans.is_empty() {
        println!();
        println!("Artisans:");
        for artisan in artisans {
            let marker = if Some(artisan.id.as_str()) == scope.current_artisan_id() {
                "*"
            } else {
                " "
            };
            println!("  {} {:8} {}", marker, artisan.id, artisan.name);
        }
    }
    println!();
}

async fn cmd_set_seller(console: &Console, id: Option<&str>) -> Result<()> {
    require_session(console).await?;
    if !console.scope().can_select_seller() {
        bail!("Your role cannot change the seller in view");
    }
    console.scope().set_seller_id(id);
    print_scope(console);
    Ok(())
}

async fn cmd_set_artisan(console: &Console, id: Option<&str>) -> Result<()> {
    require_session(console).await?;
    if !console.scope().can_select_artisan() {
        bail!("Your role cannot change the artisan in view");
    }
    let before = console.scope().current_artisan_id().map(str::to_string);
    console.scope().set_artisan_id(id);
    if id.is_some() && console.scope().current_artisan_id().map(str::to_string) == before {
        println!("[!!] No such artisan for the seller in view");
    }
    print_scope(console);
    Ok(())
}

async fn cmd_routes(console: &Console, role: Option<Role>) -> Result<()> {
    let (role, tenant_id) = match role {
        Some(role) => {
            let stored = console.session().storage().find(TENANT_ID_KEY);
            (role, stored.map(|(tenant_id, _)| tenant_id))
        }
        None => {
            let user = require_session(console).await?;
            (user.role, console.session().tenant_id())
        }
    };

    let table = RoleRouter::table(role);
    println!();
    println!("=== Routes for {} ({} table) ===", role, table.name);
    println!();
    for route in table.routes {
        println!(
            "  {:12} {}",
            route.title,
            tenant::tenant_path(tenant_id.as_deref(), route.path)
        );
    }
    println!();
    Ok(())
}

async fn cmd_open(console: &Console, path: &str) -> Result<()> {
    console.start().await;
    let nav = console.navigate(path);

    println!("Tenant:      {} ({:?})", nav.tenant.id, nav.tenant.source);
    match nav.decision {
        GateDecision::Loading => println!("Loading..."),
        GateDecision::RedirectToLogin { to, return_to } => {
            println!("Redirect:    {}", to);
            println!("Returns to:  {}", return_to);
        }
        GateDecision::RedirectToDashboard { to } => println!("Redirect:    {}", to),
        GateDecision::Render => match nav.route {
            Some(route) => println!("Render:      {}", route.title),
            None => println!("Render:      {}", path),
        },
    }
    Ok(())
}

async fn cmd_forgot_password(console: &Console, email: &str) -> Result<()> {
    let message = console.session().request_password_reset(email).await?;
    println!("{}", message);
    Ok(())
}

fn cmd_activity(console: &Console) -> Result<()> {
    let activity = console.session().login_activity();
    if activity.is_empty() {
        println!("No login activity recorded.");
        return Ok(());
    }

    println!();
    println!("{:<20} {:<8} {:<10} {}", "WHEN", "RESULT", "TENANT", "EMAIL");
    println!("{}", "-".repeat(72));
    for entry in activity.iter().rev() {
        println!(
            "{:<20} {:<8} {:<10} {}",
            entry.at.format("%Y-%m-%d %H:%M:%S"),
            if entry.success { "ok" } else { "failed" },
            entry.tenant_id,
            entry.email
        );
    }
    println!();
    Ok(())
}
