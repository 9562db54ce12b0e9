mod client;
mod config;
mod mailer;
mod report;

use crate::client::XiqClient;
use crate::config::{Credentials, EmailMode, Scope};
use crate::report::{Connectivity, DeviceRecord, CSV_HEADER};
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::Path;

#[derive(Parser)]
#[command(
    name = "xiqaudit",
    version,
    about = "Audit ExtremeCloud IQ access points for Telnet exposure"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "API token override for this invocation (otherwise read from config)"
    )]
    token: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "Base URL for the API (defaults to https://api.extremecloudiq.com)"
    )]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist credentials to the chosen scope
    Configure {
        #[arg(
            long,
            value_name = "TOKEN",
            help = "API token generated from the XIQ developer portal"
        )]
        key: Option<String>,
        #[arg(long, help = "XIQ login, used when no token is configured")]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the config (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Run the Telnet audit and write the CSV report
    Audit {
        #[arg(
            long,
            value_name = "CLI",
            help = "Diagnostic CLI command sent to every online AP"
        )]
        command: Option<String>,
        #[arg(
            long,
            value_name = "BOOL",
            num_args = 0..=1,
            default_missing_value = "true",
            help = "Also list offline devices in the report"
        )]
        include_offline: Option<bool>,
        #[arg(
            long,
            value_name = "BOOL",
            num_args = 0..=1,
            default_missing_value = "true",
            help = "Email the CSV report after the run"
        )]
        email: Option<bool>,
        #[arg(long, value_name = "FILE", help = "CSV output filename")]
        output: Option<String>,
        #[arg(long, help = "Do not print the result table to the screen")]
        quiet: bool,
    },
    /// Show current configuration (secrets masked)
    ConfigShow,
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("reading current directory")?;

    match cli.command {
        Commands::Configure {
            key,
            username,
            password,
            base_url,
            scope,
        } => {
            let mut existing = config::load_scope(scope.into(), &cwd)?;
            if let Some(key) = key {
                existing.token = Some(key);
            }
            if let Some(username) = username {
                existing.username = Some(username);
            }
            if let Some(password) = password {
                existing.password = Some(password);
            }
            if let Some(url) = base_url {
                existing.base_url = Some(url);
            }
            let path = config::save(scope.into(), &existing, &cwd)?;
            println!("Saved configuration to {}", path.display());
        }
        Commands::Audit {
            command,
            include_offline,
            email,
            output,
            quiet,
        } => {
            let effective = config::resolve(&cwd, cli.token.clone(), cli.base_url.clone())?;
            let merged = config::load(&cwd)?;
            let audit = config::resolve_audit(&merged, command, include_offline, output);
            let email_mode = config::resolve_email(&merged, email);
            run_audit(&effective, &audit, email_mode, quiet)?;
        }
        Commands::ConfigShow => {
            let merged = config::load(&cwd)?;
            let mut masked = merged.clone();
            if masked.token.is_some() {
                masked.token = Some("*****".into());
            }
            if masked.password.is_some() {
                masked.password = Some("*****".into());
            }
            if let Some(email) = masked.email.as_mut() {
                if email.password.is_some() {
                    email.password = Some("*****".into());
                }
            }
            println!("{}", serde_json::to_string_pretty(&masked)?);
        }
        Commands::Completion { shell } => {
            use clap_complete::{generate, shells};
            let mut cmd = Cli::command();
            let bin = cmd.get_name().to_string();
            match shell {
                CompletionShell::Bash => {
                    generate(shells::Bash, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Zsh => {
                    generate(shells::Zsh, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Fish => {
                    generate(shells::Fish, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::PowerShell => {
                    generate(shells::PowerShell, &mut cmd, bin, &mut std::io::stdout())
                }
            }
        }
    }

    Ok(())
}

/// The whole pipeline is strictly sequential: authenticate, list online APs,
/// dispatch the probe command, list offline devices, assemble, write the CSV,
/// then email. Only the email step is allowed to fail without aborting.
fn run_audit(
    effective: &config::EffectiveConfig,
    audit: &config::AuditSettings,
    email_mode: Result<EmailMode>,
    quiet: bool,
) -> Result<()> {
    let client = match &effective.credentials {
        Credentials::Token(token) => XiqClient::with_token(&effective.base_url, token)?,
        Credentials::Login { username, password } => {
            XiqClient::login(&effective.base_url, username, password)?
        }
    };

    let listing = client.list_devices(Connectivity::Online)?;
    let mut online = listing.records;
    let online_count = online.len();

    let (results, detected) = if listing.ap_ids.is_empty() {
        println!("{}", "No online devices found".red());
        (Vec::new(), false)
    } else {
        println!(
            "{}",
            format!("Sending CLI command: #{}", audit.command).purple()
        );
        let dispatch = client.send_cli(&listing.ap_ids, &audit.command)?;
        println!("{}", "CLI executed".purple());
        (dispatch.results, dispatch.detected)
    };
    report::apply_results(&mut online, &results)?;

    let offline = if audit.include_offline {
        Some(client.list_devices(Connectivity::Offline)?.records)
    } else {
        None
    };

    let rows = report::build(online, offline);

    if !quiet {
        if online_count > 0 {
            if detected {
                println!(
                    "{}",
                    "\n***Telnet has been DETECTED on one or more online APs***\n".red()
                );
            } else {
                println!(
                    "{}",
                    "\nTelnet is disabled on all located online APs\n".green()
                );
            }
        }
        print_table(&rows);
    }

    println!(
        "{}",
        format!("Writing report to \"{}\"", audit.output).purple()
    );
    report::write_csv(Path::new(&audit.output), &rows)?;

    match email_mode {
        Ok(EmailMode::Ready(settings)) => {
            if online_count == 0 {
                println!(
                    "No email sent: no online devices were found. Check the CSV for offline devices."
                );
            } else {
                match mailer::send_report(&settings, Path::new(&audit.output)) {
                    Ok(()) => println!(
                        "Email with CSV report sent to: {}",
                        settings.to.join(", ")
                    ),
                    Err(err) => println!("{}", format!("Failed to send email: {:#}", err).red()),
                }
            }
        }
        Ok(EmailMode::Disabled) => println!("Email feature is disabled, skipping email."),
        Ok(EmailMode::NoRelay) => println!("No SMTP server configured, skipping email."),
        Err(err) => println!("{}", format!("Email skipped: {:#}", err).red()),
    }

    Ok(())
}

fn print_table(rows: &[DeviceRecord]) {
    if rows.is_empty() {
        println!("No devices found.");
        return;
    }

    let mut widths: Vec<usize> = CSV_HEADER.iter().map(|c| c.len()).collect();
    for row in rows {
        for (idx, cell) in row.columns().iter().enumerate() {
            widths[idx] = widths[idx].max(cell.len());
        }
    }

    for (i, col) in CSV_HEADER.iter().enumerate() {
        if i > 0 {
            print!("  ");
        }
        print!("{:width$}", col, width = widths[i]);
    }
    println!();
    for (i, width) in widths.iter().enumerate() {
        if i > 0 {
            print!("  ");
        }
        print!("{:-<width$}", "", width = *width);
    }
    println!();
    for row in rows {
        for (i, cell) in row.columns().iter().enumerate() {
            if i > 0 {
                print!("  ");
            }
            print!("{:width$}", cell, width = widths[i]);
        }
        println!();
    }
}
