//! Subcommand execution

use crate::{Cli, Command, InfoTarget};
use anyhow::{Context, Result};
use mindctrl::proto::method::{BrowserInfo, PlatformInfo};
use mindctrl::{
    get_browser_info, get_platform_info, ping, Operation, Router, SessionBuilder, TransportOptions,
};
use serde_json::Value;
use std::io::{self, Write};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Connect to the browser, run the subcommand and disconnect
pub async fn run(cli: Cli) -> Result<()> {
    let mut router = connect(&cli).await.context("cannot connect to browser")?;

    let outcome = execute(&cli.command, &cli.browser, &mut router).await;

    if let Err(e) = router.close().await {
        debug!("Failed to close session: {}", e);
    }

    outcome
}

/// Client name unique to this process
fn client_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("mindctrl_rust_{}_{}", process::id(), millis)
}

async fn connect(cli: &Cli) -> Result<Router> {
    let mut options = TransportOptions::new();
    if let (Some(username), Some(password)) = (&cli.username, &cli.password) {
        options = options.with_credentials(username.as_str(), password.as_str());
    }

    let client = client_name();
    info!("Connecting to {} as {}", cli.browser, client);

    let router = SessionBuilder::new(cli.server.as_str(), client, cli.browser.as_str())
        .with_options(options)
        .connect()
        .await?;
    Ok(router)
}

async fn execute(command: &Command, browser: &str, router: &mut Router) -> Result<()> {
    let mut stdout = io::stdout().lock();

    match command {
        Command::Ping => {
            ping().execute(router).await.context("cannot ping the browser")?;
            writeln!(stdout, "Browser {} is alive", browser)?;
        }
        Command::Info { target } => {
            if matches!(target, InfoTarget::Browser | InfoTarget::All) {
                let mut op = get_browser_info();
                let info = op
                    .execute(router)
                    .await
                    .context("cannot fetch information on the browser")?;
                write_browser_info(&mut stdout, info)?;
            }
            if matches!(target, InfoTarget::Platform | InfoTarget::All) {
                let mut op = get_platform_info();
                let info = op
                    .execute(router)
                    .await
                    .context("cannot fetch information on the platform")?;
                write_platform_info(&mut stdout, info)?;
            }
            writeln!(stdout)?;
        }
        Command::Call { method, params } => {
            let mut op = Operation::<Value, Value>::new(method.as_str(), params.clone());
            let output = op
                .execute(router)
                .await
                .with_context(|| format!("cannot call {}", method))?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(output)?)?;
        }
    }

    Ok(())
}

fn write_browser_info(out: &mut impl Write, info: &BrowserInfo) -> io::Result<()> {
    writeln!(out, "Browser Name: {}", info.name)?;
    writeln!(out, "Browser Version: {}", info.version)
}

fn write_platform_info(out: &mut impl Write, info: &PlatformInfo) -> io::Result<()> {
    writeln!(out, "Processor Architecture: {}", info.arch)?;
    writeln!(out, "Operating System: {}", info.os)
}
