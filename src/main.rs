// ABOUTME: Entry point for the sshctl CLI application.
// ABOUTME: Parses arguments, connects, and dispatches to the subcommand handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands, RunArgs};
use sshctl::config::{ConnectOptions, Secrets, ServerConfig};
use sshctl::error::{Error, Result};
use sshctl::exec::{CancelSignal, Interrupt, RunOptions};
use sshctl::output::{Output, OutputMode};
use sshctl::ssh::{KeyFamily, Session};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let mut output = Output::new(mode);

    let code = match run(cli, &mut output).await {
        Ok(code) => code,
        Err(e) => {
            output.error(&e.to_string());
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli, output: &mut Output) -> Result<i32> {
    let server = ServerConfig::parse(&cli.target)?;
    let key_family: KeyFamily = cli
        .key_type
        .parse()
        .map_err(|e: sshctl::ssh::Error| Error::InvalidArgument(e.to_string()))?;
    let options = ConnectOptions {
        key_path: cli.key.clone(),
        key_family,
        known_hosts: cli.known_hosts,
        secrets: Secrets::from_env(),
    };

    let mut session = Session::new(options.session_config(&server));
    output.progress(&format!("Connecting to {}...", server));
    output.start_timer();
    if !session.connect().await?.is_connected() {
        return Err(Error::ConnectFailed(server.to_string()));
    }

    let result = dispatch(&session, cli.command, output).await;
    session.disconnect().await;
    result
}

async fn dispatch(session: &Session, command: Commands, output: &Output) -> Result<i32> {
    match command {
        Commands::Run(args) => run_command(session, args, output).await,
        Commands::Exists { path } => {
            let present = session.exists(&path).await?;
            if present {
                output.success(&format!("{} exists", path));
                Ok(0)
            } else {
                output.success(&format!("{} does not exist", path));
                Ok(1)
            }
        }
        Commands::Ls { path, dirs, files } => {
            let mut names = Vec::new();
            if !files {
                names.extend(session.list_dirs(&path).await?.into_iter().map(|d| format!("{d}/")));
            }
            if !dirs {
                names.extend(session.list_files(&path).await?);
            }
            output.names(&names);
            Ok(0)
        }
        Commands::Get { remote, local } => {
            let bytes = session.get(&remote, &local).await?;
            output.success(&format!(
                "Downloaded {} to {} ({} bytes)",
                remote,
                local.display(),
                bytes
            ));
            Ok(0)
        }
        Commands::Put { local, remote } => {
            let bytes = session.put(&local, &remote).await?;
            output.success(&format!(
                "Uploaded {} to {} ({} bytes)",
                local.display(),
                remote,
                bytes
            ));
            Ok(0)
        }
    }
}

async fn run_command(session: &Session, args: RunArgs, output: &Output) -> Result<i32> {
    let display = output.streams_output() && (args.display || !args.capture);
    let capture = args.capture || !output.streams_output();

    let mut options = RunOptions::new()
        .display(display)
        .capture_output(capture)
        .combine_stderr(args.combine_stderr)
        .use_shell(!args.no_pty)
        .timeout(Duration::from_secs(args.timeout))
        .interrupt(Interrupt::CtrlC);

    if args.follow {
        let signal = CancelSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.set();
            }
        });
        options = options.until(signal).interrupt(Interrupt::Never);
    }

    let result = session.run(&args.command, &options).await?;
    output.command_result(&result, display);
    Ok(i32::try_from(result.exit_code).unwrap_or(i32::MAX))
}
