//! dpvsadm binary

use anyhow::Context;
use clap::Parser;
use common::Error;
use dpvs::Client;
use dpvs_admin::{Cli, Config, LogFormat, build, exit_code, run};
use std::process::ExitCode;
use validator::Validate;

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    config.override_engine(cli.socket.as_deref(), cli.tcp_addr.as_deref());
    config
        .validate()
        .context("invalid engine address on the command line")?;
    Ok(config)
}

fn fail(err: &Error) -> ExitCode {
    eprintln!("{err}");
    ExitCode::from(exit_code(err))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => return fail(&Error::config(format!("{e:#}"))),
    };

    common::logging::init_with(
        &config.logging.level,
        config.logging.format == LogFormat::Json,
    );

    // Operands are checked before the engine is contacted
    let action = match build(&cli.command) {
        Ok(action) => action,
        Err(e) => return fail(&e),
    };

    let endpoint = config.endpoint();
    tracing::debug!("Using engine at {}", endpoint);
    let mut client = match Client::connect(&endpoint) {
        Ok(client) => client,
        Err(e) => return fail(&e),
    };

    let mut out = String::new();
    let result = run(&mut client, &action, &mut out);
    client.close();

    print!("{out}");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}
