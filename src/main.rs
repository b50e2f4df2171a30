mod attributes;
mod cli;
mod config;
mod error;
mod exit;
mod logging;
mod lookup;
mod orchestrator;
mod privilege;
mod selector;
mod ui;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use config::ClientConfig;
use converge::CommandEngine;
use exit::RunOutcome;
use lookup::{DirectoryLookup, Lookup, ServerLookup};
use orchestrator::{Orchestrator, require_app_id};
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match deploy(&cli) {
        Ok(outcome) => outcome,
        Err(e) => RunOutcome::fatal(format!("{e:#}"), 1),
    };

    let code = exit::report(&outcome, &mut io::stdout(), &mut io::stderr());
    ExitCode::from(code)
}

/// Set up the process and run one deploy
///
/// A missing application name is reported before anything else is read.
/// Other errors here happen before the run starts and are fatal.
fn deploy(cli: &Cli) -> Result<RunOutcome> {
    let app_id = match require_app_id(cli.application.as_deref()) {
        Ok(app_id) => app_id,
        Err(e) => return Ok(e.outcome()),
    };

    let loaded = ClientConfig::load(&cli.config)?;
    let found = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    config.merge_cli(cli);

    let level = logging::level_for(config.log_level.as_deref(), cli.verbose, cli.quiet)?;
    logging::init(level, config.log_location.as_deref())?;

    if !found {
        log::warn!(
            "Did not find config file: {}, using command line options.",
            cli.config.display()
        );
    }
    log::info!("*** deploy-app {} ***", env!("CARGO_PKG_VERSION"));

    let settings = config.settings()?;
    let lookup: Box<dyn Lookup> = match &config.server_url {
        Some(url) => Box::new(ServerLookup::new(url.clone())),
        None => Box::new(DirectoryLookup::new(config.data_bag_path())),
    };
    let mut engine = CommandEngine::new(config.engine.command.clone(), config.engine.args.clone());

    let (user, group) = (config.user.clone(), config.group.clone());

    let mut orchestrator = Orchestrator::new(
        settings,
        config.json_attribs.clone(),
        attributes::AttributeResolver::new(attributes::HttpTransport::new()),
        lookup.as_ref(),
        &mut engine,
    )
    .after_attributes(move || privilege::change_privilege(user.as_deref(), group.as_deref()));
    Ok(orchestrator.run(Some(app_id)))
}
