use anyhow::Result;

mod cli;
mod engine;
mod runtime;

fn main() -> Result<()> {
    let config = cli::parse()?;
    init_logging(config.verbose);
    runtime::execute(config)?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}
