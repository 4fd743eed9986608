use anyhow::Result;

mod cli;
mod runtime;
mod settings;

fn main() -> Result<()> {
    let args = cli::parse()?;

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    runtime::execute(args)
}
