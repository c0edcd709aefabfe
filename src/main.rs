use anyhow::{Result, anyhow};
use osh::config::{Args, Config};
use osh::io_adapters::EditorSource;
use osh::Session;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    // OSH_LOG takes the usual env-filter directives; stay quiet by default.
    let filter = EnvFilter::try_from_env("OSH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut source =
        EditorSource::new().map_err(|err| anyhow!("failed to set up line editor: {}", err))?;
    let mut session = Session::new(Config::from(args), std::io::stdout());
    let code = session.run(&mut source)?;
    std::process::exit(code)
}
