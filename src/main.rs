#[cfg(feature = "cli")]
mod cli;

#[cfg(feature = "cli")]
fn main() {
    init_tracing();
    if let Err(err) = cli::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lexiai_rs=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("The CLI is disabled. Rebuild with `--features cli` to enable it.");
}
