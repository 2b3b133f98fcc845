use flexshop::{Instance, ShopError, solve};
use tracing_subscriber::EnvFilter;

fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    enable_tracing();

    // Usage: <program> [instance_file.yaml]
    let instance = match std::env::args().nth(1) {
        Some(path) => Instance::from_path(path)?,
        None => Instance::two_by_two(),
    };

    match solve(&instance) {
        Ok(schedule) => print!("{}", schedule.report()),
        Err(ShopError::NoSolution(_)) => println!("The problem has no solution."),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
