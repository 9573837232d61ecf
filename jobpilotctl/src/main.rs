use clap::Parser;

fn main() {
    let cli = jobpilotctl::Cli::parse();
    if let Err(err) = jobpilotctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
