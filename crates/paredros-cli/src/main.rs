use clap::Parser;

fn main() -> miette::Result<()> {
    paredros_cli::Cli::parse().run()
}
