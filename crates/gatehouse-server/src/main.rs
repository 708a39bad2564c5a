use anyhow::Result;
use clap::Parser;

use gatehouse_server::ServerBuilder;
use gatehouse_server::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();
    gatehouse_server::observability::init_tracing();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            2
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run(args) => {
            let server = ServerBuilder::new(&cli.config)
                .with_addr(args.listen)
                .build()
                .await?;
            server.run().await?;
            Ok(0)
        }
        Commands::Validate(args) => {
            let path = args.path.unwrap_or(cli.config);
            let problems = cli::validate_file(&path)?;
            if problems.is_empty() {
                println!("{}: ok", path.display());
                return Ok(0);
            }
            for problem in &problems {
                println!("{}: {problem}", path.display());
            }
            Ok(1)
        }
    }
}
