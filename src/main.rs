use clap::{Parser, Subcommand};
use stress_test::{stress_test_document, stress_test_scaling};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcrdt")]
#[command(about = "Multi-replica convergence stress runs for the Merkle CRDT core")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// A single stress run
    Run {
        #[arg(long, default_value_t = 4)]
        replicas: usize,
        #[arg(long, default_value_t = 100)]
        ops: usize,
        #[arg(long, default_value_t = 200)]
        syncs: usize,
    },
    /// Repeated runs over a growing number of replicas
    Scaling {
        #[arg(long, default_value_t = 10)]
        max_replicas: usize,
        #[arg(long, default_value_t = 2)]
        step: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main(cli.command))
}

async fn async_main(command: Option<Commands>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match command {
        Some(Commands::Run { replicas, ops, syncs }) => {
            if replicas < 2 {
                return Err("a stress run needs at least two replicas".into());
            }
            stress_test_document(replicas, ops, syncs).await?.print();
        }
        Some(Commands::Scaling { max_replicas, step }) => {
            stress_test_scaling(max_replicas, step).await?;
        }
        None => {
            println!("\n\n╔════════════════════════════════════════════════════════════╗");
            println!("║            ASYNC STRESS TESTS                               ║");
            println!("╚════════════════════════════════════════════════════════════╝");

            // Test 1: small scale
            stress_test_document(4, 100, 200).await?.print();

            // Test 2: medium scale
            stress_test_document(10, 300, 1000).await?.print();

            // Test 3: scaling analysis
            stress_test_scaling(10, 2).await?;
        }
    }

    println!("\n✓ All stress tests completed successfully!");
    Ok(())
}
