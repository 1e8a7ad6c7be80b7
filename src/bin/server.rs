use clap::Parser;
use memdis::server::{self, Config};
use memdis::{Error, DEFAULT_PORT};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "memdis", version, about = "A Redis-compatible in-memory data server")]
struct Args {
    /// The port to listen on
    #[arg(short, long, env = "MEMDIS_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// File to load the keyspace from on start and to dump it to periodically
    #[arg(short, long = "dump-file", env = "MEMDIS_DUMP_FILE")]
    dump_file: Option<PathBuf>,

    /// Seconds between dumps
    #[arg(long, env = "MEMDIS_SNAPSHOT_INTERVAL", default_value_t = 300)]
    snapshot_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let config = Config {
        port: args.port,
        dump_path: args.dump_file,
        snapshot_interval: Duration::from_secs(args.snapshot_interval.max(1)),
    };

    server::run(config).await
}
