use clap::Parser;
use memdis::client::Client;
use memdis::{Error, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(
    name = "memdis-cli",
    version,
    about = "Issue commands to a memdis server",
    disable_help_flag = true
)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,

    /// Command name followed by its arguments, e.g. `SET key value`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

/// `flavor = "current_thread"` is used here to make CLI lighter instead of multi-threads.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    let mut client = Client::connect((cli.host.as_str(), cli.port)).await?;
    let reply = client.command(cli.command).await?;

    println!("{}", reply);

    Ok(())
}
