use clap::Parser;
use client::input::{parse_route, InputManager};
use client::network::Client;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:7666")]
    server: String,

    /// Character name to log in with
    #[arg(short = 'n', long, default_value = "Explorador")]
    name: String,

    /// Password sent with the login
    #[arg(long, default_value = "secret")]
    password: String,

    /// Steps to walk, one letter per step (N, E, S, W)
    #[arg(short = 'r', long, default_value = "")]
    route: String,

    /// Something to say after logging in
    #[arg(long)]
    say: Option<String>,

    /// Milliseconds between scripted commands
    #[arg(long, default_value = "250")]
    step_ms: u64,

    /// Seconds to keep listening after the script is done
    #[arg(long, default_value = "2")]
    linger: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let route = parse_route(&args.route)?;

    info!("Connecting to {} as {}", args.server, args.name);
    let input = InputManager::scripted(&route, args.say.as_deref());
    let mut client = Client::connect(&args.server, input, Duration::from_millis(args.step_ms)).await?;
    client.login(&args.name, &args.password).await?;
    client.run(Duration::from_secs(args.linger)).await?;

    let state = &client.game_state;
    info!(
        "Done: map {:?}, position {:?}, {} characters in view, {} pongs",
        state.map,
        state.confirmed_position(),
        state.characters.len(),
        state.pongs
    );
    Ok(())
}
