use clap::Parser;
use serde_json::Value;

use route_server::client::RouteClient;
use route_server::protocol::Request;

#[derive(Parser)]
#[command(name = "route-cli")]
#[command(about = "Send requests to a route server over TCP", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Route name to call
    route: String,

    /// Request content; anything that is not valid JSON is sent as a string
    content: Option<String>,

    /// Send the same request this many times on one connection
    #[arg(short, long, default_value_t = 1)]
    repeat: u32,
}

/// Interpret CLI content as JSON, falling back to a plain string.
fn parse_content(raw: Option<String>) -> Value {
    match raw {
        None => Value::Null,
        Some(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let request = Request::new(cli.route, parse_content(cli.content));

    let mut client = RouteClient::connect(cli.addr.as_str()).await?;
    for _ in 0..cli.repeat {
        let response = client.send(&request).await?;
        println!("{}", serde_json::to_string(&response)?);
    }

    Ok(())
}
