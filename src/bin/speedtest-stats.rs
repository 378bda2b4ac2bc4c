use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "speedtest-stats")]
#[command(about = "Read stored speed test results", long_about = None)]
struct Cli {
    /// Base URL of the backend, including any url_base
    #[arg(short, long, default_value = "http://localhost:8989")]
    url: String,

    #[arg(short, long, env = "SPEEDTEST_STATISTICS_PASSWORD")]
    password: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the most recent results
    Last,
    /// Show a single result by its telemetry id
    Show { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.password))?,
    );

    let id = match &cli.command {
        Commands::Last => "L100",
        Commands::Show { id } => id.as_str(),
    };

    let res = client
        .get(format!("{}/stats", cli.url.trim_end_matches('/')))
        .query(&[("id", id)])
        .headers(headers)
        .send()
        .await?;
    print_response(res).await?;

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: stats endpoint returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
