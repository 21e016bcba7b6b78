use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "edge-cli")]
#[command(about = "Management CLI for the edge router", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "EDGE_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check router status
    Status,
    /// Show cache statistics and entries
    Cache,
    /// Invalidate every entry carrying a tag
    RevalidateTag { tag: String },
    /// Delete the cache entry for a path (cache key, e.g. /fr/admin)
    Purge { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Cache => client.get(format!("{base}/admin/cache")),
        Commands::RevalidateTag { tag } => client.post(format!(
            "{base}/admin/revalidate/tag/{}",
            urlencoding::encode(tag)
        )),
        Commands::Purge { path } => client
            .delete(format!("{base}/admin/cache"))
            .query(&[("path", path.as_str())]),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
