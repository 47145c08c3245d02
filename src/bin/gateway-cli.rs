use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the edge gateway admin API", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_ADMIN_URL", default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the rate limit settings and their version
    RateLimits {
        /// Replace the settings with this JSON document
        #[arg(long)]
        apply: Option<PathBuf>,
    },
    /// Show the last closed rate limit rejection window
    RateLimitSummary,
    /// List policies, or upsert/delete one
    Policies {
        #[arg(long, conflicts_with = "delete")]
        upsert: Option<PathBuf>,
        #[arg(long)]
        delete: Option<String>,
    },
    /// List domain bindings, or unbind one
    Domains {
        #[arg(long)]
        remove: Option<String>,
    },
    /// Show the route table, or replace it from a JSON document
    Routes {
        #[arg(long)]
        apply: Option<PathBuf>,
    },
    /// Probe every destination now
    RoutesHealth,
    /// Reinstate the previous route table
    Rollback,
    /// Show output cache TTLs, or clear stored entries
    OutputCache {
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let api = format!("{}/admin/api", cli.url.trim_end_matches('/'));

    let (method, path, body) = match cli.command {
        Commands::RateLimits { apply: None } => (Method::GET, "/rate-limits".to_string(), None),
        Commands::RateLimits { apply: Some(file) } => {
            (Method::POST, "/rate-limits".to_string(), Some(read_json(&file)?))
        }
        Commands::RateLimitSummary => (Method::GET, "/rate-limits/summary".to_string(), None),
        Commands::Policies { upsert: Some(file), .. } => {
            (Method::POST, "/policies".to_string(), Some(read_json(&file)?))
        }
        Commands::Policies { delete: Some(id), .. } => {
            (Method::DELETE, format!("/policies/{}", id), None)
        }
        Commands::Policies { .. } => (Method::GET, "/policies".to_string(), None),
        Commands::Domains { remove: Some(host) } => {
            (Method::DELETE, format!("/domains/{}", host), None)
        }
        Commands::Domains { remove: None } => (Method::GET, "/domains".to_string(), None),
        Commands::Routes { apply: None } => (Method::GET, "/routes".to_string(), None),
        Commands::Routes { apply: Some(file) } => {
            (Method::POST, "/routes".to_string(), Some(read_json(&file)?))
        }
        Commands::RoutesHealth => (Method::GET, "/routes/health".to_string(), None),
        Commands::Rollback => (Method::POST, "/routes/rollback".to_string(), None),
        Commands::OutputCache { clear: true } => {
            (Method::DELETE, "/output-cache/entries".to_string(), None)
        }
        Commands::OutputCache { clear: false } => (Method::GET, "/output-cache".to_string(), None),
    };

    let mut request = client.request(method, format!("{}{}", api, path));
    if let Some(body) = body {
        request = request.json(&body);
    }
    print_response(request.send().await?).await
}

fn read_json(path: &PathBuf) -> Result<Value, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(version) = res.headers().get("x-ratelimit-config-version") {
        println!("version: {}", version.to_str().unwrap_or("?"));
    }
    if status == StatusCode::NO_CONTENT {
        println!("{}", status);
        return Ok(());
    }

    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };
    if status.is_success() {
        println!("{}", rendered);
        Ok(())
    } else {
        eprintln!("Error: admin API returned status {}", status);
        eprintln!("{}", rendered);
        std::process::exit(1);
    }
}
