use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "lb-cli")]
#[command(about = "Management CLI for the AI load balancer", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key, when the balancer requires one.
    #[arg(short, long, env = "LB_ADMIN_API_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Registry totals and every service
    Status,
    /// List services, or show one
    Services { name: Option<String> },
    /// Register an instance
    AddInstance {
        service: String,
        url: String,
        #[arg(long)]
        health_url: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Deregister an instance
    RemoveInstance { service: String, url: String },
    /// Probe one instance now
    HealthCheck { service: String, url: String },
    /// Per-instance metrics of a service
    Metrics { service: String },
    /// RL subsystem status
    Rl,
    /// Available strategies and their counters
    Strategies,
    /// Switch the active routing strategy
    Strategy { name: String },
    /// Reload the static RL model
    Reload,
    /// Reset RL decision counters
    ResetStats,
    /// Strategy benchmark control
    #[command(subcommand)]
    Benchmark(BenchmarkCommand),
}

#[derive(Subcommand)]
enum BenchmarkCommand {
    /// Start a run, optionally switching to a strategy first
    Start {
        #[arg(long, default_value_t = 60)]
        minutes: u64,
        #[arg(long)]
        algorithm: Option<String>,
    },
    /// Stop the run and print the final comparison
    Stop,
    /// Current phase and its stats
    Status,
    /// Move the run to another strategy
    Switch { algorithm: String },
    /// Discard one strategy's results
    Reset { algorithm: Option<String> },
    /// Results so far
    Results,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/').to_string();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }
    let client = reqwest::Client::builder()
        .default_headers(headers)
        .build()?;

    let res = match cli.command {
        Commands::Status => client.get(format!("{base}/api/services/status")).send().await?,
        Commands::Services { name: None } => client.get(format!("{base}/api/services")).send().await?,
        Commands::Services { name: Some(name) } => {
            client
                .get(format!("{base}/api/services/{}", segment(&name)))
                .send()
                .await?
        }
        Commands::AddInstance {
            service,
            url,
            health_url,
            name,
        } => {
            let health_url =
                health_url.unwrap_or_else(|| format!("{}/actuator/health", url.trim_end_matches('/')));
            client
                .post(format!("{base}/api/services/{}/instances", segment(&service)))
                .json(&json!({ "url": url, "healthUrl": health_url, "instanceName": name }))
                .send()
                .await?
        }
        Commands::RemoveInstance { service, url } => {
            client
                .delete(format!("{base}/api/services/{}/instances", segment(&service)))
                .query(&[("url", url)])
                .send()
                .await?
        }
        Commands::HealthCheck { service, url } => {
            client
                .post(format!(
                    "{base}/api/services/{}/instances/{}/health-check",
                    segment(&service),
                    segment(&url)
                ))
                .send()
                .await?
        }
        Commands::Metrics { service } => {
            client
                .get(format!("{base}/api/metrics/{}", segment(&service)))
                .send()
                .await?
        }
        Commands::Rl => client.get(format!("{base}/rl/status")).send().await?,
        Commands::Strategies => client.get(format!("{base}/rl/strategies")).send().await?,
        Commands::Strategy { name } => {
            client
                .post(format!("{base}/rl/strategy"))
                .json(&json!({ "strategy": name }))
                .send()
                .await?
        }
        Commands::Reload => client.post(format!("{base}/rl/reload")).send().await?,
        Commands::ResetStats => client.post(format!("{base}/rl/reset-stats")).send().await?,
        Commands::Benchmark(command) => {
            let url = format!("{base}/api/benchmark");
            match command {
                BenchmarkCommand::Start { minutes, algorithm } => {
                    let mut query = vec![("durationMinutes", minutes.to_string())];
                    if let Some(algorithm) = algorithm {
                        query.push(("startAlgorithm", algorithm));
                    }
                    client.post(format!("{url}/start")).query(&query).send().await?
                }
                BenchmarkCommand::Stop => client.post(format!("{url}/stop")).send().await?,
                BenchmarkCommand::Status => client.get(format!("{url}/status")).send().await?,
                BenchmarkCommand::Switch { algorithm } => {
                    client
                        .post(format!("{url}/switch"))
                        .query(&[("algorithm", algorithm)])
                        .send()
                        .await?
                }
                BenchmarkCommand::Reset { algorithm } => {
                    let query: Vec<(&str, String)> =
                        algorithm.map(|a| ("algorithm", a)).into_iter().collect();
                    client.post(format!("{url}/reset")).query(&query).send().await?
                }
                BenchmarkCommand::Results => client.get(format!("{url}/results")).send().await?,
            }
        }
    };

    print_response(res).await
}

/// Percent-encode one path segment.
fn segment(raw: &str) -> String {
    percent_encoding::utf8_percent_encode(raw, percent_encoding::NON_ALPHANUMERIC).to_string()
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    Ok(())
}
