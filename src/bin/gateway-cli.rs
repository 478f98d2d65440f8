use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the service gateway and registry", long_about = None)]
struct Cli {
    /// Registry base URL
    #[arg(short, long, env = "SERVICE_DISCOVERY_URL", default_value = "http://localhost:8500")]
    registry: String,

    /// Gateway base URL
    #[arg(short, long, default_value = "http://localhost:3000")]
    gateway: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a service instance
    Register {
        name: String,
        address: String,
        port: String,
    },
    /// Deregister a service instance
    Deregister {
        name: String,
        address: String,
        port: String,
    },
    /// Resolve a service to its first instance
    Lookup { name: String },
    /// List every registered service
    Services,
    /// Registry status
    RegistryStatus,
    /// Gateway status, downstream pings and breaker states
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder().no_proxy().build()?;
    let registry = cli.registry.trim_end_matches('/');

    let res = match cli.command {
        Commands::Register {
            name,
            address,
            port,
        } => {
            client
                .post(format!("{}/register", registry))
                .json(&instance_body(&name, &address, &port))
                .send()
                .await?
        }
        Commands::Deregister {
            name,
            address,
            port,
        } => {
            client
                .post(format!("{}/deregister", registry))
                .json(&instance_body(&name, &address, &port))
                .send()
                .await?
        }
        Commands::Lookup { name } => {
            client
                .get(format!("{}/services/{}", registry, name))
                .send()
                .await?
        }
        Commands::Services => client.get(format!("{}/services", registry)).send().await?,
        Commands::RegistryStatus => client.get(format!("{}/status", registry)).send().await?,
        Commands::Status => {
            client
                .get(format!("{}/status", cli.gateway.trim_end_matches('/')))
                .send()
                .await?
        }
    };

    print_response(res).await
}

fn instance_body(name: &str, address: &str, port: &str) -> Value {
    json!({
        "service_name": name,
        "service_address": address,
        "service_port": port,
    })
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let body = serde_json::from_str::<Value>(&text)
        .and_then(|json| serde_json::to_string_pretty(&json))
        .unwrap_or(text);

    if status.is_success() {
        println!("{}", body);
    } else {
        eprintln!("Error: server returned status {}", status);
        eprintln!("{}", body);
        std::process::exit(1);
    }
    Ok(())
}
