use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the library-access gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_URL", default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "GATEWAY_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish status, staleness and proxy stats
    Status,
    /// Manage proxied resources
    #[command(subcommand)]
    Resource(ResourceCommand),
    /// Manage access grants
    #[command(subcommand)]
    Grant(GrantCommand),
    /// Remove expired grants
    Cleanup,
    /// Recompile and reload the proxy
    Reload,
    /// Print the compiled proxy configuration
    Config,
    /// Show live proxy statistics
    Stats,
}

#[derive(Subcommand)]
enum ResourceCommand {
    /// List resources
    List {
        #[arg(long)]
        all: bool,
    },
    /// Show one resource
    Get { id: u64 },
    /// Create a resource
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        base_url: String,
        #[arg(long)]
        public: bool,
        #[arg(long)]
        timeout: Option<u32>,
    },
    /// Apply a JSON patch body, e.g. '{"timeout_secs": 60}'
    Update { id: u64, patch: String },
    /// Deactivate (or remove with --hard)
    Delete {
        id: u64,
        #[arg(long)]
        hard: bool,
    },
    /// Reactivate a deactivated resource
    Activate { id: u64 },
}

#[derive(Subcommand)]
enum GrantCommand {
    /// List grants, optionally filtered
    List {
        #[arg(long)]
        subject: Option<u64>,
        #[arg(long)]
        resource: Option<u64>,
    },
    /// Grant a subject (or everyone, without --subject) access to a resource
    Create {
        #[arg(long)]
        resource: u64,
        #[arg(long)]
        subject: Option<u64>,
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Open a resource to everyone
    Global { resource: u64 },
    /// Remove a grant
    Remove { id: u64 },
    /// Check whether a subject may access a resource
    Check {
        #[arg(long)]
        resource: u64,
        #[arg(long)]
        subject: Option<u64>,
    },
}

struct Admin {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl Admin {
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.url.trim_end_matches('/'), path))
            .headers(self.headers.clone());
        if let Some(body) = body {
            req = req.json(&body);
        }
        print_response(req.send().await?).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let admin = Admin {
        client: reqwest::Client::new(),
        url: cli.url,
        headers,
    };

    match cli.command {
        Commands::Status => admin.call(Method::GET, "/admin/status", None).await?,
        Commands::Cleanup => admin.call(Method::POST, "/admin/cleanup", None).await?,
        Commands::Reload => admin.call(Method::POST, "/admin/reload", None).await?,
        Commands::Config => admin.call(Method::GET, "/admin/config", None).await?,
        Commands::Stats => admin.call(Method::GET, "/admin/stats", None).await?,
        Commands::Resource(cmd) => match cmd {
            ResourceCommand::List { all } => {
                let path = format!("/admin/resources?include_inactive={}", all);
                admin.call(Method::GET, &path, None).await?
            }
            ResourceCommand::Get { id } => {
                admin.call(Method::GET, &format!("/admin/resources/{}", id), None).await?
            }
            ResourceCommand::Create {
                name,
                slug,
                path,
                base_url,
                public,
                timeout,
            } => {
                let mut body = json!({
                    "name": name,
                    "slug": slug,
                    "proxy_path": path,
                    "base_url": base_url,
                    "requires_auth": !public,
                });
                if let Some(timeout) = timeout {
                    body["timeout_secs"] = json!(timeout);
                }
                admin.call(Method::POST, "/admin/resources", Some(body)).await?
            }
            ResourceCommand::Update { id, patch } => {
                let body: Value = serde_json::from_str(&patch)?;
                admin
                    .call(Method::PUT, &format!("/admin/resources/{}", id), Some(body))
                    .await?
            }
            ResourceCommand::Delete { id, hard } => {
                let path = format!("/admin/resources/{}?hard={}", id, hard);
                admin.call(Method::DELETE, &path, None).await?
            }
            ResourceCommand::Activate { id } => {
                let path = format!("/admin/resources/{}/activate", id);
                admin.call(Method::POST, &path, None).await?
            }
        },
        Commands::Grant(cmd) => match cmd {
            GrantCommand::List { subject, resource } => {
                let mut query = Vec::new();
                if let Some(s) = subject {
                    query.push(format!("subject_id={}", s));
                }
                if let Some(r) = resource {
                    query.push(format!("resource_id={}", r));
                }
                let path = if query.is_empty() {
                    "/admin/grants".to_string()
                } else {
                    format!("/admin/grants?{}", query.join("&"))
                };
                admin.call(Method::GET, &path, None).await?
            }
            GrantCommand::Create {
                resource,
                subject,
                ttl,
            } => {
                let body = json!({ "resource_id": resource, "subject_id": subject, "ttl_secs": ttl });
                admin.call(Method::POST, "/admin/grants", Some(body)).await?
            }
            GrantCommand::Global { resource } => {
                let body = json!({ "resource_id": resource });
                admin.call(Method::POST, "/admin/grants/global", Some(body)).await?
            }
            GrantCommand::Remove { id } => {
                admin.call(Method::DELETE, &format!("/admin/grants/{}", id), None).await?
            }
            GrantCommand::Check { resource, subject } => {
                let body = json!({ "resource_id": resource, "subject_id": subject });
                admin.call(Method::POST, "/admin/access", Some(body)).await?
            }
        },
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        eprintln!("Response: {}", text);
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => print!("{}", text),
    }
    Ok(())
}
