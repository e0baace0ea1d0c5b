//! Command-line single-fetch client.
//!
//! Prints decoded route data, action results and redirects as JSON.

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value as Json};
use url::Url;

use canopy::client::{FetchResult, SingleFetchClient};
use canopy::codec::{Decoded, Entry};

#[derive(Parser)]
#[command(name = "canopy-fetch")]
#[command(about = "Fetch route data from a canopy server over single fetch", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the loaders for a path
    Load {
        path: String,
        /// Comma-separated route ids to load (`_routes`)
        #[arg(short, long)]
        routes: Option<String>,
    },
    /// Submit a form to the action for a path
    Submit {
        path: String,
        /// Form fields as key=value
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = SingleFetchClient::new(Url::parse(&cli.url)?)?;

    let result = match cli.command {
        Commands::Load { path, routes } => {
            let url = client.resolve(&path)?;
            client.load(&url, routes.as_deref()).await?
        }
        Commands::Submit { path, fields } => {
            let url = client.resolve(&path)?;
            let form: Vec<(&str, &str)> = fields
                .iter()
                .map(|field| field.split_once('=').unwrap_or((field.as_str(), "")))
                .collect();
            client.submit(&url, &form).await?
        }
    };

    print_result(&result)?;
    Ok(())
}

fn print_result(result: &FetchResult) -> Result<(), serde_json::Error> {
    let body = match &result.decoded {
        Decoded::Redirect(redirect) => json!({
            "redirect": redirect.location,
            "status": redirect.status.as_u16(),
            "revalidate": redirect.revalidate,
        }),
        Decoded::Routes(entries) => {
            let mut routes = Map::new();
            for (id, entry) in entries {
                routes.insert(id.clone(), entry_json(entry));
            }
            Json::Object(routes)
        }
        Decoded::Action(entry) => entry_json(entry),
    };

    if !result.status.is_success() {
        eprintln!("Server returned status {}", result.status);
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn entry_json(entry: &Entry) -> Json {
    match entry {
        Entry::Data(value) => json!({ "data": value.to_plain_json() }),
        Entry::Error(value) => json!({ "error": value.to_plain_json() }),
    }
}
