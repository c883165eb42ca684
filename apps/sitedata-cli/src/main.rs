use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value as JsonValue};
use sitedata_store::{
    app_grants_from_json, json_truthy, SiteData, SiteDataCall, SiteDataConfig, SiteRef, SiteValue,
    StaticNameResolver,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "sitedata", version, about = "Per-origin site data store")]
struct Cli {
    /// Directory holding the site data database
    #[arg(long)]
    dir: PathBuf,
    /// Optional TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Alias host mapping for the alias scheme, as name=target (repeatable)
    #[arg(long = "alias", value_name = "NAME=TARGET", value_parser = parse_alias)]
    aliases: Vec<(String, String)>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the schema version after setup
    Version,
    /// Read one value
    Get {
        #[command(flatten)]
        site: SiteArgs,
        key: String,
    },
    /// Write one value (JSON scalars are parsed, anything else is stored as text)
    Set {
        #[command(flatten)]
        site: SiteArgs,
        key: String,
        value: String,
    },
    /// Delete one value
    Clear {
        #[command(flatten)]
        site: SiteArgs,
        key: String,
    },
    /// List every origin with stored data
    Origins,
    /// Dump every key stored for one origin
    Entries {
        #[command(flatten)]
        site: SiteArgs,
    },
    /// Permission helpers
    Perms {
        #[command(subcommand)]
        cmd: PermsCmd,
    },
    /// Dispatch a raw JSON call, e.g. '{"method":"getPermission","url":"...","name":"js"}'
    Call { json: String },
}

#[derive(Subcommand)]
enum PermsCmd {
    /// All permissions for a site
    List {
        #[command(flatten)]
        site: SiteArgs,
    },
    Get {
        #[command(flatten)]
        site: SiteArgs,
        name: String,
    },
    Set {
        #[command(flatten)]
        site: SiteArgs,
        name: String,
        value: String,
    },
    Clear {
        #[command(flatten)]
        site: SiteArgs,
        name: String,
    },
    /// Remove a permission from every origin
    ClearEverywhere { name: String },
    /// Granted network origins
    Network {
        #[command(flatten)]
        site: SiteArgs,
    },
    /// App capability grants
    App {
        #[command(flatten)]
        site: SiteArgs,
    },
    /// Replace app capability grants with a JSON object, e.g. '{"fs":["read"]}'
    SetApp {
        #[command(flatten)]
        site: SiteArgs,
        grants: String,
    },
}

#[derive(Args)]
struct SiteArgs {
    /// URL (or, with --origin, an already normalized origin)
    url: String,
    /// Use the argument verbatim as the origin
    #[arg(long)]
    origin: bool,
}

impl SiteArgs {
    fn site(&self) -> SiteRef<'_> {
        if self.origin {
            SiteRef::Origin(&self.url)
        } else {
            SiteRef::Url(&self.url)
        }
    }
}

fn parse_alias(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, target)) if !name.is_empty() && !target.is_empty() => {
            Ok((name.to_string(), target.to_string()))
        }
        _ => Err(format!("expected NAME=TARGET, got {raw:?}")),
    }
}

/// JSON literals (`true`, `3`, `null`, ...) are parsed; anything else is text.
fn parse_value(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn optional(value: Option<SiteValue>) -> JsonValue {
    value.map(|v| v.to_json()).unwrap_or(JsonValue::Null)
}

fn print_json(v: &JsonValue) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

async fn open_store(cli: &Cli) -> Result<SiteData> {
    let config = match &cli.config {
        Some(path) => SiteDataConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SiteDataConfig::default(),
    }
    .with_env_overrides();
    let mut names = StaticNameResolver::new();
    for (name, target) in &cli.aliases {
        names.insert(name.as_str(), target.as_str());
    }
    SiteData::open(&cli.dir, &config, Arc::new(names))
        .await
        .with_context(|| format!("opening site data in {}", cli.dir.display()))
}

async fn run(cli: Cli) -> Result<()> {
    let store = open_store(&cli).await?;
    let out = match &cli.command {
        Commands::Version => json!(store.schema_version().await?),
        Commands::Get { site, key } => optional(store.get(site.site(), key).await?),
        Commands::Set { site, key, value } => {
            let value = SiteValue::from_json(&parse_value(value));
            json!({ "written": store.set(site.site(), key, value).await? })
        }
        Commands::Clear { site, key } => {
            json!({ "cleared": store.clear(site.site(), key).await? })
        }
        Commands::Origins => json!(store.origins().await?),
        Commands::Entries { site } => {
            let entries = store.entries(site.site()).await?;
            JsonValue::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json()))
                    .collect(),
            )
        }
        Commands::Perms { cmd } => run_perms(&store, cmd).await?,
        Commands::Call { json } => {
            let call: SiteDataCall =
                serde_json::from_str(json).map_err(|e| anyhow!("invalid call: {e}"))?;
            store.call(call).await?
        }
    };
    print_json(&out)
}

async fn run_perms(store: &SiteData, cmd: &PermsCmd) -> Result<JsonValue> {
    let out = match cmd {
        PermsCmd::List { site } => {
            let perms = store.get_all_permissions(site.site()).await?;
            JsonValue::Object(perms.into_iter().map(|(k, v)| (k, v.to_json())).collect())
        }
        PermsCmd::Get { site, name } => optional(store.get_permission(site.site(), name).await?),
        PermsCmd::Set { site, name, value } => {
            let granted = json_truthy(&parse_value(value));
            json!({ "written": store.set_permission(site.site(), name, granted).await? })
        }
        PermsCmd::Clear { site, name } => {
            json!({ "cleared": store.clear_permission(site.site(), name).await? })
        }
        PermsCmd::ClearEverywhere { name } => {
            json!({ "removed": store.clear_permission_everywhere(name).await? })
        }
        PermsCmd::Network { site } => json!(store.get_network_permissions(site.site()).await?),
        PermsCmd::App { site } => json!(store.get_app_permissions(site.site()).await?),
        PermsCmd::SetApp { site, grants } => {
            let raw: JsonValue =
                serde_json::from_str(grants).context("grants must be a JSON object")?;
            let grants = app_grants_from_json(&raw);
            json!({ "written": store.set_app_permissions(site.site(), &grants).await? })
        }
    };
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    tracing::debug!(dir = %cli.dir.display(), "sitedata cli");
    run(cli).await
}
