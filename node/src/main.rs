//! ofactory node: schema-validated, content-addressed JSON object store
//! served over HTTP with capability-token authorization.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ofactory_auth::TokenCodec;
use ofactory_rpc::{start_server, AppState};
use ofactory_schema::{example_schema, Schema, StaticSchemaSource};
use ofactory_storage::{RetryPolicy, SledBackend};
use ofactory_types::Endpoint;

mod settings;

use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "ofactory-node")]
#[command(about = "Content-addressed JSON object store with capability tokens")]
#[command(version)]
struct Cli {
    /// Path to a configuration file (TOML); defaults to ./ofactory.toml
    #[arg(long)]
    config: Option<String>,

    /// Bind address, overrides configuration
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Sled database path, overrides configuration
    #[arg(long)]
    db_path: Option<String>,

    /// Signing secret, overrides configuration
    #[arg(long)]
    secret: Option<String>,

    /// Directory of schema JSON files to register at startup
    #[arg(long)]
    schemas_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        settings.host = host;
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(db_path) = cli.db_path {
        settings.db_path = db_path;
    }
    if let Some(secret) = cli.secret {
        settings.secret = secret;
    }
    if let Some(dir) = cli.schemas_dir {
        settings.schemas_dir = Some(dir.into());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        node_id = %settings.node_id,
        addr = %settings.bind_addr(),
        db_path = %settings.db_path,
        "starting ofactory node v{}",
        env!("CARGO_PKG_VERSION")
    );
    if settings.secret == Settings::default().secret {
        warn!("running with the default signing secret; set OFACTORY_SECRET in production");
    }

    let retry = RetryPolicy {
        attempts: settings.retry_attempts,
        base_delay: Duration::from_millis(10),
    };
    let backend = Arc::new(
        SledBackend::open(&settings.db_path, retry)
            .with_context(|| format!("failed to open database at {}", settings.db_path))?,
    );

    let schemas = build_schema_source(&settings)?;
    let state = AppState {
        store: backend.clone(),
        index: backend,
        codec: Arc::new(TokenCodec::from_secret(
            &settings.secret,
            settings.token_ttl_secs,
        )),
        schemas: Arc::new(schemas),
        validator: Arc::new(ofactory_schema::StructuralValidator::new()),
        node_id: settings.node_id.clone(),
        start_time: Instant::now(),
        req_count: Arc::new(AtomicUsize::new(0)),
    };

    start_server(state, &settings.bind_addr()).await
}

/// Seed the schema registry: the built-in example schema plus any JSON
/// files found in the configured directory, each keyed by the slug of its
/// title.
fn build_schema_source(settings: &Settings) -> Result<StaticSchemaSource> {
    let source = StaticSchemaSource::new();
    register_schema(&source, example_schema());

    if let Some(dir) = &settings.schemas_dir {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read schemas directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read schema file {}", path.display()))?;
            match serde_json::from_str(&raw) {
                Ok(value) => register_schema(&source, Schema::new(value)),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unparsable schema"),
            }
        }
    }

    info!(schemas = source.len(), "schema registry seeded");
    Ok(source)
}

fn register_schema(source: &StaticSchemaSource, schema: Schema) {
    let Some(slug) = schema.endpoint_slug() else {
        warn!("schema without a usable title, skipping");
        return;
    };
    match Endpoint::parse(&slug) {
        Ok(endpoint) => {
            info!(%endpoint, "registered schema");
            source.register(&endpoint, schema);
        }
        Err(err) => warn!(slug, error = %err, "schema title does not slug to a valid endpoint"),
    }
}
