use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use rolegate_core::cache::InMemoryPermissionCache;
use rolegate_core::engine::ResolveOptions;
use rolegate_core::model::{CheckRequest, ResourceTarget};
use rolegate_service::cli::{Cli, Command};
use rolegate_service::config::{AppConfig, LogFormat};
use rolegate_service::metrics::Metrics;
use rolegate_service::seed::SeedFile;
use rolegate_service::service::AuthzService;
use rolegate_storage::{EntityStore, InMemoryStore, PostgresStore};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output on stdout stays machine-readable.
    match config.log.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr);
            registry.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr);
            registry.with(fmt_layer).init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config);
    let metrics = cli.metrics.then(|| Arc::new(Metrics::new()));
    let ctx = RunContext {
        config: &config,
        metrics: metrics.as_ref(),
    };

    match cli.command {
        Command::Migrate => run_migrate(&config).await,
        Command::Check {
            user,
            resource_type,
            resource,
            action,
            seed,
        } => {
            let request = CheckRequest {
                user_id: user,
                resource_type,
                resource: ResourceTarget::from(resource),
                action,
            };
            match seed {
                Some(path) => run_check(&ctx, seeded_store(&path).await?, &request).await,
                None => run_check(&ctx, database_store(&config).await?, &request).await,
            }
        }
        Command::Matrix { user, seed } => match seed {
            Some(path) => run_matrix(&ctx, seeded_store(&path).await?, &user).await,
            None => run_matrix(&ctx, database_store(&config).await?, &user).await,
        },
    }
}

async fn run_migrate(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("running database migrations");
    let store = database_store(config).await?;
    rolegate_storage::run_migrations(store.pool()).await?;
    tracing::info!("migrations completed successfully");
    Ok(())
}

async fn seeded_store(path: &Path) -> Result<Arc<InMemoryStore>, Box<dyn std::error::Error>> {
    let store = InMemoryStore::new();
    SeedFile::load(path)?.apply(&store).await?;
    Ok(Arc::new(store))
}

async fn database_store(config: &AppConfig) -> Result<Arc<PostgresStore>, Box<dyn std::error::Error>> {
    let store = PostgresStore::connect(&config.database.url, config.database.max_connections).await?;
    Ok(Arc::new(store))
}

struct RunContext<'a> {
    config: &'a AppConfig,
    metrics: Option<&'a Arc<Metrics>>,
}

impl RunContext<'_> {
    fn build_service<S: EntityStore>(&self, store: Arc<S>) -> AuthzService<S, InMemoryPermissionCache> {
        let service = AuthzService::new(
            store,
            Arc::new(InMemoryPermissionCache::new(self.config.to_cache_config())),
            self.config.to_engine_config(),
        );
        match self.metrics {
            Some(metrics) => service.with_metrics(Arc::clone(metrics)),
            None => service,
        }
    }

    fn report_metrics(&self) {
        if let Some(metrics) = self.metrics {
            eprint!("{}", metrics.render_prometheus());
        }
    }
}

async fn run_check<S: EntityStore>(
    ctx: &RunContext<'_>,
    store: Arc<S>,
    request: &CheckRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = ctx.build_service(store);

    let result = service.authorize(request, &ResolveOptions::default()).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    ctx.report_metrics();
    if !result.allowed {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_matrix<S: EntityStore>(
    ctx: &RunContext<'_>,
    store: Arc<S>,
    user_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = ctx.build_service(store);

    let matrix = service
        .permission_matrix(user_id, &ResolveOptions::default())
        .await?;

    println!("{}", serde_json::to_string_pretty(&matrix)?);
    ctx.report_metrics();
    Ok(())
}
