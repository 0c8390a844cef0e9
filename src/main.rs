use std::sync::Arc;

use clap::{Parser, Subcommand};
use convoy_operator::components::app_instance_reconciler;
use convoy_operator::config::OperatorConfig;
use convoy_operator::crd::AppInstance;
use convoy_operator::render::TemplateRenderer;
use convoy_operator::store::{KubeStore, ResourceStore};
use convoy_operator::{controller, telemetry, Error};
use kube::api::Api;
use kube::ResourceExt;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(OperatorConfig),
    /// Show version information
    Version,
    /// List the AppInstances in the cluster
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Namespace to inspect (empty lists every namespace)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    namespace: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Convoy Operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(config) => run_operator(config).await,
    }
}

async fn run_info(args: InfoArgs) -> Result<(), Error> {
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    let api: Api<AppInstance> = if args.namespace.is_empty() {
        Api::all(client)
    } else {
        Api::namespaced(client, &args.namespace)
    };
    let instances = api
        .list(&Default::default())
        .await
        .map_err(Error::KubeError)?;

    println!("Managed AppInstances: {}", instances.items.len());
    for instance in &instances.items {
        let phase = instance
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("Unknown");
        println!(
            "  {}/{} {} ({})",
            instance.namespace().unwrap_or_default(),
            instance.name_any(),
            instance.spec.image_ref(),
            phase
        );
    }
    Ok(())
}

fn renderer(config: &OperatorConfig) -> Result<TemplateRenderer, Error> {
    match &config.templates_dir {
        Some(dir) => {
            info!("Loading template overrides from {}", dir.display());
            TemplateRenderer::with_overrides(dir)
        }
        None => Ok(TemplateRenderer::builtin()),
    }
}

async fn run_operator(config: OperatorConfig) -> Result<(), Error> {
    telemetry::init_tracing(config.log_format)?;
    info!("Starting Convoy Operator v{}", env!("CARGO_PKG_VERSION"));

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let store: Arc<dyn ResourceStore> = Arc::new(KubeStore::new(client.clone()));
    let http = reqwest::Client::builder()
        .timeout(config.slack_timeout())
        .build()?;
    let engine = app_instance_reconciler(Arc::clone(&store), Arc::new(renderer(&config)?), http);
    info!("Registered components: {:?}", engine.component_names());

    #[cfg(feature = "rest-api")]
    {
        let api_state = convoy_operator::rest_api::ApiState {
            store: Arc::clone(&store),
            namespace: config.namespace().map(str::to_string),
        };
        let addr = config.api_addr;
        tokio::spawn(async move {
            if let Err(e) = convoy_operator::rest_api::run_server(api_state, addr).await {
                tracing::error!("REST API server error: {:?}", e);
            }
        });
    }

    let state = Arc::new(controller::ControllerState {
        client,
        engine: Arc::new(engine),
        config,
    });

    // Run the main controller loop
    let result = controller::run_controller(state).await;

    // Flush any remaining traces
    telemetry::shutdown_telemetry();

    result
}
