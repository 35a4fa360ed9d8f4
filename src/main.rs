use clap::{Parser, Subcommand};
use log::{error, info};
use prometheus::Registry;
use slog::{o, Drain, Logger};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use typeflow::client::{StartWorkflowOptions, WorkflowResultOptions};
use typeflow::metrics::{self, ClientMetrics};
use typeflow::sample::{self, SAY_HELLO};
use typeflow::serverless::{router, OnDemandWorkerHandler, SharedHandler};
use typeflow::{Client, ClientOptions, Worker, WorkerOptions};

#[derive(Parser, Debug)]
#[command(name = "typeflow")]
#[command(about = "Run the say-hello sample workflow on the in-process engine", long_about = None)]
struct Args {
    /// Task queue the sample worker serves
    #[arg(short, long, default_value = sample::TASK_QUEUE)]
    task_queue: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start one workflow and print its result
    Run {
        #[arg(short, long, default_value = "World")]
        name: String,
    },
    /// Start a workflow every interval until the duration elapses
    StartMany {
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,

        #[arg(long, default_value_t = 10_000)]
        duration_ms: u64,
    },
    /// Queue workflows and serve the on-demand worker over HTTP
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        listen: SocketAddr,

        /// Number of workflows queued before serving
        #[arg(short, long, default_value_t = 1)]
        queued: usize,

        /// Address serving Prometheus metrics at /metrics
        #[arg(long, default_value = "127.0.0.1:9090")]
        metrics_listen: SocketAddr,
    },
}

fn root_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let logger = root_logger();
    let registry = Arc::new(Registry::new());
    let client = Client::local(ClientOptions::from_env(), logger)
        .with_metrics(ClientMetrics::new(&registry)?);

    match args.command {
        Command::Run { name } => run(&client, &args.task_queue, name).await,
        Command::StartMany {
            interval_ms,
            duration_ms,
        } => {
            start_many(
                &client,
                &args.task_queue,
                Duration::from_millis(interval_ms),
                Duration::from_millis(duration_ms),
            )
            .await
        }
        Command::Serve {
            listen,
            queued,
            metrics_listen,
        } => {
            serve(
                &client,
                &args.task_queue,
                listen,
                queued,
                metrics_listen,
                registry,
            )
            .await
        }
    }
}

async fn run(
    client: &Client,
    task_queue: &str,
    name: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let worker = Worker::new(client, WorkerOptions::new(task_queue));
    sample::register(&worker)?;
    worker.start()?;

    let handle = SAY_HELLO
        .start(client, name, StartWorkflowOptions::new(task_queue))
        .await?;
    info!("Started workflow {}", handle.id);

    let greeting = handle.get_result(WorkflowResultOptions::default()).await?;
    println!("{}", greeting);

    worker.stop();
    Ok(())
}

async fn start_many(
    client: &Client,
    task_queue: &str,
    interval: Duration,
    duration: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let worker = Worker::new(client, WorkerOptions::new(task_queue));
    sample::register(&worker)?;
    worker.start()?;

    let deadline = Instant::now() + duration;
    let mut ticker = tokio::time::interval(interval);
    let mut started = 0u64;
    let outcome = loop {
        if Instant::now() >= deadline {
            break Ok(());
        }
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break Ok(());
            }
            _ = ticker.tick() => {}
        }
        if let Err(e) = SAY_HELLO
            .start(
                client,
                format!("caller-{}", started),
                StartWorkflowOptions::new(task_queue),
            )
            .await
        {
            error!("Failed to start workflow: {}", e);
            break Err(e);
        }
        started += 1;
        if started % 50 == 0 {
            info!("Started {} workflows", started);
        }
    };
    info!("Started {} workflows in total", started);

    worker.stop();
    outcome.map_err(Into::into)
}

async fn serve(
    client: &Client,
    task_queue: &str,
    listen: SocketAddr,
    queued: usize,
    metrics_listen: SocketAddr,
    registry: Arc<Registry>,
) -> Result<(), Box<dyn std::error::Error>> {
    for i in 0..queued {
        let handle = SAY_HELLO
            .start(client, format!("queued-{}", i), StartWorkflowOptions::new(task_queue))
            .await?;
        info!("Queued workflow {}", handle.id);
    }

    let factory_client = client.clone();
    let factory_queue = task_queue.to_string();
    let shared = Arc::new(SharedHandler::new(move || {
        let client = factory_client.clone();
        let task_queue = factory_queue.clone();
        async move {
            let worker = Worker::new(&client, WorkerOptions::new(task_queue));
            sample::register(&worker)?;
            Ok::<_, typeflow::Error>(OnDemandWorkerHandler::new(worker))
        }
    }));

    let metrics_listener = tokio::net::TcpListener::bind(metrics_listen).await?;
    info!("Serving metrics on http://{}/metrics", metrics_listen);
    let metrics_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics::router(registry)).await {
            error!("Metrics server failed: {}", e);
        }
    });

    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("Serving on-demand worker on {}", listen);
    info!("Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, router(Arc::clone(&shared)))
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await?;

    metrics_server.abort();
    shared.close();
    Ok(())
}
