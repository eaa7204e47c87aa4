use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use workcore::{
    ChannelCallback, HandlerEvent, ProcessDefinition, ProcessStatus, Termination, Value, WorkItem,
    WorkItemEvent,
};
use workruntime::{ExecutionEngine, HandlerRegistry, ProcessRuntime, RuntimeConfig};

#[derive(Parser)]
#[command(name = "work")]
#[command(about = "Work item engine CLI", long_about = None)]
struct Cli {
    /// Runtime configuration JSON file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a process: a built-in id or a definition JSON file
    Run {
        process: String,

        /// Initial variables as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Execute a single work item
    Dispatch {
        work_item_type: String,

        /// Parameters as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a process definition file
    Validate { file: PathBuf },

    /// List available work item handlers
    Handlers,

    /// Write an example process definition
    Init {
        #[arg(short, long, default_value = "process.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            process,
            input,
            verbose,
        } => {
            init_tracing(verbose);
            run_process(&process, input.as_deref(), config).await?;
        }
        Commands::Dispatch {
            work_item_type,
            input,
            verbose,
        } => {
            init_tracing(verbose);
            dispatch(&work_item_type, input.as_deref(), config).await?;
        }
        Commands::Validate { file } => validate(&file)?,
        Commands::Handlers => list_handlers()?,
        Commands::Init { output } => create_example(&output)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let Some(path) = path else {
        return Ok(RuntimeConfig::from_env());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = serde_json::from_str(&json)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

/// Parse a JSON object into named values
fn parse_object(input: Option<&str>) -> Result<HashMap<String, Value>> {
    let Some(input) = input else {
        return Ok(HashMap::new());
    };
    match serde_json::from_str(input)? {
        serde_json::Value::Object(obj) => Ok(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        _ => bail!("Input must be a JSON object"),
    }
}

fn registry() -> Result<Arc<HandlerRegistry>> {
    let registry = HandlerRegistry::new();
    workhandlers::register_all(&registry)?;
    Ok(Arc::new(registry))
}

fn print_events(mut events: broadcast::Receiver<WorkItemEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                WorkItemEvent::WorkItemStarted {
                    work_item_id,
                    work_item_type,
                    ..
                } => println!("  ⚡ Starting {} ({})", work_item_type, work_item_id),
                WorkItemEvent::AttemptFailed {
                    attempt, code, message, ..
                } => println!("  ❌ Attempt {} failed: {}: {}", attempt, code, message),
                WorkItemEvent::RetryScheduled {
                    next_attempt,
                    delay_ms,
                    ..
                } => println!("  🔁 Attempt {} in {}ms", next_attempt, delay_ms),
                WorkItemEvent::WorkItemCompleted {
                    work_item_id,
                    duration_ms,
                    ..
                } => println!("  ✅ {} completed in {}ms", work_item_id, duration_ms),
                WorkItemEvent::WorkItemAborted {
                    work_item_id, reason, ..
                } => println!("  ⛔ {} aborted: {}", work_item_id, reason),
                WorkItemEvent::WorkItemFailed {
                    work_item_id, code, ..
                } => println!("  💥 {} failed: {}", work_item_id, code),
                WorkItemEvent::HandlerEvent { event, .. } => match event {
                    HandlerEvent::Info { message } => println!("     ℹ️  {}", message),
                    HandlerEvent::Warning { message } => println!("     ⚠️  {}", message),
                    HandlerEvent::Progress { percent, message } => {
                        println!("     📊 {}% {}", percent, message.unwrap_or_default())
                    }
                },
                WorkItemEvent::AttemptStarted { .. } => {}
            }
        }
    })
}

fn print_values(values: &HashMap<String, Value>) -> Result<()> {
    let json: serde_json::Map<_, _> = values
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn run_process(process: &str, input: Option<&str>, config: RuntimeConfig) -> Result<()> {
    let variables = parse_object(input)?;
    let runtime = ProcessRuntime::new(registry()?, config);

    // A definition file replaces the built-in set
    let process_id = if Path::new(process).is_file() {
        let definition = read_definition(Path::new(process))?;
        let id = definition.id.clone();
        runtime.register_definition(definition).await?;
        id
    } else {
        workhandlers::register_processes(&runtime).await?;
        process.to_string()
    };

    println!("🚀 Running process: {}", process_id);
    let printer = print_events(runtime.subscribe_events());

    let outcome = runtime.run_process(&process_id, variables).await?;
    runtime.engine().shutdown().await;
    printer.abort();

    println!();
    println!("📊 Instance {}: {:?}", outcome.instance_id, outcome.status);
    match outcome.status {
        ProcessStatus::Completed => print_values(&outcome.variables)?,
        ProcessStatus::Failed => {
            if let Some(fault) = outcome.fault {
                bail!("process failed: {}", fault);
            }
            bail!("process failed");
        }
        ProcessStatus::Aborted | ProcessStatus::Active => {
            let reason = outcome.abort_reason.map(|r| r.to_string()).unwrap_or_default();
            bail!("process aborted: {}", reason);
        }
    }
    Ok(())
}

async fn dispatch(work_item_type: &str, input: Option<&str>, config: RuntimeConfig) -> Result<()> {
    let parameters = parse_object(input)?;
    let (callback, mut terminations) = ChannelCallback::channel();
    let engine = ExecutionEngine::new(registry()?, Arc::new(callback), &config);
    let printer = print_events(engine.subscribe_events());

    let item = WorkItem::new(work_item_type, uuid::Uuid::new_v4()).with_parameters(parameters);
    engine.start_work_item(item)?;

    let termination = terminations
        .recv()
        .await
        .context("engine stopped without reporting the work item")?;
    printer.abort();

    match termination {
        Termination::Completed { results, .. } => print_values(&results)?,
        Termination::Aborted { reason, .. } => bail!("work item aborted: {}", reason),
        Termination::Failed { fault, .. } => bail!("work item failed: {}", fault),
    }
    Ok(())
}

fn read_definition(file: &Path) -> Result<ProcessDefinition> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let definition: ProcessDefinition = serde_json::from_str(&json)?;
    Ok(definition)
}

fn validate(file: &Path) -> Result<()> {
    println!("🔍 Validating process: {}", file.display());

    let definition = read_definition(file)?;
    definition.validate()?;

    let registry = registry()?;
    let unknown: Vec<_> = definition
        .tasks
        .iter()
        .filter(|t| !registry.contains(&t.work_item_type))
        .map(|t| format!("{} ({})", t.name, t.work_item_type))
        .collect();
    if !unknown.is_empty() {
        bail!("tasks with unknown work item types: {}", unknown.join(", "));
    }

    println!("✅ Process is valid:");
    println!("   Id: {}", definition.id);
    println!("   Name: {}", definition.name);
    println!("   Tasks: {}", definition.tasks.len());
    Ok(())
}

fn list_handlers() -> Result<()> {
    println!("📦 Available work item handlers:");
    println!();

    let registry = registry()?;
    for work_item_type in registry.list_types() {
        match registry.metadata(&work_item_type) {
            Some(metadata) => {
                println!("  • {} ({})", work_item_type, metadata.category);
                println!("    {}", metadata.description);
                for p in &metadata.parameters {
                    let flag = if p.required { "required" } else { "optional" };
                    println!("      - {} [{}]: {}", p.name, flag, p.description);
                }
            }
            None => println!("  • {}", work_item_type),
        }
    }
    Ok(())
}

fn create_example(output: &Path) -> Result<()> {
    let definition = workhandlers::processes::hello_boundary();
    std::fs::write(output, serde_json::to_string_pretty(&definition)?)?;

    println!("✨ Created example process: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  work run {} --input '{{\"name\": \"world\"}}'", output.display());
    Ok(())
}
