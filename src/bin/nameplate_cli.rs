//! Nameplate CLI - JSON bridge to the design compiler
//!
//! Commands: templates, validate, compile, estimate, batch
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on validation/compile refusal, 1 on other errors

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use nameplate_core::{
    logging, rows, BatchCoordinator, BatchOptions, CommandEngine, DesignLimits, DesignModel,
    DesignPatch, DesignPipeline, ExportFormat, ExportOptions, GeometryEngine, PlanFileEngine,
    ProjectFile, TemplateCatalog,
};

#[derive(Parser)]
#[command(name = "nameplate-cli")]
#[command(about = "Nameplate CLI - validate and compile 3D nameplate designs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory of extra template definitions (*.json)
    #[arg(short, long, default_value = "templates")]
    templates_dir: PathBuf,

    /// JSON file overriding the default design limits
    #[arg(short, long)]
    limits: Option<PathBuf>,
}

#[derive(Args)]
struct DesignArgs {
    /// Start from a saved project file
    #[arg(long)]
    project: Option<PathBuf>,

    /// Template name merged onto the starting design
    #[arg(short, long)]
    template: Option<String>,

    /// JSON object of field overrides applied last
    #[arg(short, long)]
    payload: Option<String>,
}

#[derive(Args)]
struct ExportArgs {
    /// Directory the engine writes into
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Export formats (repeatable)
    #[arg(short, long, value_enum, default_values_t = [FormatArg::Stl])]
    format: Vec<FormatArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Stl,
    Obj,
    Blend,
}

impl From<FormatArg> for ExportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Stl => ExportFormat::Stl,
            FormatArg::Obj => ExportFormat::Obj,
            FormatArg::Blend => ExportFormat::Blend,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available templates
    Templates {
        /// Only templates in this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Validate a design and print its printability score
    Validate {
        #[command(flatten)]
        design: DesignArgs,
    },

    /// Compile a design into a build plan
    Compile {
        #[command(flatten)]
        design: DesignArgs,

        #[command(flatten)]
        export: ExportArgs,

        /// File stem for exported files
        #[arg(long)]
        stem: Option<String>,
    },

    /// Estimate print time, weight and material cost
    Estimate {
        #[command(flatten)]
        design: DesignArgs,

        /// Filament price per kilogram
        #[arg(long, default_value_t = 20.0)]
        price_per_kg: f64,
    },

    /// Generate one build plan per row of a CSV or JSON file
    Batch {
        #[command(flatten)]
        design: DesignArgs,

        #[command(flatten)]
        export: ExportArgs,

        /// Rows file (.csv or .json)
        #[arg(short, long)]
        rows: PathBuf,

        /// Jobs allowed at the engine at once
        #[arg(long, default_value = "4")]
        max_concurrency: NonZeroUsize,

        /// Per-job timeout in seconds
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,

        /// External engine program; receives the plan file path as last argument
        #[arg(long)]
        engine_cmd: Option<PathBuf>,

        /// Extra arguments for the engine program (repeatable)
        #[arg(long = "engine-arg")]
        engine_args: Vec<String>,
    },
}

fn fail(code: u8, value: Value) -> ExitCode {
    println!("{}", value);
    ExitCode::from(code)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn resolve_design(pipeline: &DesignPipeline, args: &DesignArgs) -> Result<DesignModel, String> {
    let mut model = match &args.project {
        Some(path) => ProjectFile::load(path).map_err(|e| e.to_string())?.design,
        None => DesignModel::default(),
    };
    if let Some(name) = &args.template {
        model = pipeline.get_template(name).map_err(|e| e.to_string())?.apply(&model);
    }
    if let Some(payload) = &args.payload {
        let value: Value = serde_json::from_str(payload).map_err(|e| format!("Invalid payload: {}", e))?;
        let map = value.as_object().ok_or("Invalid payload: expected a JSON object")?;
        let patch = DesignPatch::from_json_map(map).map_err(|e| e.to_string())?;
        patch.merge_into(&mut model);
    }
    Ok(model)
}

fn export_options(args: &ExportArgs, stem: Option<String>) -> ExportOptions {
    ExportOptions {
        formats: args.format.iter().copied().map(ExportFormat::from).collect(),
        output_dir: args.output_dir.clone(),
        file_stem: stem,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    let catalog = match TemplateCatalog::load_from_dir(&cli.templates_dir) {
        Ok(c) => c,
        Err(e) => return fail(1, json!({"error": format!("Failed to load templates: {}", e)})),
    };
    let limits = match &cli.limits {
        Some(path) => match DesignLimits::load_from_file(path) {
            Ok(l) => l,
            Err(e) => return fail(1, json!({"error": e.to_string()})),
        },
        None => DesignLimits::default(),
    };

    let export = match &cli.command {
        Commands::Compile { export, stem, .. } => export_options(export, stem.clone()),
        Commands::Batch { export, .. } => export_options(export, None),
        _ => ExportOptions::default(),
    };
    let pipeline = DesignPipeline::new(catalog, limits, export);

    let result = match cli.command {
        Commands::Templates { category } => {
            let templates: Vec<_> = pipeline
                .list_templates()
                .into_iter()
                .filter(|t| category.as_ref().map_or(true, |c| &t.category == c))
                .collect();
            print_json(&templates).map(|_| ExitCode::SUCCESS)
        }

        Commands::Validate { design } => resolve_design(&pipeline, &design).and_then(|model| {
            let result = pipeline.validate_design(&model);
            print_json(&result)?;
            Ok(if result.is_valid { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }),

        Commands::Compile { design, .. } => resolve_design(&pipeline, &design).and_then(|model| {
            match pipeline.compile_design(&model) {
                Ok(plan) => {
                    print_json(&json!({"success": true, "plan": plan}))?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => Ok(fail(2, json!({"success": false, "error": e.to_string()}))),
            }
        }),

        Commands::Estimate { design, price_per_kg } => resolve_design(&pipeline, &design).and_then(|model| {
            let estimate = pipeline.estimate_design(&model, price_per_kg);
            print_json(&json!({
                "estimate": estimate,
                "print_time": estimate.print_time_label(),
            }))?;
            Ok(ExitCode::SUCCESS)
        }),

        Commands::Batch { design, rows, max_concurrency, timeout_secs, engine_cmd, engine_args, .. } => {
            run_batch(&pipeline, &design, rows, max_concurrency, timeout_secs, engine_cmd, engine_args).await
        }
    };

    result.unwrap_or_else(|e| fail(1, json!({"error": e})))
}

async fn run_batch(
    pipeline: &DesignPipeline,
    design: &DesignArgs,
    rows_path: PathBuf,
    max_concurrency: NonZeroUsize,
    timeout_secs: u64,
    engine_cmd: Option<PathBuf>,
    engine_args: Vec<String>,
) -> Result<ExitCode, String> {
    let base = resolve_design(pipeline, design)?;
    let is_json = rows_path.extension().map_or(false, |e| e == "json");
    let rows = if is_json {
        let content = std::fs::read_to_string(&rows_path).map_err(|e| e.to_string())?;
        let value: Value = serde_json::from_str(&content).map_err(|e| e.to_string())?;
        rows::parse_json(&value)
    } else {
        rows::load_csv(&rows_path)
    }
    .map_err(|e| e.to_string())?;

    let engine: Arc<dyn GeometryEngine> = match engine_cmd {
        Some(program) => Arc::new(CommandEngine::new(program, engine_args)),
        None => Arc::new(PlanFileEngine),
    };
    let options = BatchOptions {
        max_concurrency,
        job_timeout: Duration::from_secs(timeout_secs),
    };
    let coordinator = BatchCoordinator::new(pipeline.compiler(), engine, options);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let report = coordinator.run(&base, rows, cancel).await;
    let summary = report.summary();
    print_json(&json!({"summary": summary, "report": report}))?;
    Ok(if summary.done == summary.total { ExitCode::SUCCESS } else { ExitCode::from(2) })
}
