// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! netforge command-line compiler: reads a JSON layer graph and prints
//! Keras model source, the build order or the inferred shapes.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use netforge::config::{self, ProjectConfig};
use netforge::diagnostics::{ColorChoice, DiagnosticEmitter, DiagnosticFormat};
use netforge::pipeline::{compile_json, CompileProducts};
use netforge::shapes::format_shape;
use netforge::{LayerCatalog, RenderMode};

#[derive(Parser, Debug)]
#[command(author, version, about = None, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    compile: CompileArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the layer types of the active catalog.
    Layers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Code,
    Order,
    Shapes,
}

#[derive(Parser, Debug)]
struct CompileArgs {
    /// Graph document (JSON). Reads stdin when omitted.
    #[arg(value_name = "GRAPH")]
    input: Option<PathBuf>,
    /// Layer catalog (TOML). Defaults to the bundled Keras catalog.
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,
    /// Project configuration. Defaults to the nearest netforge.toml.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Calling convention of the generated code (auto|stacked|wired).
    #[arg(long, value_name = "MODE")]
    mode: Option<String>,
    /// What to print.
    #[arg(long, value_enum, default_value = "code")]
    emit: Emit,
    /// Shape for every root layer, e.g. "(28, 28, 1)".
    #[arg(long, value_name = "SHAPE")]
    root_shape: Option<String>,
    /// Write the output here instead of stdout.
    #[arg(long, short, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Diagnostic output format (human|short|json).
    #[arg(long, value_name = "FORMAT", default_value = "human")]
    diagnostic_format: String,
    /// ANSI color handling (auto|always|never).
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    color: String,
    /// Only report diagnostics.
    #[arg(long)]
    check: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(1);
        }
    }
}

/// Returns `false` when the graph produced error diagnostics.
fn run(cli: &Cli) -> Result<bool> {
    let args = &cli.compile;
    let project = load_project(args.config.as_deref())?;
    let catalog = match &args.catalog {
        Some(path) => LayerCatalog::load(path)?,
        None => project.load_catalog()?,
    };

    if let Some(Command::Layers) = cli.command {
        print_layers(&catalog);
        return Ok(true);
    }

    let mut opts = project.compile_options();
    if let Some(mode) = &args.mode {
        opts.mode = mode.parse::<RenderMode>().map_err(anyhow::Error::msg)?;
    }
    if let Some(shape) = &args.root_shape {
        opts.root_shape = Some(shape.clone());
    }

    let source = read_graph(args.input.as_deref())?;
    let products = compile_json(&source, &catalog, &opts)?;

    let format = DiagnosticFormat::parse(&args.diagnostic_format).unwrap_or_default();
    let color = ColorChoice::parse(&args.color).unwrap_or_default();
    DiagnosticEmitter::new(format, color).emit_all(&products.diagnostics);

    if !args.check {
        let text = match args.emit {
            Emit::Code => products.code.clone(),
            Emit::Order => order_listing(&products),
            Emit::Shapes => shape_listing(&products),
        };
        match &args.output {
            Some(path) => fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.display()))?,
            None => print!("{text}"),
        }
    }

    Ok(!products.has_errors())
}

fn load_project(explicit: Option<&Path>) -> Result<ProjectConfig> {
    if let Some(path) = explicit {
        return config::load_config(path);
    }
    let cwd = std::env::current_dir().context("failed to read the working directory")?;
    match config::find_config(&cwd) {
        Some(path) => config::load_config(&path),
        None => Ok(ProjectConfig::default()),
    }
}

fn read_graph(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read the graph from stdin")?;
            Ok(buf)
        }
    }
}

fn order_listing(products: &CompileProducts) -> String {
    products
        .dag
        .ordered
        .iter()
        .map(|layer| format!("{}\t{}\t{}\n", layer.var_name, layer.id, layer.layer_type))
        .collect()
}

fn shape_listing(products: &CompileProducts) -> String {
    products
        .dag
        .ordered
        .iter()
        .map(|layer| {
            let shape = match products.shapes.shape(&layer.id) {
                Some(shape) => format_shape(shape),
                None => "?".to_string(),
            };
            format!("{}\t{}\t{shape}\n", layer.id, layer.layer_type)
        })
        .collect()
}

fn print_layers(catalog: &LayerCatalog) {
    for spec in catalog.iter() {
        println!(
            "{:<24} {:<16} {}",
            spec.name,
            spec.category.as_deref().unwrap_or("-"),
            spec.description.as_deref().unwrap_or("")
        );
    }
}
