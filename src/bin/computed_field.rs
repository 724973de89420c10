// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command line front end for region documents
//!
//! Builds a region from a JSON document and lists, describes or evaluates
//! its fields.

use std::fs;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use computed_field::model::{ElementId, FieldValueType, NodeId};
use computed_field::{EvaluationConfig, Region, RegionDocument};

#[derive(Parser)]
#[command(name = "computed-field")]
#[command(about = "Evaluate computed fields over finite-element meshes")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
struct Cli {
    /// JSON region document
    document: String,

    /// JSON evaluation configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every field in the region
    List {
        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },
    /// Describe one field
    Describe {
        /// Field name
        field: String,
    },
    /// Evaluate a field at a node or at an element location
    Evaluate {
        /// Field name
        field: String,
        /// Node to evaluate at
        #[arg(long, conflicts_with_all = ["element", "xi"])]
        node: Option<u32>,
        /// Element to evaluate in
        #[arg(long, requires = "xi")]
        element: Option<u32>,
        /// Element chart coordinates, comma separated
        #[arg(long, value_delimiter = ',', requires = "element")]
        xi: Option<Vec<f64>>,
        /// Time to evaluate at
        #[arg(short, long, default_value_t = 0.0)]
        time: f64,
        /// Also print xi derivatives of real values
        #[arg(short, long)]
        derivatives: bool,
    },
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(error) = run(cli) {
        eprintln!("Error: {error:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config file '{path}'"))?;
            EvaluationConfig::from_json(&text)?
        }
        None => EvaluationConfig::default(),
    };
    let region = load_region(&cli.document, config)?;

    match cli.command {
        Commands::List { pretty } => handle_list(&region, pretty),
        Commands::Describe { field } => handle_describe(&region, &field),
        Commands::Evaluate {
            field,
            node,
            element,
            xi,
            time,
            derivatives,
        } => handle_evaluate(&region, &field, node, element.zip(xi), time, derivatives),
    }
}

fn load_region(path: &str, config: EvaluationConfig) -> Result<Region> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading document '{path}'"))?;
    let document = RegionDocument::from_json(&text)?;
    let region = document
        .build(config)
        .with_context(|| format!("building region '{}'", document.name))?;
    log::info!(
        "Loaded region '{}' with {} fields",
        region.name(),
        region.module().field_count()
    );
    Ok(region)
}

fn handle_list(region: &Region, pretty: bool) -> Result<()> {
    let descriptions = region.module().list();
    let output = if pretty {
        serde_json::to_string_pretty(&descriptions)?
    } else {
        serde_json::to_string(&descriptions)?
    };
    println!("{output}");
    Ok(())
}

fn handle_describe(region: &Region, name: &str) -> Result<()> {
    let module = region.module();
    let handle = module.field_by_name(name)?.handle();
    let description = module.describe(handle)?;
    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(())
}

fn handle_evaluate(
    region: &Region,
    name: &str,
    node: Option<u32>,
    element: Option<(u32, Vec<f64>)>,
    time: f64,
    derivatives: bool,
) -> Result<()> {
    let module = region.module();
    let field = module.field_by_name(name)?;
    let handle = field.handle();
    let value_type = field.value_type();

    let mut cache = module.create_field_cache();
    match (node, element) {
        (Some(node), _) => cache.set_node_location(NodeId(node), time),
        (None, Some((element, xi))) => {
            cache.set_mesh_location(ElementId(element), &xi, None, time)?
        }
        (None, None) => cache.set_time(time),
    }

    if !derivatives {
        println!("{}", module.evaluate_string(&mut cache, handle, None)?);
        return Ok(());
    }
    if value_type != FieldValueType::Real {
        bail!("field '{name}' has {value_type} values, which have no derivatives");
    }
    let (values, derivatives) = module.evaluate_real_with_derivatives(&mut cache, handle)?;
    let number_of_xi = derivatives.len() / values.len().max(1);
    println!("values: {values:?}");
    for (component, row) in derivatives.chunks(number_of_xi.max(1)).enumerate() {
        println!("d{}/dxi: {row:?}", component + 1);
    }
    Ok(())
}
