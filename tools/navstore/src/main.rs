//! navstore — operator CLI for the shared routing data store.
//!
//! ```text
//! navstore build-index --nodes nodes.csv --segments segments.csv --out berlin.osrm
//! navstore load --regions /var/lib/navstore --base berlin.osrm
//! navstore inspect --regions /var/lib/navstore
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

mod index;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nav_graph::TINY_COMPONENT_THRESHOLD;
use nav_spatial::RTreeParams;
use nav_store::{
    DataLayout, DataLoader, DataStoreConfig, FileDirectory, FileRegions, RegionStore, SharedDataFacade,
    SnapshotDirectory,
};

use index::{IndexJob, build_index};

#[derive(Parser)]
#[command(name = "navstore")]
#[command(about = "Build, publish and inspect routing datasets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the tree and leaf files of a spatial index from CSV
    BuildIndex {
        /// Node coordinates (`lat,lon` in degrees)
        #[arg(long)]
        nodes: PathBuf,
        /// Road segments (`u,v[,weight,oneway,name_id]`)
        #[arg(long)]
        segments: PathBuf,
        /// Dataset base path; writes `<out>.ramIndex` and `<out>.fileIndex`
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        rtree: RTreeArgs,
        /// Components with fewer nodes are tagged tiny
        #[arg(long, default_value_t = TINY_COMPONENT_THRESHOLD)]
        tiny_threshold: u32,
    },

    /// Load a dataset into a region directory and publish it
    Load {
        /// Region directory shared with the query processes
        #[arg(long)]
        regions: PathBuf,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        rtree: RTreeArgs,
    },

    /// Print the live snapshot and its block layout
    Inspect {
        #[arg(long)]
        regions: PathBuf,
        /// Also map the dataset and print its checksum and timestamp
        #[arg(long)]
        attach: bool,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// TOML dataset description
    #[arg(long)]
    config: Option<PathBuf>,
    /// Dataset base path, artifacts named `<base>.hsgr` and so on
    #[arg(long)]
    base: Option<PathBuf>,
}

#[derive(Args)]
struct RTreeArgs {
    #[arg(long)]
    branching_factor: Option<u32>,
    #[arg(long)]
    leaf_node_size: Option<u32>,
}

impl RTreeArgs {
    fn apply(&self, base: RTreeParams) -> RTreeParams {
        RTreeParams::new(
            self.branching_factor.unwrap_or(base.branching_factor),
            self.leaf_node_size.unwrap_or(base.leaf_node_size),
        )
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::BuildIndex { nodes, segments, out, rtree, tiny_threshold } => {
            let config = DataStoreConfig::from_base(&out);
            build_index(&IndexJob {
                nodes:          &nodes,
                segments:       &segments,
                tree_path:      &config.ram_index,
                leaf_path:      &config.file_index,
                params:         rtree.apply(RTreeParams::default()),
                tiny_threshold,
            })
        }
        Command::Load { regions, source, rtree } => load(&regions, &source, &rtree),
        Command::Inspect { regions, attach } => inspect(&regions, attach),
    }
}

// ── load ──────────────────────────────────────────────────────────────────────

fn load(dir: &Path, source: &SourceArgs, rtree: &RTreeArgs) -> Result<()> {
    let mut config = match (&source.config, &source.base) {
        (Some(path), _) => DataStoreConfig::from_file(path)
            .with_context(|| format!("reading dataset description {}", path.display()))?,
        (None, Some(base)) => DataStoreConfig::from_base(base),
        (None, None) => bail!("either --config or --base is required"),
    };
    config.rtree = rtree.apply(config.rtree);

    let regions = FileRegions::open_dir(dir).with_context(|| format!("opening region directory {}", dir.display()))?;
    let directory = FileDirectory::open_dir(dir)?;
    let publication = DataLoader::new(&regions, &directory)
        .load(&config)
        .with_context(|| format!("loading dataset {}", config.hsgr.display()))?;

    match publication.replaced {
        Some(old) => println!("published {} (replaced {old})", publication.snapshot),
        None => println!("published {}", publication.snapshot),
    }
    Ok(())
}

// ── inspect ───────────────────────────────────────────────────────────────────

fn inspect(dir: &Path, attach: bool) -> Result<()> {
    let regions = FileRegions::open_dir(dir)?;
    let directory = FileDirectory::open_dir(dir)?;
    let Some(snapshot) = directory.current()? else {
        println!("no dataset published in {}", dir.display());
        return Ok(());
    };
    println!("snapshot  {snapshot}");

    let layout_region = regions.open(snapshot.layout).with_context(|| format!("opening {}", snapshot.layout))?;
    let layout = DataLayout::from_bytes(layout_region.bytes())?;
    let params = layout.rtree_params();
    println!("r-tree    branching {} / leaf {}", params.branching_factor, params.leaf_node_size);
    println!("total     {} bytes", layout.total_size());
    println!();
    println!("{:<24} {:>12} {:>6} {:>14} {:>14}", "block", "elements", "size", "bytes", "offset");
    for frame in layout.frames() {
        println!(
            "{:<24} {:>12} {:>6} {:>14} {:>14}",
            frame.block.name(),
            frame.element_count,
            frame.element_size,
            frame.byte_len(),
            frame.offset,
        );
    }

    if attach {
        let facade = SharedDataFacade::new(regions, Arc::new(directory));
        let session = facade.session().context("attaching to the published dataset")?;
        println!();
        println!("checksum  {}", session.checksum());
        println!("timestamp {}", session.timestamp());
        println!("graph     {} nodes / {} edges", session.node_count(), session.edge_count());
    }
    Ok(())
}
