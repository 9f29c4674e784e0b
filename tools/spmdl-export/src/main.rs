//! spmdl-export - scene to .spmdl model exporter
//!
//! Converts glTF/GLB scenes into quantized, section-compressed model
//! containers (.spmdl).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use spmdl_format::formats::fourcc_name;
use spmdl_format::{ContainerReader, ModelFile, Semantic, MODEL_MAGIC};

use spmdl_export::import::{importer_for, SceneImporter};
use spmdl_export::model::vertex_format_layout;
use spmdl_export::{export_scene, write_model, CombineMode, ExportConfig};

#[derive(Parser)]
#[command(name = "spmdl-export")]
#[command(about = "spmdl model export tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene to a model container
    Model(ModelArgs),

    /// Validate settings and print the vertex layout
    Check {
        /// Export settings (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Vertex format (overrides the settings file)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Print the contents of a model container
    Inspect {
        /// Input .spmdl file
        input: PathBuf,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Input scene file (glTF/GLB)
    input: PathBuf,

    /// Output .spmdl file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Export settings (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vertex format (e.g. pos_rgb32f,nrm_rgba8sn,uv_rg16f)
    #[arg(short, long)]
    format: Option<String>,

    /// Merge mesh parts before splitting
    #[arg(long, value_enum)]
    combine: Option<CombineMode>,

    /// Bake node transforms into vertices
    #[arg(long)]
    transform_to_root: bool,

    /// Vertex budget per mesh
    #[arg(long)]
    max_vertices: Option<usize>,

    /// Bone budget per mesh
    #[arg(long)]
    max_bones: Option<usize>,

    /// Compression level (1-20)
    #[arg(short, long)]
    level: Option<i32>,

    /// Worker threads, including the main thread
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Skip post-split locality reordering
    #[arg(long)]
    no_optimize: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl ModelArgs {
    /// Settings file with command line overrides applied
    fn export_config(&self) -> Result<ExportConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(format) = &self.format {
            config.vertex_format = format.clone();
        }
        if let Some(combine) = self.combine {
            config.combine = combine;
        }
        config.transform_to_root |= self.transform_to_root;
        if let Some(max_vertices) = self.max_vertices {
            config.limits.max_vertices = max_vertices;
        }
        if let Some(max_bones) = self.max_bones {
            config.limits.max_bones = max_bones;
        }
        if let Some(level) = self.level {
            config.compression.level = level;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        config.optimize &= !self.no_optimize;
        config.verbose |= self.verbose;
        Ok(config)
    }
}

fn load_config(path: Option<&Path>) -> Result<ExportConfig> {
    match path {
        Some(path) => ExportConfig::load(path)
            .with_context(|| format!("Failed to load config: {:?}", path)),
        None => Ok(ExportConfig::default()),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Model(args) => {
            // Log level comes from the merged settings
            let config = args.export_config()?;
            init_logging(config.verbose);

            let input = args.input;
            let output = args.output.unwrap_or_else(|| input.with_extension("spmdl"));
            tracing::info!("Converting {:?} -> {:?}", input, output);

            let importer = importer_for(&input).with_context(|| {
                format!("Unsupported scene format: {:?} (use .gltf or .glb)", input)
            })?;
            let scene = importer
                .import(&input)
                .with_context(|| format!("Failed to import scene: {:?}", input))?;
            let model = export_scene(&scene, &config)
                .with_context(|| format!("Failed to export model: {:?}", input))?;
            write_model(&output, &model.bytes)
                .with_context(|| format!("Failed to write output: {:?}", output))?;
            tracing::info!("Done!");
        }

        Commands::Check { config, format } => {
            init_logging(false);
            let mut config = load_config(config.as_deref())?;
            if let Some(format) = format {
                config.vertex_format = format;
            }
            config.validate()?;
            let format = config
                .parse_vertex_format()
                .with_context(|| format!("Invalid vertex format: {:?}", config.vertex_format))?;

            tracing::info!("Vertex format {}", format);
            for line in vertex_format_layout(&format).lines() {
                tracing::info!("{}", line);
            }
            tracing::info!("Settings are valid!");
        }

        Commands::Inspect { input } => {
            init_logging(false);
            let bytes =
                std::fs::read(&input).with_context(|| format!("Failed to read: {:?}", input))?;
            inspect(&input, &bytes)?;
        }
    }

    Ok(())
}

fn inspect(input: &Path, bytes: &[u8]) -> Result<()> {
    let reader = ContainerReader::parse(bytes, Some(MODEL_MAGIC))
        .with_context(|| format!("Not a model container: {:?}", input))?;
    let header = reader.header();
    tracing::info!(
        "{:?}: {} v{}, {} sections",
        input,
        fourcc_name(header.magic),
        header.version,
        header.section_count
    );
    for section in reader.sections() {
        tracing::info!(
            "  {} #{}: offset {}, {} -> {} bytes ({})",
            fourcc_name(section.tag),
            section.index,
            section.offset,
            section.uncompressed_size,
            section.compressed_size,
            if section.compression == 0 { "raw" } else { "zstd" }
        );
    }

    let model = ModelFile::parse(bytes)?;
    tracing::info!(
        "{} nodes, {} bones, {} meshes",
        model.info.node_count,
        model.info.bone_count,
        model.info.mesh_count
    );
    for (i, mesh) in model.meshes.iter().enumerate() {
        let node = model
            .nodes
            .get(mesh.node as usize)
            .and_then(|n| model.string(n.name))
            .unwrap_or("?");
        let semantics: Vec<&str> = mesh
            .attribs()
            .iter()
            .filter_map(|a| Semantic::from_u8(a.semantic))
            .map(Semantic::code)
            .collect();
        tracing::info!(
            "  [{}] node '{}', material '{}': {} vertices, {} indices ({}-bit), {} bones, [{}]",
            i,
            node,
            model.string(mesh.material).unwrap_or("?"),
            mesh.vertex_count,
            mesh.index_count,
            mesh.index_buffer.stride * 8,
            mesh.bone_count,
            semantics.join(",")
        );
    }

    Ok(())
}
