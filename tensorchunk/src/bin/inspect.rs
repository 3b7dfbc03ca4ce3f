use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tensorchunk::keys::FIRST_COMMIT_ID;
use tensorchunk::{chunk_name_from_id, ChunkConfig, ChunkEngine, LocalProvider, SampleValue};
use tensorchunk_core::validation::parse_range;

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(about = "Inspect tensors of a local chunked dataset")]
struct Cli {
    /// Dataset root directory
    root: PathBuf,

    /// Tensor key inside the dataset
    tensor: String,

    /// Commit to read
    #[arg(long, default_value = FIRST_COMMIT_ID)]
    commit: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tensor metadata and the chunk table
    Info,
    /// Decode samples
    Read {
        /// Sample range (format: start:end)
        #[arg(long, default_value = "0:1")]
        range: String,

        /// Keep stored dtypes instead of casting to the tensor dtype
        #[arg(long)]
        raw: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let start_time = Instant::now();

    let storage = Arc::new(LocalProvider::open_read_only(&cli.root)?);
    let mut engine = ChunkEngine::new(&cli.tensor, storage, ChunkConfig::default());
    engine.checkout(&cli.commit)?;

    match &cli.command {
        Commands::Info => print_info(&engine)?,
        Commands::Read { range, raw } => {
            let range = parse_range(range).map_err(|e| format!("invalid range {range}: {e}"))?;
            print_samples(&engine, range.start as u64, range.end as u64, !raw)?;
        }
    }

    let elapsed = start_time.elapsed();
    println!("Completed in {elapsed:.2?}");
    Ok(())
}

fn print_info(engine: &ChunkEngine) -> tensorchunk::Result<()> {
    let meta = engine.tensor_meta()?;
    println!("Tensor '{}':", engine.key());
    println!("   htype: {:?}", meta.htype);
    println!("   dtype: {}", meta.dtype_or_default());
    println!("   samples: {}", meta.length);
    println!("   shape: {:?} .. {:?}", meta.min_shape, meta.max_shape);
    if meta.is_link {
        println!("   linked: yes");
    }
    if let Some(compression) = meta.sample_compression {
        println!("   sample compression: {compression}");
    }
    if let Some(compression) = meta.chunk_compression {
        println!("   chunk compression: {compression}");
    }

    let encoder = engine.chunk_id_encoder()?;
    let tiles = engine.tile_registry()?;
    println!("\nChunks ({}):", encoder.num_chunks());
    let mut previous = 0;
    for (row, (id, cumulative)) in encoder.rows().iter().enumerate() {
        let kind = match tiles.tile_shape(*id) {
            Some(shape) => format!("tile {shape:?}"),
            None => format!("samples {previous}..{cumulative}"),
        };
        println!("   {row:>4}  {}  {kind}", chunk_name_from_id(*id));
        previous = *cumulative;
    }
    Ok(())
}

fn print_samples(engine: &ChunkEngine, start: u64, end: u64, cast: bool) -> tensorchunk::Result<()> {
    let end = end.min(engine.num_samples()?);
    for index in start..end {
        match engine.read_sample(index, cast)? {
            SampleValue::Array(array) => {
                let preview: Vec<f64> = (0..array.num_elements().min(8))
                    .filter_map(|i| array.get_f64(i))
                    .collect();
                println!(
                    "[{index}] {} {:?} {preview:?}{}",
                    array.dtype(),
                    array.shape(),
                    if array.num_elements() > preview.len() { " ..." } else { "" }
                );
            }
            SampleValue::Text(text) => println!("[{index}] {text:?}"),
            SampleValue::Json(value) => println!("[{index}] {value}"),
        }
    }
    Ok(())
}
