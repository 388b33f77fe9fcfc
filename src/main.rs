#![warn(unused_extern_crates)]

use anyhow::{Context, Result};
use automakeup::color::normalize_dynamic;
use automakeup::face::{BoundingBoxFinder, FaceExtractor, SimpleFaceExtractor};
use automakeup::feature::FeatureExtractor;
use automakeup::pipeline::{BlazeFaceFinder, Pipeline, embedding_extractor};
use automakeup::recommend::DummyRecommender;
use automakeup::{Error, PipelineConfig, Recommender};
use clap::Parser;
use image::{DynamicImage, RgbImage};
use std::io::Read;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{Level, debug, info, span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CmdArgs {
    /// Image with a face. Reads stdin when missing or "-"
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// JSON pipeline config; flags below override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the model files
    #[arg(short, long, value_name = "DIR")]
    models: Option<PathBuf>,

    /// Side of the square face crop
    #[arg(long)]
    face_size: Option<u32>,

    /// Face box enlargement before cropping
    #[arg(long)]
    bb_scale: Option<f64>,

    /// Seed for sampling the recommendation
    #[arg(short, long)]
    seed: Option<u64>,

    /// Intra-op threads per model
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Answer with a fixed recommendation without loading models
    #[arg(long, conflicts_with = "debug_output")]
    dummy: bool,

    /// Write the face crop with the color regions tinted here
    #[arg(long, value_name = "PATH")]
    debug_output: Option<PathBuf>,

    /// Print the 512-wide face embedding instead of a recommendation
    #[arg(long, conflicts_with_all = ["dummy", "debug_output"])]
    embedding: bool,
}

impl CmdArgs {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(models) = &self.models {
            config.models_dir = models.clone();
        }
        if let Some(face_size) = self.face_size {
            config.face_size = face_size;
        }
        if let Some(bb_scale) = self.bb_scale {
            config.bb_scale = bb_scale;
        }
        if let Some(seed) = self.seed {
            config.random_state = seed;
        }
        if let Some(threads) = self.threads {
            config.threads = threads.clamp(1, num_cpus::get());
        }
        Ok(config)
    }
}

fn read_input(input: Option<&PathBuf>) -> Result<Vec<u8>> {
    match input {
        Some(path) if path.as_os_str() != "-" => {
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))
        }
        _ => {
            let mut bytes = Vec::new();
            std::io::stdin().read_to_end(&mut bytes)?;
            Ok(bytes)
        }
    }
}

fn to_rgb(img: DynamicImage) -> RgbImage {
    match normalize_dynamic(&img) {
        Ok(rgb) => rgb,
        Err(e) => {
            warn!("{e}, converting to 8-bit RGB");
            img.into_rgb8()
        }
    }
}

fn embed(config: &PipelineConfig, img: &RgbImage) -> Result<Vec<f32>> {
    let finder = BlazeFaceFinder::new(&config.model_path(&config.detector_model), config.threads)?;
    let bounds = finder.find(img)?.ok_or(Error::NoFace)?;
    let face = SimpleFaceExtractor::new(config.face_size, config.bb_scale).extract(img, bounds)?;
    Ok(embedding_extractor(config)?.extract(&face)?.to_vec())
}

fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env();
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = CmdArgs::parse();
    let config = args.pipeline_config()?;
    debug!(?config);

    let bytes = read_input(args.input.as_ref())?;
    let img = to_rgb(image::load_from_memory(&bytes).context("decoding image")?);

    let span = span!(Level::INFO, "automakeup");
    let _guard = span.enter();
    let start = Instant::now();

    if args.embedding {
        let embedding = embed(&config, &img)?;
        debug!("Took {:?}", start.elapsed());
        println!("{}", serde_json::to_string(&embedding)?);
        return Ok(());
    }

    let recommendation = if args.dummy {
        DummyRecommender.recommend(&img)?
    } else {
        let pipeline = Pipeline::new(&config)?;
        debug!("Pipeline ready after {:?}", start.elapsed());
        if let Some(path) = &args.debug_output {
            pipeline.run_trace(&img)?.save(path)?;
            info!("Trace at {:?}", path);
        }
        pipeline.run(&img)?
    };
    debug!("Took {:?}", start.elapsed());

    println!("{}", serde_json::to_string_pretty(&recommendation)?);
    Ok(())
}
