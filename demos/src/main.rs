//! Trains a small BERT-style sentiment classifier over a 4x2 device mesh.
//!
//! The model weights are placed according to a regex layout map: attention
//! q/k/v projections and the pooler are sharded over the "model" mesh
//! dimension, everything else is replicated. The per-weight placement
//! report is printed before training starts.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use meshgrad::data::SyntheticTextDataset;
use meshgrad::mesh::{DeviceMesh, DeviceType, LocalClient};
use meshgrad::model::{model_parallel_layout_map, BertClassifier, BertConfig};
use meshgrad::optim::Adam;
use meshgrad::train::train_model;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::info;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DeviceTypeArg {
    Cpu,
    Gpu,
}

impl From<DeviceTypeArg> for DeviceType {
    fn from(val: DeviceTypeArg) -> Self {
        match val {
            DeviceTypeArg::Cpu => DeviceType::Cpu,
            DeviceTypeArg::Gpu => DeviceType::Gpu,
        }
    }
}

#[derive(Parser, Debug, Clone)]
struct Args {
    /// Directory prefix for checkpoints.
    #[arg(long, default_value = "dtensor-checkpoints")]
    prefix: PathBuf,

    #[arg(long, value_enum, default_value_t = DeviceTypeArg::Cpu)]
    device_type: DeviceTypeArg,

    #[arg(long, default_value_t = 0.001)]
    learning_rate: f32,

    #[arg(long, default_value_t = 3)]
    num_epochs: usize,

    #[arg(long, default_value_t = 10)]
    steps_per_epoch: usize,

    #[arg(long, default_value_t = 1337)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let device_type: DeviceType = args.device_type.into();

    let client = LocalClient::configure_virtual_cpus(8)?;
    info!(
        client = client.client_id(),
        device_type = %device_type,
        num_local_devices = client.num_local_devices(device_type),
        "initialized local client"
    );

    // 4-way data parallel, 2-way model parallel.
    let mesh = DeviceMesh::distributed(
        &[("batch", 4), ("model", 2)],
        &client,
        device_type,
        8,
    )
    .context("failed to create device mesh")?;
    info!(%mesh, "created device mesh");

    let config = BertConfig {
        vocab_size: 100,
        num_classes: 2,
        max_seq_len: 10,
        type_vocab_size: 2,
        hidden: 64,
        num_layers: 2,
        num_heads: 4,
        intermediate: 256,
    };

    let layout_map = model_parallel_layout_map("model")?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut model = BertClassifier::<f32>::new(config, &mesh, &layout_map, &mut rng)
        .context("failed to build model")?;

    for spec in model.weight_specs() {
        println!("{} has layout spec: {}", spec.name, spec.layout);
    }

    let dataset = SyntheticTextDataset::generate(100, 2, 32, 10, &mut rng)?;
    let mut optimizer = Adam::new(args.learning_rate);

    let losses = train_model(
        &mut model,
        &mut optimizer,
        &mesh,
        &dataset,
        args.num_epochs,
        args.steps_per_epoch,
    )?;
    for (epoch, loss) in losses.iter().enumerate() {
        println!("Epoch {epoch}: Loss: {loss}");
    }

    std::fs::create_dir_all(&args.prefix)
        .with_context(|| format!("failed to create {}", args.prefix.display()))?;
    let path = args.prefix.join("checkpoint-1.safetensors");
    meshgrad::checkpoint::save_checkpoint(&path, &model.flattened_weights()?)?;
    info!(path = %path.display(), "saved checkpoint");

    Ok(())
}
