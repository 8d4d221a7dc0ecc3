use std::{env, fs};

use anyhow::{Context, Result};
use log::info;

use perceptron::training::{TrainerBuilder, TrainingConfig};

const CONFIG_VAR: &str = "PERCEPTRON_CONFIG";

fn main() -> Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .or_else(|| env::var(CONFIG_VAR).ok())
        .with_context(|| format!("usage: perceptron <config.json> (or set {CONFIG_VAR})"))?;

    let raw = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config: TrainingConfig =
        serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;
    info!("loaded training config from {path}");

    let examples = config.dataset.examples()?;
    let mut ctx = TrainerBuilder::new().build(&config)?;
    ctx.run(&examples, &config)?;

    for example in &examples {
        let output = ctx.predict(example.input())?;
        println!(
            "{} -> {:.3} (expected {})",
            example.input(),
            output,
            example.target()
        );
    }

    Ok(())
}
