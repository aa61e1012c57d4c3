use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use xray_lime::config::{Config, DataConfig, LimeConfig, PathsConfig, PredictionConfig};
use xray_lime::FeatureSelection;

const IMG_DIM: u32 = 224;
const TRAIN_COUNT: usize = 12;
const TEST_COUNT: usize = 6;

/// Chest-like radiograph: dark background, two bright lung fields, optional
/// diffuse opacities for the positive class.
fn synthetic_xray(rng: &mut ChaCha8Rng, positive: bool) -> RgbImage {
    let size = IMG_DIM as f64;
    let lungs = [(0.33 * size, 0.5 * size), (0.67 * size, 0.5 * size)];
    let opacities: Vec<(f64, f64, f64)> = if positive {
        (0..rng.gen_range(2..5))
            .map(|_| {
                let (cx, cy) = lungs[rng.gen_range(0..2)];
                (
                    cx + rng.gen_range(-25.0..25.0),
                    cy + rng.gen_range(-50.0..50.0),
                    rng.gen_range(10.0..22.0),
                )
            })
            .collect()
    } else {
        Vec::new()
    };

    RgbImage::from_fn(IMG_DIM, IMG_DIM, |x, y| {
        let (x, y) = (x as f64, y as f64);
        let mut v: f64 = 30.0;
        for &(cx, cy) in &lungs {
            let d = ((x - cx) / (0.14 * size)).powi(2) + ((y - cy) / (0.3 * size)).powi(2);
            if d < 1.0 {
                v += 120.0 * (1.0 - d);
            }
        }
        for &(ox, oy, r) in &opacities {
            let d2 = (x - ox).powi(2) + (y - oy).powi(2);
            v += 80.0 * (-d2 / (2.0 * r * r)).exp();
        }
        v += rng.gen_range(-6.0..6.0);
        let v = v.clamp(0.0, 255.0) as u8;
        Rgb([v, v, v])
    })
}

fn write_split(
    rng: &mut ChaCha8Rng,
    image_dir: &Path,
    table_path: &Path,
    prefix: &str,
    count: usize,
) -> Result<()> {
    std::fs::create_dir_all(image_dir)
        .with_context(|| format!("creating {}", image_dir.display()))?;
    let mut writer = csv::Writer::from_path(table_path)
        .with_context(|| format!("creating {}", table_path.display()))?;
    writer.write_record(["filename", "label", "label_str"])?;

    for i in 0..count {
        let positive = i % 2 == 1;
        let filename = format!("{prefix}_{i:03}.png");
        synthetic_xray(rng, positive)
            .save(image_dir.join(&filename))
            .with_context(|| format!("writing {filename}"))?;
        let label = if positive { "1" } else { "0" };
        let label_str = if positive { "covid" } else { "non-covid" };
        writer.write_record([filename.as_str(), label, label_str])?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let config = Config {
        lime: LimeConfig {
            num_samples: 1000,
            num_features: 1000,
            kernel_width: 1.75,
            feature_selection: FeatureSelection::LassoPath,
            batch_size: 10,
            top_labels: 5,
            random_seed: None,
        },
        paths: PathsConfig {
            images: root.join("generated_images"),
            test_imgs: root.join("test"),
            train_set: root.join("train_set.csv"),
            test_set: root.join("test_set.csv"),
            lime_explainer: root.join("interpretability/lime_explainer.json"),
            model_to_load: root.join("models/model.onnx"),
        },
        data: DataConfig {
            img_dim: [IMG_DIM, IMG_DIM],
        },
        prediction: PredictionConfig { threshold: 0.5 },
    };

    write_split(
        &mut rng,
        &root.join("train"),
        &config.paths.train_set,
        "train",
        TRAIN_COUNT,
    )?;
    write_split(
        &mut rng,
        &config.paths.test_imgs,
        &config.paths.test_set,
        "test",
        TEST_COUNT,
    )?;

    let config_path = root.join("config.yml");
    std::fs::write(&config_path, serde_yaml::to_string(&config)?)
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!(
        "Wrote {TRAIN_COUNT} train / {TEST_COUNT} test images and {} to {}",
        config_path.display(),
        root.display()
    );
    println!(
        "Place a single-output ONNX classifier at {} to run the explainer",
        config.paths.model_to_load.display()
    );
    Ok(())
}
