use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use image::{GrayImage, ImageBuffer, Luma};

/// Write a small synthetic segmentation dataset (TSV table, raw and label PNGs).
#[derive(Parser)]
#[command(name = "generate_sample")]
struct Args {
    /// Output directory (the dataset root)
    #[arg(default_value = "sample_dataset")]
    output: PathBuf,

    /// Number of frames to generate
    #[arg(long, default_value_t = 3)]
    timepoints: usize,

    /// Nuclei per frame
    #[arg(long, default_value_t = 6)]
    nuclei: usize,
}

const WIDTH: u32 = 128;
const HEIGHT: u32 = 128;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

struct Nucleus {
    label_id: u16,
    x: f64,
    y: f64,
    radius: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(42);

    let raw_dir = args.output.join("raw");
    let label_dir = args.output.join("labels");
    std::fs::create_dir_all(&raw_dir).context("creating raw image directory")?;
    std::fs::create_dir_all(&label_dir).context("creating label image directory")?;

    let table_path = args.output.join("segments.tsv");
    let mut table = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&table_path)
        .context("creating segments table")?;
    table.write_record([
        "label_id",
        "timepoint",
        "anchor_x",
        "anchor_y",
        "area",
        "image_path_raw",
        "image_path_nuclei_label",
    ])?;

    for t in 0..args.timepoints {
        let nuclei: Vec<Nucleus> = (0..args.nuclei)
            .map(|i| Nucleus {
                label_id: (i + 1) as u16,
                x: rng.uniform(12.0, WIDTH as f64 - 12.0),
                y: rng.uniform(12.0, HEIGHT as f64 - 12.0),
                radius: rng.uniform(4.0, 10.0),
            })
            .collect();

        let mut raw = GrayImage::new(WIDTH, HEIGHT);
        let mut labels: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::new(WIDTH, HEIGHT);
        let mut areas = vec![0usize; nuclei.len()];

        for (x, y, pixel) in raw.enumerate_pixels_mut() {
            let mut intensity = 10.0 + rng.uniform(0.0, 8.0);
            for (i, n) in nuclei.iter().enumerate() {
                let d2 = (x as f64 - n.x).powi(2) + (y as f64 - n.y).powi(2);
                intensity += 180.0 * (-d2 / (2.0 * (n.radius / 2.0).powi(2))).exp();
                // later nuclei overwrite earlier ones where they overlap
                if d2 <= n.radius.powi(2) {
                    let previous = labels.get_pixel(x, y)[0];
                    if previous != 0 {
                        areas[usize::from(previous) - 1] -= 1;
                    }
                    labels.put_pixel(x, y, Luma([n.label_id]));
                    areas[i] += 1;
                }
            }
            *pixel = Luma([intensity.min(255.0) as u8]);
        }

        let raw_rel = format!("raw/t{t:03}.png");
        let label_rel = format!("labels/t{t:03}_label.png");
        raw.save(args.output.join(&raw_rel))
            .with_context(|| format!("writing {raw_rel}"))?;
        labels
            .save(args.output.join(&label_rel))
            .with_context(|| format!("writing {label_rel}"))?;

        for (n, area) in nuclei.iter().zip(&areas) {
            table.write_record([
                n.label_id.to_string(),
                t.to_string(),
                format!("{:.2}", n.x),
                format!("{:.2}", n.y),
                area.to_string(),
                raw_rel.clone(),
                label_rel.clone(),
            ])?;
        }
    }
    table.flush()?;

    println!(
        "Wrote {} frames x {} nuclei to {}",
        args.timepoints,
        args.nuclei,
        args.output.display()
    );
    Ok(())
}
