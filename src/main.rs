use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use segexp::{DatasetConfig, SegmentsDataset};

#[derive(Parser)]
#[command(name = "segexp")]
#[command(about = "Open a segments table and the images it references")]
struct Cli {
    /// JSON dataset configuration; positional arguments override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset root directory
    root: Option<PathBuf>,

    /// Segments table, relative to the root directory
    table: Option<PathBuf>,

    /// Timepoints in the table count from one
    #[arg(long)]
    one_based_timepoint: bool,

    /// Prefix of the columns holding image paths
    #[arg(long)]
    prefix: Option<String>,

    /// Column holding the primary label image
    #[arg(long)]
    label_column: Option<String>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn dataset_config(&self) -> Result<DatasetConfig> {
        let mut config = match (&self.config, &self.root, &self.table) {
            (Some(path), _, _) => DatasetConfig::from_json_file(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            (None, Some(root), Some(table)) => DatasetConfig::new(root, table),
            _ => bail!("either --config or both <ROOT> and <TABLE> are required"),
        };
        if let Some(root) = &self.root {
            config.root_directory = root.clone();
        }
        if let Some(table) = &self.table {
            config.relative_table_path = table.clone();
        }
        if self.one_based_timepoint {
            config.one_based_timepoint = true;
        }
        if let Some(prefix) = &self.prefix {
            config.image_path_prefix = prefix.clone();
        }
        if let Some(column) = &self.label_column {
            config.label_image_column = Some(column.clone());
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.dataset_config()?;
    let dataset = SegmentsDataset::open(&config).with_context(|| {
        format!(
            "opening dataset {} in {}",
            config.relative_table_path.display(),
            config.root_directory.display()
        )
    })?;
    let summary = dataset.summary();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{} segments, label image column: {}",
        summary.segments,
        summary.label_image_column.as_deref().unwrap_or("<none>")
    );
    for group in &summary.groups {
        let kind = match (group.is_label_source, group.is_primary_label_source) {
            (_, true) => "primary label",
            (true, false) => "label",
            (false, false) => "intensity",
        };
        println!(
            "  {:<40} {:>5} source(s), {:>5} image(s)  [{kind}]",
            group.group_id,
            group.sources,
            group.image_ids.len()
        );
    }
    Ok(())
}
