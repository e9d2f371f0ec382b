//! Raw shape lookup

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, Shape};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct CapabilityRow {
    #[tabled(rename = "Capability")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub async fn show_shape(client: &ApiClient, name: &str, format: OutputFormat) -> Result<()> {
    let shape: Shape = client.get(&format!("api/v1/shapes/{}", name)).await?;

    match format {
        OutputFormat::Json => print_json(&shape)?,
        OutputFormat::Table => {
            println!("{}", shape.name.bold());
            println!("{}", "=".repeat(50));
            println!("Family:         {}", shape.family);
            println!("Architecture:   {}", shape.normalized_architecture());
            println!("vCPUs:          {}", shape.vcpus());
            println!("Memory:         {} GiB", shape.memory_gib());
            if shape.has_gpu() {
                println!("GPUs:           {}", shape.gpu_count());
            }
            for (region, zones) in &shape.zones {
                println!("Zones ({}): {}", region, zones.join(", ").cyan());
            }
            if !shape.restricted_regions.is_empty() {
                println!(
                    "Restricted:     {}",
                    shape.restricted_regions.join(", ").red()
                );
            }
            println!();

            let rows: Vec<CapabilityRow> = shape
                .capabilities
                .iter()
                .map(|(name, value)| CapabilityRow {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect();
            print_table(rows);
        }
    }

    Ok(())
}
