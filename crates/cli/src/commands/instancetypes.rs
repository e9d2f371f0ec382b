//! Instance-type catalog commands

use anyhow::Result;
use catalog_lib::requirements::{LABEL_ARCH, LABEL_SKU_FAMILY};
use catalog_lib::GIB;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, CapacityType, InstanceType};
use crate::output::{
    color_available, format_bytes, format_cpu, format_price, print_json, print_table,
    print_warning, OutputFormat,
};

/// Client-side filters applied to the served catalog
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub zone: Option<String>,
    pub capacity_type: Option<CapacityType>,
    pub arch: Option<String>,
    pub min_cpu: Option<u64>,
    pub min_memory_gib: Option<u64>,
}

impl ListFilter {
    /// Matches when every set filter holds; zone and capacity type must be
    /// satisfied by a single available offering
    pub fn matches(&self, it: &InstanceType) -> bool {
        let has_offering = it.offerings.available().any(|o| {
            self.zone.as_ref().map(|z| &o.zone == z).unwrap_or(true)
                && self.capacity_type.map(|ct| o.capacity_type == ct).unwrap_or(true)
        });
        let arch_ok = self
            .arch
            .as_ref()
            .map(|a| it.requirements.single_value(LABEL_ARCH) == Some(a.as_str()))
            .unwrap_or(true);
        let cpu_ok = self
            .min_cpu
            .map(|cpu| it.capacity.cpu_millicores >= cpu.saturating_mul(1000))
            .unwrap_or(true);
        let memory_ok = self
            .min_memory_gib
            .map(|gib| it.capacity.memory_bytes >= gib.saturating_mul(GIB))
            .unwrap_or(true);

        has_offering && arch_ok && cpu_ok && memory_ok
    }
}

#[derive(Tabled)]
struct InstanceTypeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Arch")]
    arch: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Pods")]
    pods: u64,
    #[tabled(rename = "Offerings")]
    offerings: String,
    #[tabled(rename = "Cheapest")]
    cheapest: String,
}

#[derive(Tabled)]
struct OfferingRow {
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Capacity Type")]
    capacity_type: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Available")]
    available: String,
}

#[derive(Tabled)]
struct RequirementRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Operator")]
    operator: String,
}

fn label(it: &InstanceType, key: &str) -> String {
    it.requirements.single_value(key).unwrap_or("-").to_string()
}

pub async fn list_instance_types(
    client: &ApiClient,
    filter: &ListFilter,
    format: OutputFormat,
) -> Result<()> {
    let catalog: Vec<InstanceType> = client.get("api/v1/instancetypes").await?;
    let total = catalog.len();
    let filtered: Vec<InstanceType> = catalog.into_iter().filter(|it| filter.matches(it)).collect();

    match format {
        OutputFormat::Json => print_json(&filtered)?,
        OutputFormat::Table => {
            if filtered.is_empty() {
                print_warning("No instance types match");
                return Ok(());
            }

            let rows: Vec<InstanceTypeRow> = filtered
                .iter()
                .map(|it| InstanceTypeRow {
                    name: it.name.clone(),
                    family: label(it, LABEL_SKU_FAMILY),
                    arch: label(it, LABEL_ARCH),
                    cpu: format_cpu(it.capacity.cpu_millicores),
                    memory: format_bytes(it.capacity.memory_bytes),
                    pods: it.capacity.pods,
                    offerings: format!(
                        "{}/{}",
                        it.offerings.available().count(),
                        it.offerings.len()
                    ),
                    cheapest: it
                        .offerings
                        .cheapest()
                        .map(|o| format_price(o.price))
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect();

            print_table(rows);
            println!("\nShowing {} of {} instance types", filtered.len(), total);
        }
    }

    Ok(())
}

pub async fn show_instance_type(
    client: &ApiClient,
    name: &str,
    format: OutputFormat,
) -> Result<()> {
    let it: InstanceType = client.get(&format!("api/v1/instancetypes/{}", name)).await?;

    match format {
        OutputFormat::Json => print_json(&it)?,
        OutputFormat::Table => {
            println!("{}", it.name.bold());
            println!("{}", "=".repeat(50));

            let allocatable = it.allocatable();
            let reserved = it.overhead.total();
            println!("{}", "Resources".bold());
            println!(
                "CPU:        {} capacity, {} reserved, {} allocatable",
                format_cpu(it.capacity.cpu_millicores),
                format_cpu(reserved.cpu_millicores),
                format_cpu(allocatable.cpu_millicores).green()
            );
            println!(
                "Memory:     {} capacity, {} reserved, {} allocatable",
                format_bytes(it.capacity.memory_bytes),
                format_bytes(reserved.memory_bytes),
                format_bytes(allocatable.memory_bytes).green()
            );
            println!("Pods:       {}", it.capacity.pods);
            if it.capacity.gpus > 0 {
                println!("GPUs:       {}", it.capacity.gpus);
            }
            println!(
                "OS disk:    {}GB ({})",
                it.os_disk.size_gb,
                if it.os_disk.is_ephemeral() { "ephemeral" } else { "managed" }
            );
            println!();

            println!("{}", "Offerings".bold());
            let offerings: Vec<OfferingRow> = it
                .offerings
                .iter()
                .map(|o| OfferingRow {
                    zone: if o.zone.is_empty() { "-".to_string() } else { o.zone.clone() },
                    capacity_type: o.capacity_type.to_string(),
                    price: format_price(o.price),
                    available: color_available(o.available),
                })
                .collect();
            print_table(offerings);
            println!();

            println!("{}", "Requirements".bold());
            let requirements: Vec<RequirementRow> = it
                .requirements
                .iter()
                .map(|r| RequirementRow {
                    key: r.key.clone(),
                    operator: r.operator.to_string(),
                })
                .collect();
            print_table(requirements);
        }
    }

    Ok(())
}
