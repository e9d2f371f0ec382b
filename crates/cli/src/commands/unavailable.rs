//! Unavailable-offering overrides

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, CapacityType, MarkUnavailableRequest, UnavailableList};
use crate::output::{print_json, print_success, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct UnavailableRow {
    #[tabled(rename = "Shape")]
    shape: String,
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Capacity Type")]
    capacity_type: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Marked At")]
    marked_at: String,
}

fn print_list(list: &UnavailableList, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(list)?,
        OutputFormat::Table => {
            if list.entries.is_empty() {
                print_warning("No offerings marked unavailable");
            } else {
                let rows: Vec<UnavailableRow> = list
                    .entries
                    .iter()
                    .map(|e| UnavailableRow {
                        shape: e.shape.clone(),
                        zone: if e.zone.is_empty() { "-".to_string() } else { e.zone.clone() },
                        capacity_type: e.capacity_type.to_string(),
                        reason: e.reason.clone(),
                        marked_at: e.marked_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    })
                    .collect();
                print_table(rows);
            }
            println!("\nSequence: {}", list.seq_num);
        }
    }
    Ok(())
}

pub async fn list_unavailable(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let list: UnavailableList = client.get("api/v1/unavailable").await?;
    print_list(&list, format)
}

pub async fn mark_unavailable(
    client: &ApiClient,
    request: MarkUnavailableRequest,
    format: OutputFormat,
) -> Result<()> {
    let list: UnavailableList = client.post("api/v1/unavailable", &request).await?;
    if format == OutputFormat::Table {
        print_success(&format!(
            "Marked {} ({}, zone '{}') unavailable",
            request.shape, request.capacity_type, request.zone
        ));
    }
    print_list(&list, format)
}

pub async fn flush_unavailable(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let list: UnavailableList = client.delete("api/v1/unavailable").await?;
    if format == OutputFormat::Table {
        print_success("Flushed all unavailable offerings");
    }
    print_list(&list, format)
}

/// Parse a capacity type argument
pub fn parse_capacity_type(s: &str) -> Result<CapacityType, String> {
    CapacityType::parse(s).ok_or_else(|| format!("expected on-demand or spot, got '{}'", s))
}
