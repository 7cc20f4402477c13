//! Markdown report generation
//!
//! Renders a stored property snapshot, optionally with the outcome of the
//! crawl job that produced it.

use crate::output::snapshot::PropertySnapshot;
use crate::storage::{FailureRecord, JobRecord};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown report for a property to `output_path`
///
/// # Arguments
///
/// * `snapshot` - The stored property hierarchy
/// * `job` - The crawl job and its building failures, if known
/// * `output_path` - Path where the markdown file should be written
pub fn generate_markdown_report(
    snapshot: &PropertySnapshot,
    job: Option<(&JobRecord, &[FailureRecord])>,
    output_path: &Path,
) -> std::io::Result<()> {
    let markdown = format_markdown_report(snapshot, job);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a property snapshot as markdown
pub fn format_markdown_report(
    snapshot: &PropertySnapshot,
    job: Option<(&JobRecord, &[FailureRecord])>,
) -> String {
    let property = &snapshot.property;
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", property.name));

    md.push_str("## Property\n\n");
    md.push_str(&format!("- **ID**: {}\n", property.id));
    md.push_str(&format!("- **Address**: {}\n", property.address));
    md.push_str(&format!("- **Developer**: {}\n", property.developer));
    if let Some(license) = &property.presale_license {
        md.push_str(&format!("- **Presale License**: {}\n", license));
    }
    if let Some(district) = &property.district {
        md.push_str(&format!("- **District**: {}\n", district));
    }
    for (label, value) in &property.metadata {
        md.push_str(&format!("- **{}**: {}\n", label, value));
    }
    md.push('\n');

    if let Some((job, failures)) = job {
        md.push_str("## Crawl Job\n\n");
        md.push_str(&format!("- **Job ID**: {}\n", job.id));
        md.push_str(&format!("- **Started**: {}\n", job.started_at));
        if let Some(finished) = &job.finished_at {
            md.push_str(&format!("- **Finished**: {}\n", finished));
        }
        md.push_str(&format!("- **Phase**: {}\n", job.phase));
        md.push_str(&format!("- **Config Hash**: {}\n", job.config_hash));
        if let Some(error) = &job.error_message {
            md.push_str(&format!("- **Error**: {}\n", error));
        }
        md.push('\n');

        if !failures.is_empty() {
            md.push_str("### Building Failures\n\n");
            md.push_str("| Building | Pass | Error |\n");
            md.push_str("|----------|------|-------|\n");
            for failure in failures {
                md.push_str(&format!(
                    "| {} | {} | {} |\n",
                    failure.building_id,
                    failure.pass,
                    failure.error_message.replace('|', "\\|")
                ));
            }
            md.push('\n');
        }
    }

    md.push_str(&format!(
        "## Buildings ({}, {} units)\n\n",
        snapshot.buildings.len(),
        snapshot.unit_count()
    ));

    for entry in &snapshot.buildings {
        let building = &entry.building;
        match building.floors {
            Some(floors) => md.push_str(&format!(
                "### {} ({}, {} floors)\n\n",
                building.name, building.id, floors
            )),
            None => md.push_str(&format!("### {} ({})\n\n", building.name, building.id)),
        }

        if entry.units.is_empty() {
            md.push_str("_No units stored._\n\n");
            continue;
        }

        md.push_str("| Unit | Area (㎡) | Status |\n");
        md.push_str("|------|-----------|--------|\n");
        for unit in &entry.units {
            let area = unit
                .area
                .map(|a| format!("{:.2}", a))
                .unwrap_or_else(|| "-".to_string());
            md.push_str(&format!("| {} | {} | {} |\n", unit.id, area, unit.status));
        }
        md.push('\n');
    }

    md
}
