//! Validate a dataset against a slot map without rendering.

use std::path::PathBuf;
use std::process::ExitCode;

use rendermill_job_model::TemplateSlotMap;
use rendermill_orchestrator::resolve;
use rendermill_record_store::Dataset;

pub fn run(input: PathBuf, slots: PathBuf) -> anyhow::Result<ExitCode> {
    println!("Validating dataset: {}", input.display());

    let slot_map = TemplateSlotMap::load(&slots)
        .map_err(|e| anyhow::anyhow!("Failed to load slot map: {e}"))?;
    println!("  Slot map: {} ({} slots)", slots.display(), slot_map.slots.len());
    println!("  Template: {}", slot_map.project.display());
    if !slot_map.project.is_file() {
        println!("  [WARN] Template project not found");
    }
    for variant in &slot_map.variants {
        println!(
            "  Variant '{}' (prefix '{}'): {}",
            variant.name,
            variant.prefix,
            variant.project.display()
        );
    }

    let dataset = Dataset::load(&input, slot_map.id_column.as_deref())?;
    println!("  Records: {}", dataset.records.len());
    dataset.validate_schema(&slot_map)?;
    println!("  Schema: OK");

    let mut errors = vec![];
    for record in &dataset.records {
        if let Err(e) = resolve(record, &slot_map) {
            errors.push((record, e));
        }
    }

    if errors.is_empty() {
        println!("\nAll records resolve.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("\nResolution issues:");
    for (record, error) in &errors {
        println!("  - {} (row {}): {error}", record.id, record.row);
    }
    println!(
        "\n{} of {} record(s) cannot be rendered as-is.",
        errors.len(),
        dataset.records.len()
    );
    Ok(ExitCode::FAILURE)
}
