//! Region selection.
use crate::prompt::Confirmer;
use anyhow::Result;

/// Resolve the regions to act in.
///
/// An explicit list wins. Otherwise every available region is used once the
/// operator confirms; `None` means the operator declined.
pub fn select_regions(
    requested: &[String],
    available: &[String],
    confirmer: &dyn Confirmer,
) -> Result<Option<Vec<String>>> {
    let requested: Vec<String> = requested
        .iter()
        .map(|region| region.trim())
        .filter(|region| !region.is_empty())
        .map(str::to_string)
        .collect();
    if !requested.is_empty() {
        tracing::info!(regions = ?requested, "modifying members in requested regions");
        return Ok(Some(requested));
    }

    let prompt = format!(
        "Should the graph be modified in all available regions: {}?",
        available.join(", ")
    );
    if !confirmer.confirm(&prompt)? {
        tracing::info!(
            "modification will not be made in this execution; specify regions with --regions"
        );
        return Ok(None);
    }
    tracing::info!(regions = ?available, "modifying members in all available regions");
    Ok(Some(available.to_vec()))
}
