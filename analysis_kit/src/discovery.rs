//! Scan and project discovery
//!
//! Drains the scan listing for a time window and resolves display names for
//! the projects that survive latest-scan selection.

use std::collections::HashMap;

use crate::collectors::{fetch_all_pages, ProjectLister, ScanLister, UpstreamError};
use crate::model::ScanRecord;
use crate::range::TimeRange;

/// Default page size for collection endpoints
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Project ids sent per projects request, keeps query strings short
const PROJECT_ID_CHUNK: usize = 50;

/// Fetch every scan created within `range`
///
/// Records the collaborator returns outside the window are dropped.
pub fn discover_scans<L>(
    lister: &L,
    range: &TimeRange,
    limit: usize,
) -> Result<Vec<ScanRecord>, UpstreamError>
where
    L: ScanLister + ?Sized,
{
    log::info!("Discovering scans created within {}", range);

    let scans = fetch_all_pages(limit, |offset, limit| {
        log::debug!("Fetching scans page at offset {}", offset);
        lister.list_scans(range.start, range.end, offset, limit)
    })?;
    let fetched = scans.len();

    let scans: Vec<ScanRecord> = scans
        .into_iter()
        .filter(|scan| range.contains(scan.created_at.naive_utc()))
        .collect();

    if scans.len() != fetched {
        log::debug!(
            "Dropped {} scan(s) created outside the window",
            fetched - scans.len()
        );
    }
    log::info!("Number of scans within the date range: {}", scans.len());
    Ok(scans)
}

/// Map project ids to names
///
/// Ids the platform does not return are absent from the map.
pub fn project_names<L>(
    lister: &L,
    project_ids: &[String],
    limit: usize,
) -> Result<HashMap<String, String>, UpstreamError>
where
    L: ProjectLister + ?Sized,
{
    let mut names = HashMap::with_capacity(project_ids.len());

    for chunk in project_ids.chunks(PROJECT_ID_CHUNK) {
        let projects = fetch_all_pages(limit, |offset, limit| {
            lister.list_projects(chunk, offset, limit)
        })?;
        for project in projects {
            names.insert(project.id, project.name);
        }
    }

    log::debug!(
        "Resolved {} of {} project name(s)",
        names.len(),
        project_ids.len()
    );
    Ok(names)
}
