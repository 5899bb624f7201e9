//! Storage usage of one mount point
//!
//! Walking every disk is comparatively slow, so this source is cached with a
//! longer TTL than the poll interval by default.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sysinfo::Disks;
use tracing::trace;

use crate::error::{SourceError, SourceResult};

use super::{CollectContext, RawMetrics, SourceAdapter, SourceKind};

pub struct DiskSource {
    mount_point: PathBuf,
}

impl DiskSource {
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
        }
    }
}

/// (mount point, total bytes, available bytes)
type DiskEntry = (PathBuf, u64, u64);

fn usage_for_mount(entries: &[DiskEntry], mount_point: &Path) -> SourceResult<RawMetrics> {
    let (_, total, available) = entries
        .iter()
        .find(|(mount, _, _)| mount == mount_point)
        .ok_or_else(|| {
            SourceError::unavailable(format!("no disk mounted at {}", mount_point.display()))
        })?;

    Ok(RawMetrics::Disk {
        used_bytes: total.saturating_sub(*available),
        total_bytes: *total,
    })
}

#[async_trait]
impl SourceAdapter for DiskSource {
    fn name(&self) -> &str {
        "disk"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Disk
    }

    async fn collect(&self, _ctx: &CollectContext) -> SourceResult<RawMetrics> {
        let entries = tokio::task::spawn_blocking(|| {
            Disks::new_with_refreshed_list()
                .list()
                .iter()
                .map(|disk| {
                    (
                        disk.mount_point().to_path_buf(),
                        disk.total_space(),
                        disk.available_space(),
                    )
                })
                .collect::<Vec<DiskEntry>>()
        })
        .await
        .map_err(|e| SourceError::unavailable(format!("disk probe task failed: {e}")))?;

        trace!("found {} disks", entries.len());
        usage_for_mount(&entries, &self.mount_point)
    }
}
