//! Snapshot (§4.10): periodic counts row, computed from the stores
//! bundled on `AppContext` and persisted through `SnapshotStore`.

use chrono::Utc;

use crate::context::AppContext;
use crate::error::Result;
use crate::store::{SnapshotCounts, UploadArtifactKind};

pub async fn take(ctx: &AppContext) -> Result<()> {
    let series = ctx.series.list_active().await?;
    let mut episode_count = 0i64;
    for s in &series {
        episode_count += ctx.episodes.list_for_series(s.id).await?.len() as i64;
    }

    let card_count = ctx.cards.count_active().await?;
    let total_card_bytes = ctx.cards.total_bytes().await?;
    let font_count = ctx.fonts.list().await?.len() as i64;
    let template_count = ctx.templates.list().await?.len() as i64;
    let connections = ctx.connections.list().await?;
    let sync_count = connections.iter().filter(|c| c.kind.is_sync_source()).count() as i64;

    let loaded_count = ctx.upload_records.count(UploadArtifactKind::TitleCard).await?;

    let counts = SnapshotCounts {
        series_count: series.len() as i64,
        episode_count,
        card_count,
        font_count,
        template_count,
        loaded_count,
        user_count: 0,
        sync_count,
        blueprint_count: 0,
        total_card_bytes,
        taken_at: Utc::now(),
    };

    debug_assert!(counts.loaded_count <= counts.card_count, "loaded uploads cannot exceed built cards");
    ctx.snapshots.record(&counts).await
}

#[cfg(test)]
mod tests {
    #[test]
    fn invariant_documented_not_enforced_at_runtime() {
        // debug_assert above is the property check (§8); release builds
        // trust the Uploader to never record more loads than Cards exist.
    }
}
