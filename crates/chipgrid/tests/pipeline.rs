//! End-to-end pipeline: two independent workers build partial manifests,
//! persist them through the blob store, and the merge combines them.

use std::collections::HashMap;

use chipgrid::bins::BinSet;
use chipgrid::builder::build_partial_manifest;
use chipgrid::grid::GridSpec;
use chipgrid::manifest::{parse_manifest, write_manifest};
use chipgrid::merge::{merge, ManifestStats, PartialManifest};
use chipgrid::shard::shard;
use chipgrid::store::{BlobStore, LocalBlobStore, RasterMetadata};
use chipgrid::{ChipError, ChipResult};

struct FakeMetadata(HashMap<String, (u32, u32)>);

impl RasterMetadata for FakeMetadata {
    fn dimensions(&self, image: &str) -> ChipResult<(u32, u32)> {
        self.0
            .get(image)
            .copied()
            .ok_or_else(|| ChipError::ImageUnreadable {
                image: image.to_string(),
                reason: "missing".to_string(),
            })
    }
}

fn corpus(n: usize) -> (FakeMetadata, Vec<String>) {
    let sizes: Vec<(String, (u32, u32))> = (0..n)
        .map(|i| (format!("cap-{i:02}"), (10_000, 8_000)))
        .collect();
    let images = sizes.iter().map(|(name, _)| name.clone()).collect();
    (FakeMetadata(sizes.into_iter().collect()), images)
}

#[test]
fn two_workers_build_and_merge_cleanly() {
    let (metadata, images) = corpus(7);
    let bins = BinSet::per_tile();
    let grid = GridSpec::default();

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBlobStore::new(dir.path());

    for worker in 0..2 {
        let names: Vec<String> = shard(&images, worker, 2).into_iter().cloned().collect();
        let report = build_partial_manifest(&metadata, &names, &bins, &grid);
        assert_eq!(report.rows.len(), names.len() * 30);
        assert!(report.failed.is_empty());

        let csv = write_manifest(&report.rows).unwrap();
        store
            .write(&format!("partial/task_{worker:03}.csv"), csv.as_bytes())
            .unwrap();
    }

    let mut partials = Vec::new();
    for key in store.list("partial/").unwrap() {
        let text = String::from_utf8(store.read(&key).unwrap()).unwrap();
        let rows = parse_manifest(&text, &key).unwrap();
        partials.push(PartialManifest { name: key, rows });
    }
    assert_eq!(partials.len(), 2);

    let rows = merge(&partials).unwrap();
    assert_eq!(rows.len(), images.len() * 30);

    let stats = ManifestStats::compute(&rows);
    assert_eq!(stats.distinct_images, images.len());

    // Final ordering is ascending by (source_image, ulx, uly).
    let ids: Vec<_> = rows
        .iter()
        .map(|r| (r.source_image.clone(), r.ulx, r.uly))
        .collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn overlapping_shards_are_rejected_at_merge() {
    let (metadata, images) = corpus(3);
    let bins = BinSet::per_tile();
    let grid = GridSpec::default();

    // Both "workers" process the full image list: a broken partition.
    let first = build_partial_manifest(&metadata, &images, &bins, &grid);
    let second = build_partial_manifest(&metadata, &images, &bins, &grid);

    let err = merge(&[
        PartialManifest {
            name: "task_000.csv".to_string(),
            rows: first.rows,
        },
        PartialManifest {
            name: "task_001.csv".to_string(),
            rows: second.rows,
        },
    ])
    .unwrap_err();

    assert!(matches!(err, ChipError::ManifestConflict { .. }), "{err}");
}
