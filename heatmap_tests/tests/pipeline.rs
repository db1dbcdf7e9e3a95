// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Full runs of the tile pipeline on the CPU backend.

use std::fs;
use std::path::Path;

use heatmap::geometry::{LatLng, geodetic_to_tile};
use heatmap::{Projection, RenderOptions, TILE_SIZE, TileIndex, TileRenderer, TileWriter};
use heatmap_tests::{CountingBackend, dataset, decode_tile, kernel, read_tree, spiral};

fn mercator() -> Projection {
    Projection::new("EPSG:3857").unwrap()
}

fn assert_linked_to_blank(outdir: &Path, tile: &Path) {
    let blank = outdir.join("blank.png");
    assert_eq!(fs::read(tile).unwrap(), fs::read(&blank).unwrap());
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        assert_eq!(
            fs::metadata(tile).unwrap().ino(),
            fs::metadata(&blank).unwrap().ino(),
            "{} is not a link to blank.png",
            tile.display()
        );
    }
}

#[test]
fn single_point_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let projection = mercator();
    let location = LatLng::new(45.5, 0.25);
    let points = dataset(&[(location.lat, location.lng, 1.0)]);
    let mut options = RenderOptions::new(1, "46,-0.5,45,0.5".parse().unwrap(), dir.path());
    options.prefilter = 0.0;

    let mut renderer = TileRenderer::new(CountingBackend::cpu(), &kernel("idw", &[]).unwrap())
        .unwrap();
    let summary = renderer.render(&points, &projection, &options).unwrap();
    // The box straddles the meridian and ceils into the southern row.
    assert_eq!(summary.range.len(), 4);
    assert_eq!((summary.rendered, summary.blank), (1, 3));
    assert_eq!(renderer.backend().dispatches, 1);
    assert_eq!(renderer.backend().dispatched_points, 1);
    assert_eq!(renderer.backend().reserved, Some(1));

    let p = geodetic_to_tile(location, 1);
    let index = TileIndex::new(1, p.x as u32, p.y as u32);
    assert_eq!((index.x, index.y), (1, 0));
    let tile = decode_tile(&dir.path().join("1").join("1").join("0.png")).unwrap();
    let size = f64::from(TILE_SIZE);
    let px = ((p.x - 1.0) * size) as u32;
    let py = (p.y * size) as u32;
    assert_ne!(tile.get(px, py), 0);
    assert_eq!(tile.alpha[0], 0);
    assert_eq!(tile.palette.len(), 256 * 3);

    assert_linked_to_blank(dir.path(), &dir.path().join("1").join("0").join("0.png"));
    assert!(decode_tile(&dir.path().join("blank.png")).unwrap().is_blank());
}

#[test]
fn only_tiles_with_points_are_dispatched() {
    let dir = tempfile::tempdir().unwrap();
    let projection = mercator();
    let points = spiral(LatLng::new(46.0, 14.5), 1.5, 40);
    let mut options = RenderOptions::new(7, "49,10,43,19".parse().unwrap(), dir.path());
    options.prefilter = 5_000.0;

    let mut renderer = TileRenderer::new(CountingBackend::cpu(), &kernel("idw", &[]).unwrap())
        .unwrap();
    let summary = renderer.render(&points, &projection, &options).unwrap();
    assert!(summary.rendered > 0 && summary.blank > 0, "{summary:?}");
    assert_eq!(summary.rendered + summary.blank, summary.range.len());
    assert_eq!(renderer.backend().dispatches, summary.rendered);

    let writer = TileWriter::new(dir.path(), &options.colormap);
    let mut rendered = 0;
    for index in summary.range.iter() {
        let path = writer.tile_path(index);
        let tile = decode_tile(&path).unwrap();
        if tile.is_blank() {
            assert_linked_to_blank(dir.path(), &path);
        } else {
            // A selected point makes every idw pixel non-background.
            assert!(tile.pixels.iter().all(|&p| p != 0));
            rendered += 1;
        }
    }
    assert_eq!(rendered, summary.rendered);
}

#[test]
fn rerun_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let projection = mercator();
    let points = spiral(LatLng::new(-33.9, 18.4), 0.5, 12);
    let mut options = RenderOptions::new(8, "-33,17.5,-35,19.5".parse().unwrap(), dir.path());
    options.prefilter = 20_000.0;
    let source = kernel("density", &["RADIUS=5000"]).unwrap();

    let first = TileRenderer::new(CountingBackend::cpu(), &source)
        .unwrap()
        .render(&points, &projection, &options)
        .unwrap();
    let before = read_tree(dir.path()).unwrap();

    let second = TileRenderer::new(CountingBackend::cpu(), &source)
        .unwrap()
        .render(&points, &projection, &options)
        .unwrap();
    let after = read_tree(dir.path()).unwrap();

    assert_eq!(first.rendered, second.rendered);
    assert_eq!(second.cache_hits, second.range.len());
    assert_eq!(second.cache_misses, 0);
    assert_eq!(before.len(), after.len());
    for ((name_a, a), (name_b, b)) in before.iter().zip(&after) {
        assert_eq!(name_a, name_b);
        assert!(a == b, "{name_a} changed between runs");
    }
}

#[test]
fn separate_cache_dir_keeps_outdir_clean() {
    let dir = tempfile::tempdir().unwrap();
    let outdir = dir.path().join("tiles");
    let cache = dir.path().join("transforms");
    let mut options = RenderOptions::new(3, "50,10,40,20".parse().unwrap(), &outdir);
    options.cache_dir = Some(cache.clone());

    let summary = TileRenderer::new(CountingBackend::cpu(), &kernel("idw", &[]).unwrap())
        .unwrap()
        .render(&dataset(&[(45.0, 15.0, 0.5)]), &mercator(), &options)
        .unwrap();
    assert!(cache.join("transforms.projection").exists());
    assert!(!outdir.join("transforms.projection").exists());
    for (name, bytes) in read_tree(&cache).unwrap() {
        if name.ends_with(".map") {
            assert_eq!(bytes.len(), 32, "{name}");
        }
    }
    assert_eq!(
        read_tree(&outdir)
            .unwrap()
            .iter()
            .filter(|(name, _)| name.ends_with(".png"))
            .count(),
        summary.range.len() + 1
    );
}

#[test]
fn unwritable_cache_still_renders() {
    let dir = tempfile::tempdir().unwrap();
    let outdir = dir.path().join("tiles");
    let cache = dir.path().join("not_a_directory");
    fs::write(&cache, b"").unwrap();
    let mut options = RenderOptions::new(3, "50,10,40,20".parse().unwrap(), &outdir);
    options.cache_dir = Some(cache.clone());

    let summary = TileRenderer::new(CountingBackend::cpu(), &kernel("idw", &[]).unwrap())
        .unwrap()
        .render(&dataset(&[(45.0, 15.0, 0.5)]), &mercator(), &options)
        .unwrap();
    assert_eq!(summary.cache_hits, 0);
    assert_eq!(summary.cache_misses, summary.range.len());
    assert_eq!(summary.rendered + summary.blank, summary.range.len());
    assert!(fs::metadata(&cache).unwrap().is_file());
    assert!(!cache.join("transforms.projection").exists());
    assert!(!outdir.join("transforms.projection").exists());

    let writer = TileWriter::new(&outdir, &options.colormap);
    for index in summary.range.iter() {
        decode_tile(&writer.tile_path(index)).unwrap();
    }
}

#[test]
fn unwritable_outdir_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let outdir = dir.path().join("not_a_directory");
    fs::write(&outdir, b"").unwrap();
    let mut options = RenderOptions::new(3, "50,10,40,20".parse().unwrap(), &outdir);
    options.cache_dir = Some(dir.path().join("transforms"));

    let mut renderer = TileRenderer::new(CountingBackend::cpu(), &kernel("idw", &[]).unwrap())
        .unwrap();
    let summary = renderer
        .render(&dataset(&[(45.0, 15.0, 0.5)]), &mercator(), &options)
        .unwrap();
    assert!(summary.rendered > 0);
    assert_eq!(renderer.backend().dispatches, summary.rendered);
    assert!(fs::metadata(&outdir).unwrap().is_file());
}
