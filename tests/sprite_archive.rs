//! Integration tests for sprite archive compile, reload and cancellation.

use std::fs;
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use thingpack::core::{
    ArchiveKind, AssetVersion, CompileOutcome, Features, NoProgress, ProgressEvent, ProgressSink,
    SaveStatus,
};
use thingpack::sprite::{ChannelOrder, Sprite, SpriteStore, PIXEL_COUNT};
use thingpack::Error;

fn v860() -> AssetVersion {
    AssetVersion::new(860, "Client 8.60", 0x4C2C_7993, 0x4C22_0594)
}

fn v1098() -> AssetVersion {
    AssetVersion::new(1098, "Client 10.98", 0x42A3, 0x57BB_D603)
}

/// Every third pixel transparent, the rest coloured by `seed`.
fn pattern(seed: u32) -> Vec<u8> {
    (0..PIXEL_COUNT as u32)
        .flat_map(|p| {
            if (p + seed) % 3 == 0 {
                [0, 0, 0, 0]
            } else {
                [seed as u8, (p % 256) as u8, 0x40, 0xFF]
            }
        })
        .collect()
}

/// A store of `count` sprites (the initial blank plus `count - 1` patterned ones).
fn populated(version: AssetVersion, features: Features, count: u32) -> SpriteStore {
    let mut store = SpriteStore::create(version, features).expect("Failed to create store");
    let transparent = store.features().transparency();
    let sprites = (2..=count)
        .map(|i| Sprite::from_pixels(0, transparent, &pattern(i), ChannelOrder::Rgba).unwrap())
        .collect();
    store.add_sprites(sprites).expect("Failed to add sprites");
    store
}

fn compile_to(store: &mut SpriteStore, path: &Path, version: AssetVersion, features: Features) {
    let status = store
        .save(path, version, features, Arc::new(NoProgress))
        .expect("Failed to start compile");
    assert_eq!(status, SaveStatus::Started);
    assert_eq!(
        store.wait_compile().expect("Compile failed"),
        CompileOutcome::Compiled(path.to_path_buf())
    );
}

#[test]
fn test_compile_reports_progress_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Tibia.spr");
    let mut store = populated(v860(), Features::empty(), 1200);

    let (tx, rx) = channel::<ProgressEvent>();
    store
        .save(&path, v860(), Features::empty(), Arc::new(tx))
        .expect("Failed to start compile");
    store.wait_compile().expect("Compile failed");

    let events: Vec<ProgressEvent> = rx.try_iter().collect();
    println!("Progress: {:?}", events.iter().map(|e| e.percent).collect::<Vec<_>>());
    assert!(events.iter().all(|e| e.archive == ArchiveKind::Sprites));
    assert_eq!(events.first().map(|e| e.percent), Some(0));
    assert_eq!(events.last().map(|e| e.percent), Some(100));
    assert!(events.windows(2).all(|w| w[0].percent < w[1].percent));
    // one report per checkpoint of 500 records in between
    assert_eq!(events.len(), 4);

    let loaded = SpriteStore::load(&path, v860(), Features::empty()).expect("Failed to reload");
    assert_eq!(loaded.count(), 1200);
    assert!(loaded.is_empty_sprite(1).unwrap());
    for id in [2, 499, 500, 501, 1000, 1200] {
        let pixels = loaded.get_pixels(id, ChannelOrder::Rgba).unwrap();
        assert_eq!(pixels, pattern(id), "sprite {} differs after reload", id);
    }
    assert!(matches!(loaded.get_sprite(1201), Err(Error::IndexOutOfRange { .. })));
}

#[test]
fn test_recompile_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.spr");
    let second = dir.path().join("second.spr");

    let mut store = populated(v860(), Features::empty(), 40);
    compile_to(&mut store, &first, v860(), Features::empty());

    let mut reloaded = SpriteStore::load(&first, v860(), Features::empty()).unwrap();
    let same = reloaded.get_sprite(7).unwrap();
    reloaded.replace_sprite(7, same).unwrap();
    assert!(reloaded.changed());
    compile_to(&mut reloaded, &second, v860(), Features::empty());

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    assert_eq!(reloaded.path(), Some(second.as_path()));
}

#[test]
fn test_unchanged_save_copies_file() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.spr");
    let copy = dir.path().join("copy.spr");

    let mut store = populated(v860(), Features::empty(), 10);
    compile_to(&mut store, &first, v860(), Features::empty());

    let status = store.save(&copy, v860(), Features::empty(), Arc::new(NoProgress)).unwrap();
    assert_eq!(status, SaveStatus::Copied);
    assert!(!store.is_compiling());
    assert_eq!(fs::read(&first).unwrap(), fs::read(&copy).unwrap());

    // saving onto its own file is a no-op
    let status = store.save(&copy, v860(), Features::empty(), Arc::new(NoProgress)).unwrap();
    assert_eq!(status, SaveStatus::Copied);
}

#[test]
fn test_transparency_upgrade_keeps_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let opaque = dir.path().join("opaque.spr");
    let alpha = dir.path().join("alpha.spr");

    let mut store = populated(v860(), Features::empty(), 20);
    compile_to(&mut store, &opaque, v860(), Features::empty());

    let mut store = SpriteStore::load(&opaque, v860(), Features::empty()).unwrap();
    compile_to(&mut store, &alpha, v860(), Features::TRANSPARENCY);
    assert!(store.features().transparency());
    assert!(fs::metadata(&alpha).unwrap().len() > fs::metadata(&opaque).unwrap().len());

    let reloaded = SpriteStore::load(&alpha, v860(), Features::TRANSPARENCY).unwrap();
    for id in 2..=20 {
        let sprite = reloaded.get_sprite(id).unwrap();
        assert!(sprite.is_transparent());
        assert_eq!(sprite.pixels().unwrap(), pattern(id).as_slice());
    }
}

#[test]
fn test_signature_mismatch_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Tibia.spr");
    let mut store = populated(v860(), Features::empty(), 3);
    compile_to(&mut store, &path, v860(), Features::empty());

    match SpriteStore::load(&path, v1098(), Features::empty()) {
        Err(err @ Error::SignatureMismatch { .. }) => assert!(err.is_format_mismatch()),
        other => panic!("expected signature mismatch, got {:?}", other.map(|s| s.count())),
    }
    assert!(matches!(
        SpriteStore::load(dir.path().join("missing.spr"), v860(), Features::empty()),
        Err(Error::FileNotFound(_))
    ));
}

#[test]
fn test_downgrade_over_compact_limit_fails_early() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("small.spr");

    let mut store = SpriteStore::create(v1098(), Features::empty()).unwrap();
    assert!(store.features().extended());
    store.add_sprites(vec![Sprite::empty(0, false); 65_535]).unwrap();
    assert_eq!(store.count(), 65_536);

    let result = store.save(&path, v860(), Features::empty(), Arc::new(NoProgress));
    assert!(matches!(result, Err(Error::CapacityExceeded { limit: 65_535, .. })));
    assert!(!store.is_compiling());
    assert!(!path.exists());
}

/// Holds the worker at its first mid-compile checkpoint until released.
struct Gate {
    reached: Mutex<Sender<u8>>,
    release: Mutex<Receiver<()>>,
}

impl ProgressSink for Gate {
    fn progress(&self, event: ProgressEvent) {
        if event.percent > 0 && event.percent < 100 {
            let _ = self.reached.lock().unwrap().send(event.percent);
            let _ = self.release.lock().unwrap().recv();
        }
    }
}

#[test]
fn test_cancel_mid_compile_leaves_target_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("Tibia.spr");
    fs::write(&target, b"previous archive").unwrap();

    let mut store = populated(v860(), Features::empty(), 1200);
    let (reached_tx, reached_rx) = channel();
    let (release_tx, release_rx) = channel();
    let gate = Gate {
        reached: Mutex::new(reached_tx),
        release: Mutex::new(release_rx),
    };

    assert_eq!(
        store.save(&target, v860(), Features::empty(), Arc::new(gate)).unwrap(),
        SaveStatus::Started
    );
    let percent = reached_rx.recv().expect("worker never reached a checkpoint");
    assert!(percent > 0 && percent < 100);

    // reads are served during the compile; mutations and a second save are not
    assert!(store.is_compiling());
    assert_eq!(store.get_pixels(10, ChannelOrder::Rgba).unwrap(), pattern(10));
    assert!(matches!(store.add_sprite(Sprite::empty(0, false)), Err(Error::NotReady(_))));
    assert_eq!(
        store.save(&target, v860(), Features::empty(), Arc::new(NoProgress)).unwrap(),
        SaveStatus::NotStarted
    );

    store.cancel_compile();
    release_tx.send(()).unwrap();
    assert_eq!(store.wait_compile().unwrap(), CompileOutcome::Cancelled);

    assert_eq!(fs::read(&target).unwrap(), b"previous archive");
    let entries = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 1, "temporary file left behind");
    assert!(store.changed());
    assert_eq!(store.count(), 1200);
}
