//! Integration tests for object archive compile, version conversion and change events.

use std::fs;
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use thingpack::core::{
    AssetVersion, ChangeBatch, ChangeKind, CompileOutcome, Features, NoProgress, ProgressEvent,
    ProgressSink, SaveStatus,
};
use thingpack::thing::{
    Category, FrameGroup, FrameGroupType, Light, MarketData, ObjectStore, ObjectType, Offset,
};
use thingpack::util::{FrameCell, FrameDimensions};
use thingpack::Error;

fn v740() -> AssetVersion {
    AssetVersion::new(740, "Client 7.40", 0x41BF_619C, 0x41B9_EA86)
}

fn v860() -> AssetVersion {
    AssetVersion::new(860, "Client 8.60", 0x4C2C_7993, 0x4C22_0594)
}

fn v1098() -> AssetVersion {
    AssetVersion::new(1098, "Client 10.98", 0x42A3, 0x57BB_D603)
}

/// A still item using every payload flag 8.60 knows.
fn gold_coin() -> ObjectType {
    let mut coin = ObjectType::new(0, Category::Item);
    let props = &mut coin.properties;
    props.stackable = true;
    props.pickupable = true;
    props.light = Some(Light { intensity: 2, color: 215 });
    props.offset = Some(Offset { x: -4, y: 6 });
    props.elevation = Some(8);
    props.minimap_color = Some(210);
    props.cloth_slot = Some(9);
    props.market = Some(MarketData {
        category: 19,
        trade_as: 3031,
        show_as: 3031,
        name: "gold coin".to_string(),
        restrict_profession: 0,
        restrict_level: 0,
    });
    let dims = FrameDimensions { pattern_x: 4, pattern_y: 2, ..Default::default() };
    let mut group = FrameGroup::new(FrameGroupType::Default, dims).unwrap();
    for (i, id) in group.sprite_ids.iter_mut().enumerate() {
        *id = 1000 + i as u32;
    }
    coin.set_frame_group(group).unwrap();
    coin
}

fn compile_to(store: &mut ObjectStore, path: &Path, version: AssetVersion) {
    let status = store
        .save(path, version, Features::empty(), Arc::new(NoProgress))
        .expect("Failed to start compile");
    assert_eq!(status, SaveStatus::Started);
    assert_eq!(
        store.wait_compile().expect("Compile failed"),
        CompileOutcome::Compiled(path.to_path_buf())
    );
}

#[test]
fn test_upgrade_860_to_1098_keeps_properties() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("860.dat");
    let new = dir.path().join("1098.dat");

    let mut store = ObjectStore::create(v860(), Features::empty()).unwrap();
    let batch = store.add_thing(gold_coin()).unwrap();
    assert_eq!(batch.ids(), vec![101]);
    compile_to(&mut store, &old, v860());

    let mut store = ObjectStore::load(&old, v860(), Features::empty()).unwrap();
    let coin = store.get_thing(Category::Item, 101).unwrap().clone();
    assert_eq!(coin.properties, gold_coin().properties);
    assert_eq!(coin.default_group(), gold_coin().default_group());

    // 10.98 forces extended ids, durations and frame groups
    compile_to(&mut store, &new, v1098());
    assert!(store.features().frame_groups());
    let upgraded = ObjectStore::load(&new, v1098(), Features::empty()).unwrap();
    assert_eq!(upgraded.get_thing(Category::Item, 101).unwrap(), &coin);
    assert!(fs::metadata(&new).unwrap().len() > fs::metadata(&old).unwrap().len());
}

#[test]
fn test_animated_effect_gains_default_durations() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("860.dat");
    let new = dir.path().join("1098.dat");

    let mut store = ObjectStore::create(v860(), Features::empty()).unwrap();
    let mut effect = ObjectType::new(0, Category::Effect);
    let dims = FrameDimensions { frames: 5, ..Default::default() };
    effect.set_frame_group(FrameGroup::new(FrameGroupType::Default, dims).unwrap()).unwrap();
    store.add_thing(effect).unwrap();
    compile_to(&mut store, &old, v860());

    let mut store = ObjectStore::load(&old, v860(), Features::empty()).unwrap();
    assert!(store.get_thing(Category::Effect, 2).unwrap().default_group().animation.is_none());
    compile_to(&mut store, &new, v1098());

    let upgraded = ObjectStore::load(&new, v1098(), Features::empty()).unwrap();
    let group = upgraded.get_thing(Category::Effect, 2).unwrap().default_group();
    let animation = group.animation.as_ref().expect("durations written on upgrade");
    assert_eq!(animation.durations.len(), 5);
    assert!(animation.durations.iter().all(|d| d.min == 100 && d.max == 100));
}

#[test]
fn test_outfit_walking_group_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Tibia.dat");

    let mut outfit = ObjectType::new(0, Category::Outfit);
    let dims = FrameDimensions { layers: 2, pattern_x: 4, pattern_z: 2, frames: 8, ..Default::default() };
    let mut walking = FrameGroup::new(FrameGroupType::Walking, dims).unwrap();
    walking.set_sprite(&FrameCell { layer: 1, x: 3, z: 1, frame: 7, ..Default::default() }, 77).unwrap();
    walking.animation = Some(thingpack::thing::Animation::default_for(Category::Outfit, 8));
    outfit.set_frame_group(walking).unwrap();

    let mut store = ObjectStore::create(v1098(), Features::empty()).unwrap();
    store.add_thing(outfit.clone()).unwrap();
    compile_to(&mut store, &path, v1098());

    let loaded = ObjectStore::load(&path, v1098(), Features::empty()).unwrap();
    let read = loaded.get_thing(Category::Outfit, 2).unwrap();
    assert_eq!(read, &outfit.with_id(2));
    let walking = read.frame_group(FrameGroupType::Walking).unwrap();
    assert_eq!(walking.sprite_at(&FrameCell { layer: 1, x: 3, z: 1, frame: 7, ..Default::default() }), 77);
    assert_eq!(walking.sprite_ids.iter().filter(|id| **id != 0).count(), 1);
}

#[test]
fn test_pattern_z_needs_feature() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.dat");

    let mut item = ObjectType::new(0, Category::Item);
    let dims = FrameDimensions { pattern_z: 2, ..Default::default() };
    item.set_frame_group(FrameGroup::new(FrameGroupType::Default, dims).unwrap()).unwrap();

    let mut store = ObjectStore::create(v1098(), Features::empty()).unwrap();
    store.add_thing(item).unwrap();
    assert_eq!(
        store.save(&path, v740(), Features::empty(), Arc::new(NoProgress)).unwrap(),
        SaveStatus::Started
    );
    assert!(matches!(store.wait_compile(), Err(Error::Unsupported(_))));
    assert!(!path.exists());
    // the failed compile leaves the store as it was
    assert!(store.changed());
    assert_eq!(store.version().value(), 1098);
}

#[test]
fn test_change_events_over_channel() {
    let mut store = ObjectStore::create(v860(), Features::empty()).unwrap();
    let (tx, rx) = channel::<ChangeBatch<ObjectType>>();
    store.set_change_sink(tx);

    store.add_things(vec![gold_coin(), ObjectType::new(0, Category::Missile)]).unwrap();
    store.replace_thing(101, ObjectType::new(0, Category::Item)).unwrap();
    store.remove_thing(Category::Missile, 2).unwrap();

    let batches: Vec<_> = rx.try_iter().collect();
    let kinds: Vec<ChangeKind> = batches.iter().map(|b| b.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::Add, ChangeKind::Replace, ChangeKind::Remove]);
    assert_eq!(batches[0].ids(), vec![101, 2]);

    let replaced = &batches[1].changes[0];
    assert_eq!(replaced.previous.as_ref().unwrap().properties, gold_coin().properties);
    assert_eq!(replaced.current.as_ref().unwrap().id(), 101);

    // last missile removed outright
    assert!(batches[2].changes[0].current.is_none());
    assert_eq!(store.count(Category::Missile), 1);
}

#[test]
fn test_truncated_archive_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Tibia.dat");
    let mut store = ObjectStore::create(v860(), Features::empty()).unwrap();
    store.add_thing(gold_coin()).unwrap();
    compile_to(&mut store, &path, v860());

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
    match ObjectStore::load(&path, v860(), Features::empty()) {
        Err(err @ Error::UnexpectedEof(_)) => println!("Truncated load: {}", err),
        Err(err) => panic!("expected unexpected EOF, got {}", err),
        Ok(_) => panic!("truncated archive loaded"),
    }
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
    let target = dir.path().join("Tibia.dat");
    fs::write(&target, b"previous archive").unwrap();

    let mut store = ObjectStore::create(v860(), Features::empty()).unwrap();
    store.add_things((0..1500).map(|_| gold_coin()).collect()).unwrap();
    assert_eq!(store.count(Category::Item), 1600);

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
    assert_eq!(store.get_thing(Category::Item, 700).unwrap().properties, gold_coin().properties);
    assert!(matches!(store.add_thing(gold_coin()), Err(Error::NotReady(_))));
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
    assert_eq!(store.path(), None);
    assert_eq!(store.count(Category::Item), 1600);
}
