//! Editable object-metadata archive.
//!
//! Layout: `u32 signature`, then `u16` item, outfit, effect and missile
//! counts (each the highest id of its category), then every record of each
//! category in ascending id order. Items start at id 100, the rest at 1.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::{debug, info, warn};

use super::codec::{read_object, write_object, CursorExt, RecordLayout};
use super::convert::to_single_frame_group;
use super::types::{Category, ObjectType};
use crate::core::{
    persist, same_file, temp_file_for, ArchiveKind, AssetVersion, CancelToken, ChangeBatch,
    ChangeKind, ChangeSink, CompileJob, CompileOutcome, Features, Progress, ProgressSink,
    SaveStatus,
};
use crate::util::{Error, Result};

/// Highest id any category can hold.
pub const MAX_OBJECT_ID: u32 = u16::MAX as u32;

/// Records of one category plus its running count.
#[derive(Clone, Debug)]
struct Collection {
    category: Category,
    things: BTreeMap<u32, ObjectType>,
    count: u32,
}

impl Collection {
    fn empty(category: Category) -> Self {
        Self {
            category,
            things: BTreeMap::new(),
            count: category.min_id() - 1,
        }
    }

    /// One placeholder at the first id.
    fn with_placeholder(category: Category) -> Self {
        let mut collection = Self::empty(category);
        collection.push(ObjectType::new(category.min_id(), category));
        collection
    }

    fn push(&mut self, thing: ObjectType) -> u32 {
        self.count += 1;
        self.things.insert(self.count, thing.with_id(self.count));
        self.count
    }

    fn len(&self) -> u32 {
        self.count + 1 - self.category.min_id()
    }
}

/// What a finished compile hands back to the store.
struct Compiled {
    path: PathBuf,
    version: AssetVersion,
    features: Features,
}

/// Object-metadata archive store.
pub struct ObjectStore {
    version: AssetVersion,
    features: Features,
    path: Option<PathBuf>,
    collections: [Collection; 4],
    changed: bool,
    disposed: bool,
    job: Option<CompileJob<Compiled>>,
    sink: Option<Box<dyn ChangeSink<ObjectType>>>,
}

impl ObjectStore {
    /// A new store with one placeholder per category.
    pub fn create(version: AssetVersion, features: Features) -> Result<Self> {
        version.validate()?;
        let features = Features::resolve(&version, features);
        info!(version = %version, ?features, "created object store");
        Ok(Self {
            version,
            features,
            path: None,
            collections: Category::ALL.map(Collection::with_placeholder),
            changed: true,
            disposed: false,
            job: None,
            sink: None,
        })
    }

    /// Read a whole object archive for `version`.
    pub fn load(path: impl AsRef<Path>, version: AssetVersion, features: Features) -> Result<Self> {
        version.validate()?;
        let features = Features::resolve(&version, features);
        let path = path.as_ref();
        let collections = read_archive(path, &version, features)?;
        Ok(Self {
            version,
            features,
            path: Some(path.to_path_buf()),
            collections,
            changed: false,
            disposed: false,
            job: None,
            sink: None,
        })
    }

    /// Publish every change batch to `sink`.
    pub fn set_change_sink(&mut self, sink: impl ChangeSink<ObjectType> + 'static) {
        self.sink = Some(Box::new(sink));
    }

    #[inline]
    pub fn version(&self) -> &AssetVersion {
        &self.version
    }

    #[inline]
    pub fn features(&self) -> Features {
        self.features
    }

    #[inline]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True when there are edits not yet compiled.
    #[inline]
    pub fn changed(&self) -> bool {
        self.changed
    }

    #[inline]
    pub fn is_compiling(&self) -> bool {
        self.job.is_some()
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Highest id of a category.
    pub fn count(&self, category: Category) -> u32 {
        self.collection(category).count
    }

    /// First id of a category.
    pub fn min_id(&self, category: Category) -> u32 {
        category.min_id()
    }

    /// Look up one object.
    pub fn get_thing(&self, category: Category, id: u32) -> Result<&ObjectType> {
        self.check_alive()?;
        let collection = self.collection(category);
        collection
            .things
            .get(&id)
            .ok_or(Error::IndexOutOfRange { id, count: collection.count })
    }

    /// Every object of a category in ascending id order.
    pub fn things(&self, category: Category) -> Result<impl Iterator<Item = &ObjectType> + '_> {
        self.check_alive()?;
        Ok(self.collection(category).things.values())
    }

    pub fn add_thing(&mut self, thing: ObjectType) -> Result<ChangeBatch<ObjectType>> {
        self.add_things(vec![thing])
    }

    /// Append objects to their categories. Ids are assigned from each category's count.
    pub fn add_things(&mut self, things: Vec<ObjectType>) -> Result<ChangeBatch<ObjectType>> {
        self.check_mutable()?;
        let mut incoming = [0u32; 4];
        for thing in &things {
            incoming[thing.category().index()] += 1;
        }
        for category in Category::ALL {
            if self.count(category) + incoming[category.index()] > MAX_OBJECT_ID {
                return Err(Error::CapacityExceeded {
                    what: "objects per category",
                    limit: u64::from(MAX_OBJECT_ID),
                });
            }
        }
        for thing in &things {
            validate(thing)?;
        }

        let mut batch = ChangeBatch::new(ChangeKind::Add);
        for thing in things {
            let collection = self.collection_mut(thing.category());
            let id = collection.push(thing);
            let current = collection.things.get(&id).cloned();
            batch.push(id, None, current);
        }
        Ok(self.publish(batch))
    }

    pub fn replace_thing(&mut self, id: u32, thing: ObjectType) -> Result<ChangeBatch<ObjectType>> {
        self.replace_things(vec![(id, thing)])
    }

    /// Replace existing objects; the category comes from each object.
    pub fn replace_things(&mut self, things: Vec<(u32, ObjectType)>) -> Result<ChangeBatch<ObjectType>> {
        self.check_mutable()?;
        for (id, thing) in &things {
            self.check_id(thing.category(), *id)?;
            validate(thing)?;
        }

        let mut batch = ChangeBatch::new(ChangeKind::Replace);
        for (id, thing) in things {
            let thing = thing.with_id(id);
            let previous = self.collection_mut(thing.category()).things.insert(id, thing.clone());
            batch.push(id, previous, Some(thing));
        }
        Ok(self.publish(batch))
    }

    pub fn remove_thing(&mut self, category: Category, id: u32) -> Result<ChangeBatch<ObjectType>> {
        self.remove_things(category, &[id])
    }

    /// Remove objects of one category, highest id first.
    ///
    /// Removing the last id shrinks the category (never below one object);
    /// any other id is reset to a placeholder.
    pub fn remove_things(&mut self, category: Category, ids: &[u32]) -> Result<ChangeBatch<ObjectType>> {
        self.check_mutable()?;
        for id in ids {
            self.check_id(category, *id)?;
        }

        let mut ids = ids.to_vec();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();

        let mut batch = ChangeBatch::new(ChangeKind::Remove);
        let collection = self.collection_mut(category);
        for id in ids {
            if id == collection.count && collection.len() > 1 {
                let previous = collection.things.remove(&id);
                collection.count -= 1;
                batch.push(id, previous, None);
            } else {
                let placeholder = ObjectType::new(id, category);
                let previous = collection.things.insert(id, placeholder.clone());
                batch.push(id, previous, Some(placeholder));
            }
        }
        Ok(self.publish(batch))
    }

    /// Write the store to `path` for `version` and `features`.
    ///
    /// Unchanged stores are copied to a different path. Anything else starts
    /// a background compile; collect it with [`poll_compile`](Self::poll_compile)
    /// or [`wait_compile`](Self::wait_compile).
    pub fn save(
        &mut self,
        path: impl AsRef<Path>,
        version: AssetVersion,
        features: Features,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<SaveStatus> {
        self.check_alive()?;
        if self.job.is_some() {
            warn!("object compile already running; save ignored");
            return Ok(SaveStatus::NotStarted);
        }
        version.validate()?;
        let features = Features::resolve(&version, features);
        let target = path.as_ref().to_path_buf();

        if !self.changed && version == self.version && features == self.features {
            if let Some(current) = self.path.clone() {
                if !same_file(&current, &target) {
                    fs::copy(&current, &target)?;
                    self.path = Some(target.clone());
                    info!(path = %target.display(), "object archive unchanged; copied");
                    return Ok(SaveStatus::Copied);
                }
            }
        }

        let cancel = CancelToken::new();
        let collections = self.collections.clone();
        let worker_cancel = cancel.clone();
        let total: u64 = collections.iter().map(|c| u64::from(c.len())).sum();
        let job = CompileJob::spawn("object-compile", cancel, move || {
            let mut progress = Progress::new(ArchiveKind::Objects, progress, worker_cancel, total);
            compile(&collections, target, version, features, &mut progress)
        })?;
        self.job = Some(job);
        Ok(SaveStatus::Started)
    }

    /// Collect a finished compile without blocking. `Ok(None)` while running.
    pub fn poll_compile(&mut self) -> Result<Option<CompileOutcome>> {
        let finished = self.job.as_ref().is_some_and(|job| job.is_finished());
        if finished {
            self.wait_compile().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Block until the running compile ends and rebind on success.
    pub fn wait_compile(&mut self) -> Result<CompileOutcome> {
        let job = self.job.take().ok_or(Error::NotReady("no compile in progress"))?;
        match job.join()? {
            Some(compiled) => {
                // Reread what was written so records match the new format.
                self.collections = read_archive(&compiled.path, &compiled.version, compiled.features)?;
                self.version = compiled.version;
                self.features = compiled.features;
                self.path = Some(compiled.path.clone());
                self.changed = false;
                Ok(CompileOutcome::Compiled(compiled.path))
            }
            None => {
                info!("object compile cancelled");
                Ok(CompileOutcome::Cancelled)
            }
        }
    }

    /// Ask the running compile to stop at its next checkpoint.
    pub fn cancel_compile(&self) {
        if let Some(job) = &self.job {
            job.cancel();
        }
    }

    /// Cancel any compile and drop every record.
    pub fn dispose(&mut self) {
        if let Some(job) = self.job.take() {
            job.cancel();
            if let Err(err) = job.join() {
                warn!(%err, "object compile failed during dispose");
            }
        }
        self.collections = Category::ALL.map(Collection::empty);
        self.disposed = true;
        debug!("object store disposed");
    }

    fn collection(&self, category: Category) -> &Collection {
        &self.collections[category.index()]
    }

    fn collection_mut(&mut self, category: Category) -> &mut Collection {
        &mut self.collections[category.index()]
    }

    fn publish(&mut self, batch: ChangeBatch<ObjectType>) -> ChangeBatch<ObjectType> {
        self.changed = true;
        if let Some(sink) = &self.sink {
            sink.changed(&batch);
        }
        batch
    }

    fn check_id(&self, category: Category, id: u32) -> Result<()> {
        let count = self.count(category);
        if id < category.min_id() || id > count {
            return Err(Error::IndexOutOfRange { id, count });
        }
        Ok(())
    }

    fn check_alive(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    fn check_mutable(&self) -> Result<()> {
        self.check_alive()?;
        if self.job.is_some() {
            return Err(Error::NotReady("object compile in progress"));
        }
        Ok(())
    }
}

impl Drop for ObjectStore {
    fn drop(&mut self) {
        if let Some(job) = &self.job {
            job.cancel();
        }
    }
}

/// Parse every category of the archive at `path`.
fn read_archive(path: &Path, version: &AssetVersion, features: Features) -> Result<[Collection; 4]> {
    let data = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })?;

    let mut r = Cursor::new(data.as_slice());
    let signature = r.get_u32()?;
    if signature != version.dat_signature() {
        return Err(Error::SignatureMismatch {
            expected: version.dat_signature(),
            actual: signature,
        });
    }

    let mut counts = [0u32; 4];
    for count in counts.iter_mut() {
        *count = u32::from(r.get_u16()?);
    }

    let layout = RecordLayout::new(version, features);
    let mut collections = Category::ALL.map(Collection::empty);
    for (collection, &declared) in collections.iter_mut().zip(counts.iter()) {
        let category = collection.category;
        for id in category.min_id()..=declared {
            let thing = read_object(&mut r, id, category, &layout)?;
            collection.things.insert(id, thing);
        }
        collection.count = declared.max(category.min_id() - 1);
        debug!(%category, count = collection.count, "read object records");
    }

    let trailing = data.len() as u64 - r.position();
    if trailing > 0 {
        warn!(trailing, path = %path.display(), "object archive has trailing bytes");
    }

    info!(
        path = %path.display(),
        items = counts[0],
        outfits = counts[1],
        effects = counts[2],
        missiles = counts[3],
        "loaded object archive"
    );
    Ok(collections)
}

fn validate(thing: &ObjectType) -> Result<()> {
    thing.groups().iter().try_for_each(|g| g.validate())
}

/// Worker body: write every category into a temp file, then swap it in.
fn compile(
    collections: &[Collection; 4],
    target: PathBuf,
    version: AssetVersion,
    features: Features,
    progress: &mut Progress,
) -> Result<Option<Compiled>> {
    if progress.start() {
        return Ok(None);
    }

    let layout = RecordLayout::new(&version, features);
    let mut temp = temp_file_for(&target)?;
    {
        let mut w = BufWriter::with_capacity(1024 * 1024, temp.as_file_mut());
        w.write_u32::<LittleEndian>(version.dat_signature())?;
        for collection in collections {
            w.write_u16::<LittleEndian>(collection.count as u16)?;
        }

        for collection in collections {
            let category = collection.category;
            for id in category.min_id()..=collection.count {
                let placeholder;
                let thing = match collection.things.get(&id) {
                    Some(thing) => thing,
                    None => {
                        placeholder = ObjectType::new(id, category);
                        &placeholder
                    }
                };
                if category == Category::Outfit && !features.frame_groups() && thing.has_walking_group() {
                    write_object(&mut w, &to_single_frame_group(thing)?, &layout)?;
                } else {
                    write_object(&mut w, thing, &layout)?;
                }
                if progress.advance(1) {
                    debug!(%category, id, "object compile cancelled at checkpoint");
                    return Ok(None);
                }
            }
        }
        w.flush()?;
    }

    persist(temp, &target)?;
    progress.finish();
    info!(path = %target.display(), "compiled object archive");
    Ok(Some(Compiled { path: target, version, features }))
}
