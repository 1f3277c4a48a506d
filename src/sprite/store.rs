//! Editable sprite archive.
//!
//! A store reads untouched records straight from its backing file and keeps
//! every added, replaced or removed sprite in an in-memory overlay until the
//! next compile writes a fresh archive and rebinds the store to it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::{ChannelOrder, Sprite};
use crate::archive::{max_count, AddressedReader, AddressedWriter};
use crate::core::{
    persist, same_file, temp_file_for, ArchiveKind, AssetVersion, CancelToken, ChangeBatch,
    ChangeKind, ChangeSink, CompileJob, CompileOutcome, Features, Progress, ProgressSink,
    SaveStatus, CHECKPOINT_INTERVAL,
};
use crate::util::{Error, Result};

/// What a finished compile hands back to the store.
struct Compiled {
    path: PathBuf,
    version: AssetVersion,
    features: Features,
}

/// Snapshot a compile worker writes from.
struct CompileInput {
    target: PathBuf,
    version: AssetVersion,
    features: Features,
    source: Option<Arc<AddressedReader>>,
    source_transparent: bool,
    overlay: HashMap<u32, Sprite>,
    count: u32,
}

/// Sprite archive store.
pub struct SpriteStore {
    version: AssetVersion,
    features: Features,
    path: Option<PathBuf>,
    source: Option<Arc<AddressedReader>>,
    overlay: HashMap<u32, Sprite>,
    count: u32,
    changed: bool,
    disposed: bool,
    job: Option<CompileJob<Compiled>>,
    sink: Option<Box<dyn ChangeSink<Sprite>>>,
}

impl SpriteStore {
    /// A new store holding a single blank sprite (id 1).
    pub fn create(version: AssetVersion, features: Features) -> Result<Self> {
        version.validate()?;
        let features = Features::resolve(&version, features);
        info!(version = %version, ?features, "created sprite store");
        Ok(Self {
            version,
            features,
            path: None,
            source: None,
            overlay: HashMap::new(),
            count: 1,
            changed: true,
            disposed: false,
            job: None,
            sink: None,
        })
    }

    /// Open a sprite archive for `version`.
    pub fn load(path: impl AsRef<Path>, version: AssetVersion, features: Features) -> Result<Self> {
        version.validate()?;
        let features = Features::resolve(&version, features);
        let path = path.as_ref();
        let reader = AddressedReader::open(path, version.spr_signature(), features.extended())?;
        info!(
            path = %path.display(),
            count = reader.count(),
            version = %version,
            "loaded sprite archive"
        );
        Ok(Self {
            version,
            features,
            path: Some(path.to_path_buf()),
            count: reader.count(),
            source: Some(Arc::new(reader)),
            overlay: HashMap::new(),
            changed: false,
            disposed: false,
            job: None,
            sink: None,
        })
    }

    /// Publish every change batch to `sink`.
    pub fn set_change_sink(&mut self, sink: impl ChangeSink<Sprite> + 'static) {
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

    /// Backing file, if the store was loaded or compiled.
    #[inline]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Highest valid sprite id.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
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

    /// True when no further sprite fits in the id space.
    pub fn is_full(&self) -> bool {
        self.count >= max_count(self.features.extended())
    }

    /// Fetch a sprite. Id 0 yields an empty sprite.
    ///
    /// Reads are served while this store compiles.
    pub fn get_sprite(&self, id: u32) -> Result<Sprite> {
        self.check_alive()?;
        let transparent = self.features.transparency();
        if id == 0 {
            return Ok(Sprite::empty(0, transparent));
        }
        if id > self.count {
            return Err(Error::IndexOutOfRange { id, count: self.count });
        }
        if let Some(sprite) = self.overlay.get(&id) {
            return Ok(sprite.clone());
        }
        match &self.source {
            Some(source) if id <= source.count() => Ok(match source.read_record(id)? {
                Some(bytes) => Sprite::from_compressed(id, transparent, bytes),
                None => Sprite::empty(id, transparent),
            }),
            _ => Ok(Sprite::empty(id, transparent)),
        }
    }

    /// Decoded pixels of a sprite.
    pub fn get_pixels(&self, id: u32, order: ChannelOrder) -> Result<Vec<u8>> {
        self.get_sprite(id)?.pixels_in(order)
    }

    /// True when the sprite has no visible pixel.
    pub fn is_empty_sprite(&self, id: u32) -> Result<bool> {
        Ok(self.get_sprite(id)?.is_empty())
    }

    pub fn add_sprite(&mut self, sprite: Sprite) -> Result<ChangeBatch<Sprite>> {
        self.add_sprites(vec![sprite])
    }

    /// Append sprites at `count + 1`, `count + 2`, ...
    ///
    /// Fails before changing anything if the id space would overflow.
    pub fn add_sprites(&mut self, sprites: Vec<Sprite>) -> Result<ChangeBatch<Sprite>> {
        self.check_mutable()?;
        let limit = max_count(self.features.extended());
        if u64::from(self.count) + sprites.len() as u64 > u64::from(limit) {
            return Err(Error::CapacityExceeded {
                what: "sprite count",
                limit: u64::from(limit),
            });
        }

        let mut batch = ChangeBatch::new(ChangeKind::Add);
        for sprite in sprites {
            self.count += 1;
            let sprite = sprite.with_id(self.count);
            batch.push(self.count, None, Some(sprite.clone()));
            self.overlay.insert(self.count, sprite);
        }
        Ok(self.publish(batch))
    }

    pub fn replace_sprite(&mut self, id: u32, sprite: Sprite) -> Result<ChangeBatch<Sprite>> {
        self.replace_sprites(vec![(id, sprite)])
    }

    /// Replace existing sprites. Every id is checked before any is replaced.
    pub fn replace_sprites(&mut self, sprites: Vec<(u32, Sprite)>) -> Result<ChangeBatch<Sprite>> {
        self.check_mutable()?;
        for (id, _) in &sprites {
            self.check_id(*id)?;
        }

        let mut batch = ChangeBatch::new(ChangeKind::Replace);
        for (id, sprite) in sprites {
            let previous = self.get_sprite(id)?;
            let sprite = sprite.with_id(id);
            batch.push(id, Some(previous), Some(sprite.clone()));
            self.overlay.insert(id, sprite);
        }
        Ok(self.publish(batch))
    }

    pub fn remove_sprite(&mut self, id: u32) -> Result<ChangeBatch<Sprite>> {
        self.remove_sprites(&[id])
    }

    /// Remove sprites, highest id first.
    ///
    /// Removing the last id shrinks the store (never below one sprite);
    /// any other id becomes an empty sprite.
    pub fn remove_sprites(&mut self, ids: &[u32]) -> Result<ChangeBatch<Sprite>> {
        self.check_mutable()?;
        for id in ids {
            self.check_id(*id)?;
        }

        let mut ids = ids.to_vec();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();

        let transparent = self.features.transparency();
        let mut batch = ChangeBatch::new(ChangeKind::Remove);
        for id in ids {
            let previous = self.get_sprite(id)?;
            if id == self.count && self.count > 1 {
                self.overlay.remove(&id);
                self.count -= 1;
                batch.push(id, Some(previous), None);
            } else {
                let blank = Sprite::empty(id, transparent);
                batch.push(id, Some(previous), Some(blank.clone()));
                self.overlay.insert(id, blank);
            }
        }
        Ok(self.publish(batch))
    }

    /// Write the store to `path` for `version` and `features`.
    ///
    /// Unchanged stores are copied. Otherwise a background compile starts;
    /// collect it with [`poll_compile`](Self::poll_compile) or
    /// [`wait_compile`](Self::wait_compile).
    pub fn save(
        &mut self,
        path: impl AsRef<Path>,
        version: AssetVersion,
        features: Features,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<SaveStatus> {
        self.check_alive()?;
        if self.job.is_some() {
            warn!("sprite compile already running; save ignored");
            return Ok(SaveStatus::NotStarted);
        }
        version.validate()?;
        let features = Features::resolve(&version, features);
        let target = path.as_ref().to_path_buf();

        if !self.changed && version == self.version && features == self.features {
            if let Some(current) = self.path.clone() {
                if !same_file(&current, &target) {
                    fs::copy(&current, &target)?;
                    self.rebind(Compiled { path: target.clone(), version, features })?;
                }
                info!(path = %target.display(), "sprite archive unchanged; copied");
                return Ok(SaveStatus::Copied);
            }
        }

        let limit = max_count(features.extended());
        if self.count > limit {
            return Err(Error::CapacityExceeded {
                what: "sprite count",
                limit: u64::from(limit),
            });
        }

        let cancel = CancelToken::new();
        let input = CompileInput {
            target,
            version,
            features,
            source: self.source.clone(),
            source_transparent: self.features.transparency(),
            overlay: self.overlay.clone(),
            count: self.count,
        };
        let worker_cancel = cancel.clone();
        let job = CompileJob::spawn("sprite-compile", cancel, move || {
            let mut progress = Progress::new(
                ArchiveKind::Sprites,
                progress,
                worker_cancel,
                u64::from(input.count),
            );
            compile(input, &mut progress)
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
                let path = compiled.path.clone();
                self.rebind(compiled)?;
                Ok(CompileOutcome::Compiled(path))
            }
            None => {
                info!("sprite compile cancelled");
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

    /// Cancel any compile and release the backing file.
    pub fn dispose(&mut self) {
        if let Some(job) = self.job.take() {
            job.cancel();
            if let Err(err) = job.join() {
                warn!(%err, "sprite compile failed during dispose");
            }
        }
        self.source = None;
        self.overlay.clear();
        self.count = 0;
        self.disposed = true;
        debug!("sprite store disposed");
    }

    fn rebind(&mut self, compiled: Compiled) -> Result<()> {
        let reader = AddressedReader::open(
            &compiled.path,
            compiled.version.spr_signature(),
            compiled.features.extended(),
        )?;
        self.count = reader.count();
        self.source = Some(Arc::new(reader));
        self.overlay.clear();
        self.path = Some(compiled.path);
        self.version = compiled.version;
        self.features = compiled.features;
        self.changed = false;
        Ok(())
    }

    fn publish(&mut self, batch: ChangeBatch<Sprite>) -> ChangeBatch<Sprite> {
        self.changed = true;
        if let Some(sink) = &self.sink {
            sink.changed(&batch);
        }
        batch
    }

    fn check_id(&self, id: u32) -> Result<()> {
        if id == 0 || id > self.count {
            return Err(Error::IndexOutOfRange { id, count: self.count });
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
            return Err(Error::NotReady("sprite compile in progress"));
        }
        Ok(())
    }
}

impl Drop for SpriteStore {
    fn drop(&mut self) {
        if let Some(job) = &self.job {
            job.cancel();
        }
    }
}

/// Payload for one record of the new archive, or `None` for an empty slot.
fn encode_record(input: &CompileInput, id: u32) -> Result<Option<Vec<u8>>> {
    let transparent = input.features.transparency();
    if let Some(sprite) = input.overlay.get(&id) {
        if sprite.is_empty() {
            return Ok(None);
        }
        return Ok(Some(sprite.encoded_for(transparent)?.into_owned()));
    }

    let Some(source) = input.source.as_ref().filter(|s| id <= s.count()) else {
        return Ok(None);
    };
    match source.read_record(id)? {
        None => Ok(None),
        Some(bytes) if input.source_transparent == transparent => Ok(Some(bytes)),
        Some(bytes) => {
            let sprite = Sprite::from_compressed(id, input.source_transparent, bytes);
            Ok(Some(sprite.encoded_for(transparent)?.into_owned()))
        }
    }
}

/// Worker body: write every record into a temp file, then swap it in.
fn compile(input: CompileInput, progress: &mut Progress) -> Result<Option<Compiled>> {
    if progress.start() {
        return Ok(None);
    }

    let mut temp = temp_file_for(&input.target)?;
    {
        let mut writer = AddressedWriter::new(
            temp.as_file_mut(),
            input.version.spr_signature(),
            input.count,
            input.features.extended(),
        )?;

        let ids: Vec<u32> = (1..=input.count).collect();
        for chunk in ids.chunks(CHECKPOINT_INTERVAL) {
            let payloads = chunk
                .par_iter()
                .map(|&id| encode_record(&input, id))
                .collect::<Result<Vec<_>>>()?;
            for payload in &payloads {
                writer.write_record(payload.as_deref())?;
            }
            if progress.advance(chunk.len()) {
                debug!(written = writer.written(), "sprite compile cancelled at checkpoint");
                return Ok(None);
            }
        }
        writer.finish()?;
    }

    persist(temp, &input.target)?;
    progress.finish();
    info!(path = %input.target.display(), count = input.count, "compiled sprite archive");
    Ok(Some(Compiled {
        path: input.target,
        version: input.version,
        features: input.features,
    }))
}
