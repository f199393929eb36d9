//! Template storage.
//!
//! Templates are reference images labelled with a pose and a
//! characteristic. Stores keep the encoded image bytes; decoding into
//! [`FeatureImage`]s happens when a [`TemplateLibrary`] is loaded.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classifier::{FeatureImage, TrainingSet};
use crate::{Characteristic, PoseLabel};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Hex SHA-256 of stored template bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn check_template(pose: PoseLabel, name: &str, bytes: &[u8]) -> Result<()> {
    if !pose.is_trainable() {
        bail!("templates cannot be labelled {}", pose);
    }
    if name.trim().is_empty() || name.contains(['/', '\\']) {
        bail!("invalid template image name '{}'", name);
    }
    FeatureImage::decode(bytes).with_context(|| format!("template '{}' is not a readable image", name))?;
    Ok(())
}

// -------------------- Records --------------------

/// Metadata of one stored template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TemplateRecord {
    pub id: i64,
    pub pose: PoseLabel,
    pub characteristic: Characteristic,
    pub image_name: String,
    pub content_hash: String,
}

/// Decoded templates, one training set per characteristic.
#[derive(Clone, Debug, Default)]
pub struct TemplateLibrary {
    edge: TrainingSet,
    foreground: TrainingSet,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, characteristic: Characteristic, pose: PoseLabel, image: FeatureImage) {
        self.training_set_mut(characteristic).insert(pose, image);
    }

    pub fn training_set(&self, characteristic: Characteristic) -> &TrainingSet {
        match characteristic {
            Characteristic::Edge => &self.edge,
            Characteristic::Foreground => &self.foreground,
        }
    }

    fn training_set_mut(&mut self, characteristic: Characteristic) -> &mut TrainingSet {
        match characteristic {
            Characteristic::Edge => &mut self.edge,
            Characteristic::Foreground => &mut self.foreground,
        }
    }

    /// Move the training sets out, edge first.
    pub fn into_training_sets(self) -> (TrainingSet, TrainingSet) {
        (self.edge, self.foreground)
    }

    pub fn len(&self) -> usize {
        self.edge.len() + self.foreground.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// -------------------- Store Trait --------------------

pub trait TemplateStore {
    /// Store encoded image bytes under a pose and characteristic.
    fn save_template(
        &mut self,
        pose: PoseLabel,
        characteristic: Characteristic,
        name: &str,
        bytes: &[u8],
    ) -> Result<TemplateRecord>;

    /// Remove one template. Returns false when the id is unknown.
    fn delete_template(&mut self, id: i64) -> Result<bool>;

    /// Encoded bytes of one template.
    fn template_image(&self, id: i64) -> Result<Option<Vec<u8>>>;

    /// Every template, ordered by id.
    fn list_templates(&self) -> Result<Vec<TemplateRecord>>;

    /// Remove every template. Returns how many were removed.
    fn clear(&mut self) -> Result<usize>;

    /// Decode every template into training sets. Templates that fail to
    /// decode are skipped with a warning.
    fn load_templates(&self) -> Result<TemplateLibrary> {
        let mut library = TemplateLibrary::new();
        for record in self.list_templates()? {
            let Some(bytes) = self.template_image(record.id)? else {
                continue;
            };
            match FeatureImage::decode(&bytes) {
                Ok(image) => library.insert(record.characteristic, record.pose, image),
                Err(e) => log::warn!(
                    "skipping template {} ({}): {:#}",
                    record.id,
                    record.image_name,
                    e
                ),
            }
        }
        log::info!("loaded {} templates", library.len());
        Ok(library)
    }
}

impl<S: TemplateStore + ?Sized> TemplateStore for Box<S> {
    fn save_template(
        &mut self,
        pose: PoseLabel,
        characteristic: Characteristic,
        name: &str,
        bytes: &[u8],
    ) -> Result<TemplateRecord> {
        (**self).save_template(pose, characteristic, name, bytes)
    }

    fn delete_template(&mut self, id: i64) -> Result<bool> {
        (**self).delete_template(id)
    }

    fn template_image(&self, id: i64) -> Result<Option<Vec<u8>>> {
        (**self).template_image(id)
    }

    fn list_templates(&self) -> Result<Vec<TemplateRecord>> {
        (**self).list_templates()
    }

    fn clear(&mut self) -> Result<usize> {
        (**self).clear()
    }

    fn load_templates(&self) -> Result<TemplateLibrary> {
        (**self).load_templates()
    }
}

// -------------------- Store Selection --------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Sqlite,
    Filesystem,
    Memory,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreKind::Sqlite => "sqlite",
            StoreKind::Filesystem => "filesystem",
            StoreKind::Memory => "memory",
        })
    }
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreKind::Sqlite),
            "filesystem" | "fs" => Ok(StoreKind::Filesystem),
            "memory" => Ok(StoreKind::Memory),
            other => Err(anyhow!("unknown template store '{}'", other)),
        }
    }
}

/// Open the configured store. `location` is the database file for SQLite
/// and the root directory for the filesystem store; memory ignores it.
pub fn open_store(kind: StoreKind, location: &Path) -> Result<Box<dyn TemplateStore>> {
    match kind {
        StoreKind::Sqlite => Ok(Box::new(SqliteTemplateStore::open(location)?)),
        StoreKind::Filesystem => Ok(Box::new(FilesystemTemplateStore::open(location)?)),
        StoreKind::Memory => Ok(Box::new(InMemoryTemplateStore::new())),
    }
}

// -------------------- SQLite --------------------

pub struct SqliteTemplateStore {
    conn: Connection,
}

impl SqliteTemplateStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open template database {}", db_path.display()))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS template (
              template_id INTEGER PRIMARY KEY AUTOINCREMENT,
              template_type TEXT NOT NULL,
              template_characteristic TEXT NOT NULL,
              image_name TEXT NOT NULL,
              content_hash TEXT NOT NULL,
              image BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_template_hash ON template(content_hash);
            "#,
        )?;
        Ok(())
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

impl TemplateStore for SqliteTemplateStore {
    fn save_template(
        &mut self,
        pose: PoseLabel,
        characteristic: Characteristic,
        name: &str,
        bytes: &[u8],
    ) -> Result<TemplateRecord> {
        check_template(pose, name, bytes)?;
        let hash = content_hash(bytes);
        self.conn.execute(
            r#"
            INSERT INTO template(template_type, template_characteristic, image_name, content_hash, image)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![pose.as_str(), characteristic.as_str(), name, hash, bytes],
        )?;
        Ok(TemplateRecord {
            id: self.conn.last_insert_rowid(),
            pose,
            characteristic,
            image_name: name.to_string(),
            content_hash: hash,
        })
    }

    fn delete_template(&mut self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM template WHERE template_id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn template_image(&self, id: i64) -> Result<Option<Vec<u8>>> {
        let bytes = self
            .conn
            .query_row(
                "SELECT image FROM template WHERE template_id = ?1",
                params![id],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(bytes)
    }

    fn list_templates(&self) -> Result<Vec<TemplateRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT template_id, template_type, template_characteristic, image_name, content_hash
            FROM template ORDER BY template_id ASC
            "#,
        )?;
        let rows = stmt.query_map([], record_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            let (id, pose, characteristic, image_name, content_hash) = row?;
            out.push(TemplateRecord {
                id,
                pose: pose
                    .parse()
                    .with_context(|| format!("corrupt template {}: pose", id))?,
                characteristic: characteristic
                    .parse()
                    .with_context(|| format!("corrupt template {}: characteristic", id))?,
                image_name,
                content_hash,
            });
        }
        Ok(out)
    }

    fn clear(&mut self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM template", [])?)
    }
}

// -------------------- Filesystem --------------------

/// Templates kept as image files under
/// `{root}/{characteristic}/{pose}/{name}`.
///
/// Ids are positions in the sorted listing (starting at 1), so they shift
/// when templates are added or removed.
pub struct FilesystemTemplateStore {
    root: PathBuf,
}

impl FilesystemTemplateStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create template directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Template files in id order, without reading them.
    fn paths(&self) -> Result<Vec<(Characteristic, PoseLabel, PathBuf)>> {
        let mut found = Vec::new();
        for characteristic in Characteristic::ALL {
            for pose in PoseLabel::TRAINABLE {
                let dir = self.root.join(characteristic.as_str()).join(pose.as_str());
                if !dir.is_dir() {
                    continue;
                }
                for entry in std::fs::read_dir(&dir)
                    .with_context(|| format!("failed to read {}", dir.display()))?
                {
                    let path = entry?.path();
                    if path.is_file() && is_image_file(&path) {
                        found.push((characteristic, pose, path));
                    }
                }
            }
        }
        found.sort_by(|a, b| a.2.cmp(&b.2));
        Ok(found)
    }

    fn record_for(
        id: usize,
        characteristic: Characteristic,
        pose: PoseLabel,
        path: &Path,
        bytes: &[u8],
    ) -> TemplateRecord {
        TemplateRecord {
            id: id as i64 + 1,
            pose,
            characteristic,
            image_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            content_hash: content_hash(bytes),
        }
    }

    fn path_of(&self, id: i64) -> Result<Option<PathBuf>> {
        let Ok(index) = usize::try_from(id - 1) else {
            return Ok(None);
        };
        Ok(self.paths()?.into_iter().nth(index).map(|(_, _, path)| path))
    }
}

fn read_template(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read template {}", path.display()))
}

impl TemplateStore for FilesystemTemplateStore {
    fn save_template(
        &mut self,
        pose: PoseLabel,
        characteristic: Characteristic,
        name: &str,
        bytes: &[u8],
    ) -> Result<TemplateRecord> {
        check_template(pose, name, bytes)?;
        let dir = self.root.join(characteristic.as_str()).join(pose.as_str());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(name);
        if path.exists() {
            bail!("template {} already exists", path.display());
        }
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write template {}", path.display()))?;

        let index = self
            .paths()?
            .iter()
            .position(|(_, _, stored)| *stored == path)
            .ok_or_else(|| anyhow!("template {} vanished after write", path.display()))?;
        Ok(Self::record_for(index, characteristic, pose, &path, bytes))
    }

    fn delete_template(&mut self, id: i64) -> Result<bool> {
        let Some(path) = self.path_of(id)? else {
            return Ok(false);
        };
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to delete template {}", path.display()))?;
        Ok(true)
    }

    fn template_image(&self, id: i64) -> Result<Option<Vec<u8>>> {
        self.path_of(id)?.map(|path| read_template(&path)).transpose()
    }

    fn list_templates(&self) -> Result<Vec<TemplateRecord>> {
        self.paths()?
            .iter()
            .enumerate()
            .map(|(index, (characteristic, pose, path))| {
                let bytes = read_template(path)?;
                Ok(Self::record_for(index, *characteristic, *pose, path, &bytes))
            })
            .collect()
    }

    fn clear(&mut self) -> Result<usize> {
        let paths = self.paths()?;
        for (_, _, path) in &paths {
            std::fs::remove_file(path)
                .with_context(|| format!("failed to delete template {}", path.display()))?;
        }
        Ok(paths.len())
    }

    /// One pass over the tree: each file is read and decoded once.
    fn load_templates(&self) -> Result<TemplateLibrary> {
        let mut library = TemplateLibrary::new();
        for (characteristic, pose, path) in self.paths()? {
            let bytes = read_template(&path)?;
            match FeatureImage::decode(&bytes) {
                Ok(image) => library.insert(characteristic, pose, image),
                Err(e) => log::warn!("skipping template {}: {:#}", path.display(), e),
            }
        }
        log::info!("loaded {} templates from {}", library.len(), self.root.display());
        Ok(library)
    }
}

// -------------------- In-Memory --------------------

#[derive(Clone, Debug, Default)]
pub struct InMemoryTemplateStore {
    templates: Vec<(TemplateRecord, Vec<u8>)>,
    next_id: i64,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateStore for InMemoryTemplateStore {
    fn save_template(
        &mut self,
        pose: PoseLabel,
        characteristic: Characteristic,
        name: &str,
        bytes: &[u8],
    ) -> Result<TemplateRecord> {
        check_template(pose, name, bytes)?;
        self.next_id += 1;
        let record = TemplateRecord {
            id: self.next_id,
            pose,
            characteristic,
            image_name: name.to_string(),
            content_hash: content_hash(bytes),
        };
        self.templates.push((record.clone(), bytes.to_vec()));
        Ok(record)
    }

    fn delete_template(&mut self, id: i64) -> Result<bool> {
        let before = self.templates.len();
        self.templates.retain(|(record, _)| record.id != id);
        Ok(self.templates.len() < before)
    }

    fn template_image(&self, id: i64) -> Result<Option<Vec<u8>>> {
        Ok(self
            .templates
            .iter()
            .find(|(record, _)| record.id == id)
            .map(|(_, bytes)| bytes.clone()))
    }

    fn list_templates(&self) -> Result<Vec<TemplateRecord>> {
        Ok(self.templates.iter().map(|(record, _)| record.clone()).collect())
    }

    fn clear(&mut self) -> Result<usize> {
        let removed = self.templates.len();
        self.templates.clear();
        Ok(removed)
    }
}

// -------------------- Import --------------------

/// Outcome of a bulk import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Upload every image under `{root}/{characteristic}/{pose}/` into `store`.
///
/// Files whose content hash is already stored are skipped, as are files the
/// store rejects. Directories that do not name a characteristic or a
/// trainable pose are ignored.
pub fn import_local_templates(store: &mut dyn TemplateStore, root: &Path) -> Result<ImportReport> {
    if !root.is_dir() {
        bail!("template directory {} does not exist", root.display());
    }
    let mut known: HashSet<String> = store
        .list_templates()?
        .into_iter()
        .map(|record| record.content_hash)
        .collect();
    let mut report = ImportReport::default();

    for characteristic in Characteristic::ALL {
        for pose in PoseLabel::TRAINABLE {
            let dir = root.join(characteristic.as_str()).join(pose.as_str());
            if !dir.is_dir() {
                continue;
            }
            let mut files = Vec::new();
            for entry in std::fs::read_dir(&dir)
                .with_context(|| format!("failed to read {}", dir.display()))?
            {
                let path = entry?.path();
                if path.is_file() && is_image_file(&path) {
                    files.push(path);
                }
            }
            files.sort();

            for path in files {
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                if !known.insert(content_hash(&bytes)) {
                    report.duplicates += 1;
                    continue;
                }
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match store.save_template(pose, characteristic, &name, &bytes) {
                    Ok(_) => report.imported += 1,
                    Err(e) => {
                        log::warn!("skipping {}: {:#}", path.display(), e);
                        report.rejected += 1;
                    }
                }
            }
        }
    }

    log::info!(
        "template import from {}: {} imported, {} duplicates, {} rejected",
        root.display(),
        report.imported,
        report.duplicates,
        report.rejected
    );
    Ok(report)
}

// -------------------- Capture --------------------

/// Writes classified crops to disk for later manual sorting into templates,
/// as `{root}/{characteristic}/{session}_{frame}.png`.
pub struct TemplateCapture {
    root: PathBuf,
    session: String,
}

impl TemplateCapture {
    pub fn new(root: impl AsRef<Path>, session: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            session: session.into(),
        }
    }

    pub fn capture(
        &self,
        characteristic: Characteristic,
        frame_index: u64,
        image: &FeatureImage,
    ) -> Result<PathBuf> {
        let dir = self.root.join(characteristic.as_str());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create capture directory {}", dir.display()))?;
        let path = dir.join(format!("{}_{}.png", self.session, frame_index));
        std::fs::write(&path, image.encode_png()?)
            .with_context(|| format!("failed to write capture {}", path.display()))?;
        Ok(path)
    }
}
