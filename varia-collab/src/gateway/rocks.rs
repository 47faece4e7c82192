//! RocksDB-backed project store.
//!
//! Column families:
//! - `projects`  : project JSON, LZ4 compressed, keyed by project id
//! - `workspaces`: workspace id → project id
//! - `members`   : `<workspace>\0<client key>` → bincode [`MembershipRecord`]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Options, SingleThreaded, WriteBatch, WriteOptions,
};
use varia_core::Project;

use super::{GatewayError, MembershipRecord, PersistenceGateway};
use crate::protocol::ClientId;
use crate::session::SessionId;

const CF_PROJECTS: &str = "projects";
const CF_WORKSPACES: &str = "workspaces";
const CF_MEMBERS: &str = "members";

const COLUMN_FAMILIES: &[&str] = &[CF_PROJECTS, CF_WORKSPACES, CF_MEMBERS];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// fsync on every write (default: false)
    pub sync_writes: bool,
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 32MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("varia_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Small caches for tests.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// Storage errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Compression error: {0}")]
    CompressionError(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

pub struct ProjectStore {
    /// Single-threaded column family mode; callers serialize per project.
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl ProjectStore {
    /// Open the store, creating the database and column families if missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        log::info!("Opened project store at {}", config.path.display());
        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_PROJECTS => {
                // Values are already LZ4 framed.
                opts.set_compression_type(DBCompressionType::None);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_WORKSPACES => {
                opts.set_compression_type(DBCompressionType::Lz4);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_MEMBERS => {
                opts.set_compression_type(DBCompressionType::Lz4);
            }
            _ => {}
        }

        opts
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Projects ─────────────────────────────────────────────────────

    pub fn load_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        let cf = self.cf(CF_PROJECTS)?;
        match self.db.get_cf(cf, project_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode_project(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn project_exists(&self, project_id: &str) -> Result<bool, StoreError> {
        let cf = self.cf(CF_PROJECTS)?;
        Ok(self.db.get_cf(cf, project_id.as_bytes())?.is_some())
    }

    pub fn save_project(&self, project_id: &str, project: &Project) -> Result<(), StoreError> {
        let cf = self.cf(CF_PROJECTS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf, project_id.as_bytes(), encode_project(project)?);
        self.write(batch)
    }

    /// Store a project and point the workspace at it, atomically.
    pub fn bind_project(
        &self,
        workspace_id: &str,
        project_id: &str,
        project: &Project,
    ) -> Result<(), StoreError> {
        let cf_projects = self.cf(CF_PROJECTS)?;
        let cf_workspaces = self.cf(CF_WORKSPACES)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_projects, project_id.as_bytes(), encode_project(project)?);
        batch.put_cf(cf_workspaces, workspace_id.as_bytes(), project_id.as_bytes());
        self.write(batch)
    }

    /// Remove the workspace binding and the project it pointed at.
    /// Returns the removed project id.
    pub fn unbind_project(&self, workspace_id: &str) -> Result<Option<String>, StoreError> {
        let Some(project_id) = self.workspace_project_id(workspace_id)? else {
            return Ok(None);
        };
        let cf_projects = self.cf(CF_PROJECTS)?;
        let cf_workspaces = self.cf(CF_WORKSPACES)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(cf_projects, project_id.as_bytes());
        batch.delete_cf(cf_workspaces, workspace_id.as_bytes());
        self.write(batch)?;
        Ok(Some(project_id))
    }

    pub fn workspace_project_id(&self, workspace_id: &str) -> Result<Option<String>, StoreError> {
        let cf = self.cf(CF_WORKSPACES)?;
        self.db
            .get_cf(cf, workspace_id.as_bytes())?
            .map(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| StoreError::DeserializationError(e.to_string()))
            })
            .transpose()
    }

    // ─── Members ──────────────────────────────────────────────────────

    pub fn put_member(
        &self,
        workspace_id: &str,
        client_id: &ClientId,
        record: &MembershipRecord,
    ) -> Result<(), StoreError> {
        let cf = self.cf(CF_MEMBERS)?;
        let value = bincode::serde::encode_to_vec(record, bincode::config::standard())
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db
            .put_cf_opt(cf, member_key(workspace_id, client_id), value, &write_opts)?;
        Ok(())
    }

    pub fn load_member(
        &self,
        workspace_id: &str,
        client_id: &ClientId,
    ) -> Result<Option<MembershipRecord>, StoreError> {
        let cf = self.cf(CF_MEMBERS)?;
        match self.db.get_cf(cf, member_key(workspace_id, client_id))? {
            Some(bytes) => {
                let (record, _) =
                    bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Number of recorded members of a workspace.
    #[cfg(test)]
    fn member_count(&self, workspace_id: &str) -> Result<usize, StoreError> {
        use rocksdb::{Direction, IteratorMode};

        let cf = self.cf(CF_MEMBERS)?;
        let prefix = member_prefix(workspace_id);

        let mut count = 0;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    // ─── Internal ─────────────────────────────────────────────────────

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }
}

#[async_trait]
impl PersistenceGateway for ProjectStore {
    async fn get_project_by_id(&self, project_id: &str) -> Result<Option<Project>, GatewayError> {
        Ok(self.load_project(project_id)?)
    }

    async fn update_project(
        &self,
        project_id: &str,
        project: &Project,
    ) -> Result<(), GatewayError> {
        if !self.project_exists(project_id)? {
            return Err(GatewayError::ProjectNotFound(project_id.to_string()));
        }
        Ok(self.save_project(project_id, project)?)
    }

    async fn check_workspace_user(
        &self,
        workspace_id: &str,
        client_id: &ClientId,
    ) -> Result<bool, GatewayError> {
        Ok(self.load_member(workspace_id, client_id)?.is_some())
    }

    async fn add_workspace_user(
        &self,
        workspace_id: &str,
        client_id: &ClientId,
        session: SessionId,
    ) -> Result<(), GatewayError> {
        Ok(self.put_member(workspace_id, client_id, &MembershipRecord::new(session))?)
    }

    async fn delete_existing_project(&self, workspace_id: &str) -> Result<(), GatewayError> {
        if let Some(project_id) = self.unbind_project(workspace_id)? {
            log::debug!("Deleted project {project_id} of workspace {workspace_id}");
        }
        Ok(())
    }

    async fn insert_project(
        &self,
        project_id: &str,
        project: &Project,
        workspace_id: &str,
    ) -> Result<(), GatewayError> {
        Ok(self.bind_project(workspace_id, project_id, project)?)
    }

    async fn get_project_by_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Option<Project>, GatewayError> {
        match self.workspace_project_id(workspace_id)? {
            Some(project_id) => Ok(self.load_project(&project_id)?),
            None => Ok(None),
        }
    }
}

fn encode_project(project: &Project) -> Result<Vec<u8>, StoreError> {
    let json =
        serde_json::to_vec(project).map_err(|e| StoreError::SerializationError(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&json))
}

fn decode_project(bytes: &[u8]) -> Result<Project, StoreError> {
    let json = lz4_flex::decompress_size_prepended(bytes)
        .map_err(|e| StoreError::CompressionError(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| StoreError::DeserializationError(e.to_string()))
}

fn member_prefix(workspace_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(workspace_id.len() + 1);
    key.extend_from_slice(workspace_id.as_bytes());
    key.push(0);
    key
}

fn member_key(workspace_id: &str, client_id: &ClientId) -> Vec<u8> {
    let mut key = member_prefix(workspace_id);
    key.extend_from_slice(client_id.storage_key().as_bytes());
    key
}

fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
