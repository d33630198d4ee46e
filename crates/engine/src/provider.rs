//! The provider: one logical server instance on a fabric endpoint.
//!
//! # Lock discipline
//!
//! One reader/writer lock guards the database registry and everything
//! routed through it. Data-plane handlers (including migration) hold the
//! read side for their whole run, bulk transfers and outbound forwards
//! included; `attach`, `remove` and `remove_all` take the write side. A
//! remove therefore waits for every in-flight operation on the id it
//! drops, which is what keeps resolved backends valid until their
//! operation completes.

use crate::registry::DatabaseRegistry;
use crate::relocation::FileMover;
use keyfab_core::{
    DatabaseConfig, DatabaseId, Error, ProviderConfig, ProviderId, Result, Status,
};
use keyfab_fabric::{Fabric, Request, Response};
use keyfab_storage::{open_backend, Backend, CompareFn, ComparatorRegistry};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A keyfab provider.
///
/// Created through [`Provider::register`], which installs the dispatch
/// closure on the fabric; the returned `Arc` is the host's administrative
/// handle (attach/remove databases, register comparators, set the file
/// mover).
pub struct Provider {
    addr: String,
    provider_id: ProviderId,
    config: ProviderConfig,
    fabric: Fabric,
    comparators: ComparatorRegistry,
    pub(crate) registry: RwLock<DatabaseRegistry>,
    next_db_id: AtomicU64,
    pub(crate) mover: RwLock<Option<Arc<dyn FileMover>>>,
}

impl Provider {
    /// Create a provider and install its handler on `addr` under
    /// `provider_id`.
    ///
    /// The endpoint must already be registered on the fabric.
    pub fn register(
        fabric: &Fabric,
        addr: impl Into<String>,
        provider_id: ProviderId,
        config: ProviderConfig,
    ) -> Result<Arc<Provider>> {
        let addr = addr.into();
        fabric.lookup(&addr)?;
        let provider = Arc::new(Provider {
            addr: addr.clone(),
            provider_id,
            config,
            fabric: fabric.clone(),
            comparators: ComparatorRegistry::new(),
            registry: RwLock::new(DatabaseRegistry::new()),
            next_db_id: AtomicU64::new(1),
            mover: RwLock::new(None),
        });
        let dispatch_target = provider.clone();
        fabric.register_provider(
            &addr,
            provider_id.get(),
            Arc::new(move |request| dispatch_target.dispatch(request)),
        )?;
        info!(%addr, provider = %provider_id, "provider registered");
        Ok(provider)
    }

    /// Endpoint address this provider serves on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Provider id on that endpoint.
    pub fn provider_id(&self) -> ProviderId {
        self.provider_id
    }

    /// Runtime configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub(crate) fn fabric(&self) -> &Fabric {
        &self.fabric
    }

    pub(crate) fn comparators(&self) -> &ComparatorRegistry {
        &self.comparators
    }

    /// Register a named comparator.
    ///
    /// Must happen before attaching a database that names it; duplicate
    /// names fail with `CompFunc`.
    pub fn register_comparator(&self, name: impl Into<String>, func: CompareFn) -> Result<()> {
        self.comparators.register(name, func)
    }

    /// Install the file mover whole-database relocation hands filesets to.
    pub fn set_relocation_mover(&self, mover: Arc<dyn FileMover>) {
        *self.mover.write() = Some(mover);
    }

    /// Open (or create) the configured database and register it.
    ///
    /// Fails with `DbName` when the name is taken, `CompFunc` when the
    /// named comparator is unknown, and `DbCreate` when the backend cannot
    /// open.
    pub fn attach_database(&self, config: &DatabaseConfig) -> Result<DatabaseId> {
        let comparator = self.comparators.resolve(config.comparator.as_deref())?;
        let mut registry = self.registry.write();
        if registry.contains_name(&config.name) {
            return Err(Error::DbName(config.name.clone()));
        }
        let backend = open_backend(config, comparator)?;
        let id = DatabaseId::from_raw(self.next_db_id.fetch_add(1, Ordering::SeqCst));
        registry.insert(id, backend);
        info!(name = %config.name, %id, kind = %config.kind, "database attached");
        Ok(id)
    }

    /// Detach `id` and close its backend. Persistent files stay on disk.
    pub fn remove_database(&self, id: DatabaseId) -> Result<()> {
        let backend = self.registry.write().remove(id)?;
        info!(%id, name = backend.name(), "database removed");
        // Last Arc dropped here (in-flight readers hold clones) closes the
        // backend.
        drop(backend);
        Ok(())
    }

    /// Detach every database.
    pub fn remove_all_databases(&self) {
        let backends = self.registry.write().remove_all();
        info!(count = backends.len(), "all databases removed");
        drop(backends);
    }

    /// Number of attached databases.
    pub fn database_count(&self) -> usize {
        self.registry.read().count()
    }

    /// `(name, id)` rows in attach order.
    pub fn list_databases(&self) -> Vec<keyfab_fabric::DbEntry> {
        self.registry.read().entries()
    }

    /// Run `f` against the backend of `db` while holding the provider
    /// read lock.
    pub(crate) fn with_db<T>(
        &self,
        db: DatabaseId,
        f: impl FnOnce(&dyn Backend) -> Result<T>,
    ) -> Result<T> {
        let registry = self.registry.read();
        let backend = registry.get(db)?;
        f(backend.as_ref())
    }

    /// Route one request to its handler.
    pub(crate) fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::Open { name } => self.op_open(&name),
            Request::CountDatabases => self.op_count_databases(),
            Request::ListDatabases { max } => self.op_list_databases(max),

            Request::Put { db, key, value } => status_only(self.op_put(db, &key, &value)),
            Request::Get { db, key, vsize } => self.op_get(db, &key, vsize),
            Request::Length { db, key } => self.op_length(db, &key),
            Request::Exists { db, key } => self.op_exists(db, &key),
            Request::Erase { db, key } => status_only(self.op_erase(db, &key)),
            Request::BulkPut {
                db,
                key,
                value_bulk,
                vsize,
            } => status_only(self.op_bulk_put(db, &key, &value_bulk, vsize)),
            Request::BulkGet {
                db,
                key,
                value_bulk,
                capacity,
            } => self.op_bulk_get(db, &key, &value_bulk, capacity),

            Request::PutMulti {
                db,
                count,
                keys_bulk,
                vals_bulk,
            } => status_only(self.op_put_multi(db, count, &keys_bulk, &vals_bulk)),
            Request::GetMulti {
                db,
                count,
                keys_bulk,
                vals_bulk,
            } => status_only(self.op_get_multi(db, count, &keys_bulk, &vals_bulk)),
            Request::LengthMulti {
                db,
                count,
                keys_bulk,
                sizes_bulk,
            } => status_only(self.op_length_multi(db, count, &keys_bulk, &sizes_bulk)),
            Request::ExistsMulti {
                db,
                count,
                keys_bulk,
                flags_bulk,
            } => status_only(self.op_exists_multi(db, count, &keys_bulk, &flags_bulk)),
            Request::EraseMulti {
                db,
                count,
                keys_bulk,
            } => status_only(self.op_erase_multi(db, count, &keys_bulk)),

            Request::PutPacked {
                db,
                count,
                bulk,
                origin,
            } => status_only(self.op_put_packed(db, count, &bulk, origin.as_deref())),
            Request::GetPacked {
                db,
                count,
                keys_bulk,
                vals_bulk,
            } => self.op_get_packed(db, count, &keys_bulk, &vals_bulk),
            Request::LengthPacked { db, count, bulk } => {
                status_only(self.op_length_packed(db, count, &bulk))
            }

            Request::ListKeys {
                db,
                start,
                prefix,
                max,
                ksizes_bulk,
                keys_bulk,
            } => self.op_list_keys(db, &start, &prefix, max, &ksizes_bulk, &keys_bulk),
            Request::ListKeyvals {
                db,
                start,
                prefix,
                max,
                ksizes_bulk,
                keys_bulk,
                vsizes_bulk,
                vals_bulk,
            } => self.op_list_keyvals(
                db,
                &start,
                &prefix,
                max,
                &ksizes_bulk,
                &keys_bulk,
                &vsizes_bulk,
                &vals_bulk,
            ),

            Request::MigrateKeys {
                source_db,
                target_addr,
                target_provider,
                target_db,
                count,
                keys_bulk,
                flag,
            } => status_only(self.op_migrate_keys(
                source_db,
                &target_addr,
                target_provider,
                target_db,
                count,
                &keys_bulk,
                flag,
            )),
            Request::MigrateKeyRange {
                source_db,
                target_addr,
                target_provider,
                target_db,
                lower,
                upper,
                flag,
            } => status_only(self.op_migrate_key_range(
                source_db,
                &target_addr,
                target_provider,
                target_db,
                &lower,
                &upper,
                flag,
            )),
            Request::MigrateKeysPrefixed {
                source_db,
                target_addr,
                target_provider,
                target_db,
                prefix,
                flag,
            } => status_only(self.op_migrate_keys_prefixed(
                source_db,
                &target_addr,
                target_provider,
                target_db,
                &prefix,
                flag,
            )),
            Request::MigrateAllKeys {
                source_db,
                target_addr,
                target_provider,
                target_db,
                flag,
            } => status_only(self.op_migrate_all_keys(
                source_db,
                &target_addr,
                target_provider,
                target_db,
                flag,
            )),

            Request::MigrateDatabase {
                source_db,
                dest_addr,
                dest_provider,
                dest_root,
                remove_src,
            } => status_only(self.op_migrate_database(
                source_db,
                &dest_addr,
                dest_provider,
                &dest_root,
                remove_src,
            )),
            Request::RelocationValidate { metadata, root } => {
                self.op_relocation_validate(&metadata, &root)
            }
            Request::RelocationInstall { metadata, root } => {
                self.op_relocation_install(&metadata, &root)
            }
            Request::DatabaseSize { db } => self.op_database_size(db),

            // The fabric intercepts shutdown before dispatch; seeing it
            // here means an unauthorized path.
            Request::Shutdown => Response::Status(Status::InvalidArg),
        }
    }

    fn op_open(&self, name: &str) -> Response {
        let registry = self.registry.read();
        match registry.id_by_name(name) {
            Ok(db) => Response::Open {
                status: Status::Success,
                db,
            },
            Err(e) => {
                debug!(name, "open failed");
                Response::Open {
                    status: e.status(),
                    db: DatabaseId::INVALID,
                }
            }
        }
    }

    fn op_count_databases(&self) -> Response {
        Response::Count {
            status: Status::Success,
            count: self.database_count() as u64,
        }
    }

    fn op_list_databases(&self, max: u64) -> Response {
        let mut entries = self.registry.read().entries();
        entries.truncate(max as usize);
        Response::DbList {
            status: Status::Success,
            entries,
        }
    }
}

/// Collapse a status-only handler result into a response, logging the
/// failure it swallows.
pub(crate) fn status_only(result: Result<()>) -> Response {
    match result {
        Ok(()) => Response::Status(Status::Success),
        Err(e) => {
            warn!(error = %e, "handler failed");
            Response::Status(e.status())
        }
    }
}
