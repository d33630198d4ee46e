//! Whole-database relocation: move a database's files to another provider.
//!
//! The source quiesces the backend (`sync`), asks it for a fileset, and
//! hands that to the configured [`FileMover`]. The mover is responsible for
//! getting the files to the destination root and for driving the
//! destination provider's two callbacks: *validate* before anything moves
//! (a negative status aborts the whole relocation) and *install* once the
//! files are in place (the destination attaches them under a fresh id).
//!
//! [`LocalMover`] implements the seam for same-host moves: plain file
//! copies plus the two callbacks as RPCs over the fabric.

use crate::provider::Provider;
use keyfab_core::{
    BackendKind, DatabaseConfig, DatabaseId, Error, Result, Status,
};
use keyfab_fabric::{Fabric, Request, Response};
use keyfab_storage::{
    Fileset, META_COMPARATOR, META_DATA_FILE, META_DB_NAME, META_DB_TYPE, META_NO_OVERWRITE,
};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Destination rejection: a required metadata key is missing.
pub const REJECT_METADATA: i32 = -101;
/// Destination rejection: the database name is already attached.
pub const REJECT_NAME_TAKEN: i32 = -102;
/// Destination rejection: the backend kind is not a persistent one.
pub const REJECT_NOT_PERSISTENT: i32 = -103;
/// Destination rejection: the named comparator is not registered.
pub const REJECT_COMPARATOR: i32 = -104;
/// Destination-side attach failed after the files moved.
pub const REJECT_INSTALL: i32 = -106;

/// Moves a fileset to a destination provider's root.
///
/// Implementations run the destination's validate callback before moving
/// bytes and its install callback after; both failures surface as
/// `FileMove` with the destination's status.
pub trait FileMover: Send + Sync {
    /// Move `fileset` under `dest_root` on `(dest_addr, dest_provider)`.
    ///
    /// Returns the fresh id the destination attached the database under.
    /// With `remove_src` the source files are deleted after a successful
    /// install.
    fn move_fileset(
        &self,
        fileset: &Fileset,
        dest_addr: &str,
        dest_provider: u16,
        dest_root: &Path,
        remove_src: bool,
    ) -> Result<DatabaseId>;
}

/// Same-host file mover: copies files and drives the destination callbacks
/// over the fabric.
pub struct LocalMover {
    fabric: Fabric,
}

impl LocalMover {
    /// A mover using `fabric` for the destination callbacks.
    pub fn new(fabric: Fabric) -> Self {
        LocalMover { fabric }
    }
}

impl FileMover for LocalMover {
    fn move_fileset(
        &self,
        fileset: &Fileset,
        dest_addr: &str,
        dest_provider: u16,
        dest_root: &Path,
        remove_src: bool,
    ) -> Result<DatabaseId> {
        // Destination vets the fileset before any byte moves.
        let response = self.fabric.call(
            dest_addr,
            dest_provider,
            &Request::RelocationValidate {
                metadata: fileset.metadata.clone(),
                root: dest_root.to_path_buf(),
            },
        )?;
        match response {
            Response::Validate { status } if status == 0 => {}
            Response::Validate { status } => {
                warn!(status, "destination rejected fileset");
                return Err(Error::FileMove { status });
            }
            other => {
                return Err(Error::Fabric(format!(
                    "unexpected validate response: {:?}",
                    other
                )))
            }
        }

        std::fs::create_dir_all(dest_root)?;
        for file in &fileset.files {
            let from = fileset.absolute(file);
            let to = dest_root.join(file);
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&from, &to)?;
        }

        let response = self.fabric.call(
            dest_addr,
            dest_provider,
            &Request::RelocationInstall {
                metadata: fileset.metadata.clone(),
                root: dest_root.to_path_buf(),
            },
        )?;
        let db = match response {
            Response::Install { status, db } if status.is_success() => db,
            Response::Install { status, .. } => {
                warn!(%status, "destination failed to attach moved database");
                return Err(Error::FileMove {
                    status: REJECT_INSTALL,
                });
            }
            other => {
                return Err(Error::Fabric(format!(
                    "unexpected install response: {:?}",
                    other
                )))
            }
        };

        if remove_src {
            for file in &fileset.files {
                std::fs::remove_file(fileset.absolute(file))?;
            }
        }
        Ok(db)
    }
}

fn parse_kind(metadata: &BTreeMap<String, String>) -> Option<BackendKind> {
    metadata.get(META_DB_TYPE)?.parse().ok()
}

/// Rebuild the attach configuration a moved fileset describes.
fn config_from_metadata(
    metadata: &BTreeMap<String, String>,
    root: &Path,
) -> Result<DatabaseConfig> {
    let name = metadata
        .get(META_DB_NAME)
        .ok_or_else(|| Error::InvalidArg(format!("metadata missing {}", META_DB_NAME)))?;
    let kind = parse_kind(metadata)
        .ok_or_else(|| Error::InvalidArg(format!("metadata missing {}", META_DB_TYPE)))?;
    let path = match kind {
        // A btree store is a single file under the root.
        BackendKind::BtreeStore => {
            let file = metadata
                .get(META_DATA_FILE)
                .ok_or_else(|| Error::InvalidArg(format!("metadata missing {}", META_DATA_FILE)))?;
            root.join(file)
        }
        _ => root.to_path_buf(),
    };
    let comparator = metadata
        .get(META_COMPARATOR)
        .filter(|name| !name.is_empty())
        .cloned();
    Ok(DatabaseConfig {
        name: name.clone(),
        path,
        kind,
        comparator,
        no_overwrite: metadata.contains_key(META_NO_OVERWRITE),
    })
}

impl Provider {
    pub(crate) fn op_migrate_database(
        &self,
        source_db: DatabaseId,
        dest_addr: &str,
        dest_provider: u16,
        dest_root: &Path,
        remove_src: bool,
    ) -> Result<()> {
        // Quiesce and describe under the read lock, then release it: the
        // mover below may need the write side indirectly, and a remove at
        // the end certainly does.
        let fileset = {
            let registry = self.registry.read();
            let backend = registry.get(source_db)?;
            backend.sync()?;
            backend.create_fileset()?.ok_or(Error::OpNotImpl)?
        };

        let mover = self.mover.read().clone().ok_or(Error::OpNotImpl)?;
        info!(
            %source_db,
            dest = dest_addr,
            root = %dest_root.display(),
            "relocating database fileset"
        );
        let new_id =
            mover.move_fileset(&fileset, dest_addr, dest_provider, dest_root, remove_src)?;
        info!(%source_db, %new_id, "fileset installed on destination");

        if remove_src {
            self.remove_database(source_db)?;
        }
        Ok(())
    }

    pub(crate) fn op_relocation_validate(
        &self,
        metadata: &BTreeMap<String, String>,
        _root: &Path,
    ) -> Response {
        for required in [META_DB_TYPE, META_DB_NAME, META_COMPARATOR] {
            if !metadata.contains_key(required) {
                return Response::Validate {
                    status: REJECT_METADATA,
                };
            }
        }
        let name = &metadata[META_DB_NAME];
        if self.registry.read().contains_name(name) {
            return Response::Validate {
                status: REJECT_NAME_TAKEN,
            };
        }
        match parse_kind(metadata) {
            Some(kind) if kind.is_persistent() => {}
            _ => {
                return Response::Validate {
                    status: REJECT_NOT_PERSISTENT,
                }
            }
        }
        let comparator = &metadata[META_COMPARATOR];
        if !comparator.is_empty() && !self.comparators().contains(comparator) {
            return Response::Validate {
                status: REJECT_COMPARATOR,
            };
        }
        Response::Validate { status: 0 }
    }

    pub(crate) fn op_relocation_install(
        &self,
        metadata: &BTreeMap<String, String>,
        root: &Path,
    ) -> Response {
        let config = match config_from_metadata(metadata, root) {
            Ok(config) => config,
            Err(e) => {
                return Response::Install {
                    status: e.status(),
                    db: DatabaseId::INVALID,
                }
            }
        };
        match self.attach_database(&config) {
            Ok(db) => Response::Install {
                status: Status::Success,
                db,
            },
            Err(e) => {
                warn!(error = %e, "install of moved database failed");
                Response::Install {
                    status: e.status(),
                    db: DatabaseId::INVALID,
                }
            }
        }
    }

    pub(crate) fn op_database_size(&self, db: DatabaseId) -> Response {
        let result = self.with_db(db, |backend| {
            backend.sync()?;
            let fileset = backend.create_fileset()?.ok_or(Error::OpNotImpl)?;
            fileset.total_size()
        });
        match result {
            Ok(size) => Response::DbSize {
                status: Status::Success,
                size,
            },
            Err(e) => Response::DbSize {
                status: e.status(),
                size: 0,
            },
        }
    }
}
