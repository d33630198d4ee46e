//! Single-operation handlers.
//!
//! All of these resolve the database under the provider read lock and call
//! straight into the backend. `get` honors the caller's buffer capacity:
//! a value that does not fit is reported by size only, never truncated.

use crate::provider::Provider;
use keyfab_core::{DatabaseId, Result, Status};
use keyfab_fabric::{BulkRef, Response};

impl Provider {
    pub(crate) fn op_put(&self, db: DatabaseId, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_db(db, |backend| backend.put(key, value))
    }

    pub(crate) fn op_get(&self, db: DatabaseId, key: &[u8], vsize: u64) -> Response {
        match self.with_db(db, |backend| backend.get(key)) {
            Ok(value) => {
                let needed = value.len() as u64;
                if needed <= vsize {
                    Response::Get {
                        status: Status::Success,
                        vsize: needed,
                        value,
                    }
                } else {
                    Response::Get {
                        status: Status::Size,
                        vsize: needed,
                        value: Vec::new(),
                    }
                }
            }
            Err(e) => Response::Get {
                status: e.status(),
                vsize: 0,
                value: Vec::new(),
            },
        }
    }

    pub(crate) fn op_length(&self, db: DatabaseId, key: &[u8]) -> Response {
        match self.with_db(db, |backend| backend.length(key)) {
            Ok(size) => Response::Length {
                status: Status::Success,
                size,
            },
            Err(e) => Response::Length {
                status: e.status(),
                size: 0,
            },
        }
    }

    pub(crate) fn op_exists(&self, db: DatabaseId, key: &[u8]) -> Response {
        match self.with_db(db, |backend| backend.exists(key)) {
            Ok(exists) => Response::Exists {
                status: Status::Success,
                exists,
            },
            Err(e) => Response::Exists {
                status: e.status(),
                exists: false,
            },
        }
    }

    pub(crate) fn op_erase(&self, db: DatabaseId, key: &[u8]) -> Result<()> {
        self.with_db(db, |backend| backend.erase(key))
    }

    /// Single-key put whose value arrives by bulk pull.
    pub(crate) fn op_bulk_put(
        &self,
        db: DatabaseId,
        key: &[u8],
        value_bulk: &BulkRef,
        vsize: u64,
    ) -> Result<()> {
        let registry = self.registry.read();
        let backend = registry.get(db)?;
        let value = if vsize > 0 {
            self.fabric().bulk_pull(value_bulk, 0, vsize)?
        } else {
            Vec::new()
        };
        backend.put(key, &value)
    }

    /// Single-key get whose value leaves by bulk push.
    pub(crate) fn op_bulk_get(
        &self,
        db: DatabaseId,
        key: &[u8],
        value_bulk: &BulkRef,
        capacity: u64,
    ) -> Response {
        let registry = self.registry.read();
        let backend = match registry.get(db) {
            Ok(backend) => backend,
            Err(e) => {
                return Response::BulkGet {
                    status: e.status(),
                    vsize: 0,
                }
            }
        };
        let value = match backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                return Response::BulkGet {
                    status: e.status(),
                    vsize: 0,
                }
            }
        };
        let needed = value.len() as u64;
        if needed > capacity {
            return Response::BulkGet {
                status: Status::Size,
                vsize: needed,
            };
        }
        if let Err(e) = self.fabric().bulk_push(value_bulk, 0, &value) {
            return Response::BulkGet {
                status: e.status(),
                vsize: needed,
            };
        }
        Response::BulkGet {
            status: Status::Success,
            vsize: needed,
        }
    }
}
