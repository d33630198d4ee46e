//! Handle to one provider on the fabric.

use crate::database::DatabaseHandle;
use keyfab_core::{Error, ProviderId, Result};
use keyfab_fabric::{DbEntry, Fabric, Request, Response};
use std::sync::Arc;

struct HandleInner {
    fabric: Fabric,
    addr: String,
    provider_id: ProviderId,
}

/// Shared-ownership handle to `(addr, provider id)`.
///
/// Clones share one inner state; database handles keep their provider
/// handle alive.
#[derive(Clone)]
pub struct ProviderHandle {
    inner: Arc<HandleInner>,
}

impl ProviderHandle {
    pub(crate) fn new(fabric: Fabric, addr: String, provider_id: ProviderId) -> Self {
        ProviderHandle {
            inner: Arc::new(HandleInner {
                fabric,
                addr,
                provider_id,
            }),
        }
    }

    /// Endpoint address.
    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    /// Provider id on the endpoint.
    pub fn provider_id(&self) -> ProviderId {
        self.inner.provider_id
    }

    pub(crate) fn fabric(&self) -> &Fabric {
        &self.inner.fabric
    }

    pub(crate) fn call(&self, request: &Request) -> Result<Response> {
        self.inner
            .fabric
            .call(&self.inner.addr, self.inner.provider_id.get(), request)
    }

    /// Resolve a database name into a handle.
    pub fn open(&self, name: &str) -> Result<DatabaseHandle> {
        match self.call(&Request::Open {
            name: name.to_string(),
        })? {
            Response::Open { status, db } if status.is_success() => {
                Ok(DatabaseHandle::new(self.clone(), db))
            }
            response => Err(Error::Remote(response.status())),
        }
    }

    /// Number of databases the provider hosts.
    pub fn count_databases(&self) -> Result<u64> {
        match self.call(&Request::CountDatabases)? {
            Response::Count { status, count } if status.is_success() => Ok(count),
            response => Err(Error::Remote(response.status())),
        }
    }

    /// Up to `max` `(name, id)` rows in attach order.
    pub fn list_databases(&self, max: u64) -> Result<Vec<DbEntry>> {
        match self.call(&Request::ListDatabases { max })? {
            Response::DbList { status, entries } if status.is_success() => Ok(entries),
            response => Err(Error::Remote(response.status())),
        }
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("addr", &self.inner.addr)
            .field("provider_id", &self.inner.provider_id)
            .finish()
    }
}
