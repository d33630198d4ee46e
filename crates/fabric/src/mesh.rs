//! The in-process fabric: endpoints, provider dispatch, worker pools.
//!
//! Every endpoint owns a bounded worker pool. A call serializes its request
//! envelope, enqueues it on the target endpoint's pool, and blocks until a
//! worker ran the provider's handler and sent the serialized response back.
//! Handlers are closures installed at registration time; they capture their
//! provider state, so dispatch needs no global provider map.
//!
//! Finalizing an endpoint (locally or through an authorized remote
//! `Shutdown`) fails new calls, drops queued jobs, and lets in-flight
//! handlers finish. Callers whose job was dropped see a transport error.

use crate::bulk::{BulkAccess, BulkHandle, BulkRef, BulkRegistry};
use crate::message::{Request, Response};
use dashmap::DashMap;
use keyfab_core::{Error, Result, Status};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handler closure a provider installs for its id on an endpoint.
pub type Handler = Arc<dyn Fn(Request) -> Response + Send + Sync>;

/// Endpoint tuning knobs.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Worker threads serving this endpoint's handlers
    pub pool_size: usize,
    /// Honor remote `Shutdown` requests
    pub allow_remote_shutdown: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            pool_size: 4,
            allow_remote_shutdown: false,
        }
    }
}

impl From<&keyfab_core::ProviderConfig> for EndpointConfig {
    /// Size the endpoint pool from a provider's configuration.
    ///
    /// `progress_thread_enabled` has no counterpart here: the pool workers
    /// are the progress loop on this fabric.
    fn from(config: &keyfab_core::ProviderConfig) -> Self {
        EndpointConfig {
            pool_size: config.handler_pool_size,
            allow_remote_shutdown: false,
        }
    }
}

struct Job {
    provider_id: u16,
    payload: Vec<u8>,
    reply: mpsc::SyncSender<Vec<u8>>,
}

#[derive(Default)]
struct Pool {
    queue: Mutex<VecDeque<Job>>,
    available: Condvar,
    finalized: AtomicBool,
}

struct Endpoint {
    addr: String,
    config: EndpointConfig,
    providers: DashMap<u16, Handler>,
    pool: Arc<Pool>,
}

impl Endpoint {
    fn finalize(&self) {
        if !self.pool.finalized.swap(true, Ordering::SeqCst) {
            info!(addr = %self.addr, "finalizing endpoint");
        }
        // Wake every worker so they observe the flag; queued jobs are
        // dropped, which fails their callers' receive side.
        self.pool.available.notify_all();
        self.pool.queue.lock().clear();
    }

    fn is_finalized(&self) -> bool {
        self.pool.finalized.load(Ordering::SeqCst)
    }
}

fn worker_loop(endpoint: Arc<Endpoint>) {
    loop {
        let job = {
            let mut queue = endpoint.pool.queue.lock();
            loop {
                if endpoint.pool.finalized.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(job) = queue.pop_front() {
                    break job;
                }
                endpoint.pool.available.wait(&mut queue);
            }
        };

        // Clone the handler out so the map guard is released before the
        // (possibly long) handler run.
        let handler = endpoint
            .providers
            .get(&job.provider_id)
            .map(|entry| entry.value().clone());
        let response = match handler {
            None => Response::Status(Status::UnknownProvider),
            Some(handler) => match bincode::deserialize::<Request>(&job.payload) {
                Ok(request) => handler(request),
                Err(e) => {
                    warn!(error = %e, "dropping undecodable request envelope");
                    Response::Status(Status::InvalidArg)
                }
            },
        };
        let bytes = bincode::serialize(&response).unwrap_or_default();
        // A caller that gave up is not an error worth surfacing.
        let _ = job.reply.send(bytes);
    }
}

struct FabricInner {
    endpoints: DashMap<String, Arc<Endpoint>>,
    bulks: Arc<BulkRegistry>,
}

impl Drop for FabricInner {
    fn drop(&mut self) {
        for endpoint in self.endpoints.iter() {
            endpoint.finalize();
        }
    }
}

/// The shared fabric runtime.
///
/// Cheap to clone; all clones address the same endpoint table and bulk
/// registry.
#[derive(Clone)]
pub struct Fabric {
    inner: Arc<FabricInner>,
}

impl Default for Fabric {
    fn default() -> Self {
        Self::new()
    }
}

impl Fabric {
    /// Create an empty fabric.
    pub fn new() -> Self {
        Fabric {
            inner: Arc::new(FabricInner {
                endpoints: DashMap::new(),
                bulks: Arc::new(BulkRegistry::new()),
            }),
        }
    }

    /// Register an endpoint and start its worker pool.
    pub fn add_endpoint(&self, addr: impl Into<String>, config: EndpointConfig) -> Result<()> {
        let addr = addr.into();
        if config.pool_size == 0 {
            return Err(Error::InvalidArg("pool size must be nonzero".to_string()));
        }
        let endpoint = Arc::new(Endpoint {
            addr: addr.clone(),
            config: config.clone(),
            providers: DashMap::new(),
            pool: Arc::new(Pool::default()),
        });
        match self.inner.endpoints.entry(addr.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(Error::Fabric(format!(
                    "address {:?} already registered",
                    addr
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(endpoint.clone());
            }
        }
        for i in 0..config.pool_size {
            let endpoint = endpoint.clone();
            std::thread::Builder::new()
                .name(format!("keyfab-{}-{}", endpoint.addr, i))
                .spawn(move || worker_loop(endpoint))
                .map_err(|e| Error::Task(e.to_string()))?;
        }
        info!(%addr, pool = config.pool_size, "endpoint registered");
        Ok(())
    }

    /// Install `handler` for `provider_id` on `addr`.
    pub fn register_provider(&self, addr: &str, provider_id: u16, handler: Handler) -> Result<()> {
        let endpoint = self.endpoint(addr)?;
        if endpoint.providers.contains_key(&provider_id) {
            return Err(Error::Fabric(format!(
                "provider {} already registered on {:?}",
                provider_id, addr
            )));
        }
        endpoint.providers.insert(provider_id, handler);
        Ok(())
    }

    /// Verify that `addr` names a live endpoint.
    pub fn lookup(&self, addr: &str) -> Result<()> {
        let endpoint = self.endpoint(addr)?;
        if endpoint.is_finalized() {
            return Err(Error::Fabric(format!("address {:?} is finalized", addr)));
        }
        Ok(())
    }

    fn endpoint(&self, addr: &str) -> Result<Arc<Endpoint>> {
        self.inner
            .endpoints
            .get(addr)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::Fabric(format!("unknown address {:?}", addr)))
    }

    /// Register a byte region for bulk transfer.
    pub fn expose(&self, data: Vec<u8>, access: BulkAccess) -> BulkHandle {
        BulkRegistry::register(&self.inner.bulks, data, access)
    }

    /// Pull `len` bytes at `offset` from a registered region.
    pub fn bulk_pull(&self, bulk: &BulkRef, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.inner.bulks.pull(bulk, offset, len)
    }

    /// Push bytes at `offset` into a registered region.
    pub fn bulk_push(&self, bulk: &BulkRef, offset: u64, bytes: &[u8]) -> Result<()> {
        self.inner.bulks.push(bulk, offset, bytes)
    }

    /// Live bulk registrations; leak assertions in tests use this.
    pub fn bulk_registered_count(&self) -> usize {
        self.inner.bulks.registered_count()
    }

    /// Issue a call and wait for its response.
    pub fn call(&self, addr: &str, provider_id: u16, request: &Request) -> Result<Response> {
        let endpoint = self.endpoint(addr)?;
        if endpoint.is_finalized() {
            return Err(Error::Fabric(format!("address {:?} is finalized", addr)));
        }

        if matches!(request, Request::Shutdown) {
            if !endpoint.config.allow_remote_shutdown {
                return Err(Error::Fabric(format!(
                    "remote shutdown not authorized on {:?}",
                    addr
                )));
            }
            endpoint.finalize();
            return Ok(Response::Status(Status::Success));
        }

        if !endpoint.providers.contains_key(&provider_id) {
            return Err(Error::UnknownProvider(provider_id));
        }

        let payload = bincode::serialize(request).map_err(|e| Error::Fabric(e.to_string()))?;
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        {
            let mut queue = endpoint.pool.queue.lock();
            if endpoint.pool.finalized.load(Ordering::SeqCst) {
                return Err(Error::Fabric(format!("address {:?} is finalized", addr)));
            }
            queue.push_back(Job {
                provider_id,
                payload,
                reply: reply_tx,
            });
        }
        endpoint.pool.available.notify_one();
        debug!(%addr, provider_id, "call dispatched");

        let bytes = reply_rx
            .recv()
            .map_err(|_| Error::Fabric(format!("call to {:?} dropped in flight", addr)))?;
        bincode::deserialize(&bytes).map_err(|e| Error::Fabric(e.to_string()))
    }

    /// Remotely finalize `addr`; honored only when the endpoint allows it.
    pub fn shutdown(&self, addr: &str) -> Result<()> {
        self.call(addr, 0, &Request::Shutdown)?.status().into_result()
    }

    /// Locally finalize `addr`, dropping queued work.
    pub fn finalize(&self, addr: &str) -> Result<()> {
        self.endpoint(addr)?.finalize();
        Ok(())
    }

    /// True once `addr` was finalized.
    pub fn is_finalized(&self, addr: &str) -> bool {
        self.endpoint(addr).map(|e| e.is_finalized()).unwrap_or(true)
    }
}

impl std::fmt::Debug for Fabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fabric")
            .field("endpoints", &self.inner.endpoints.len())
            .field("bulk_regions", &self.inner.bulks.registered_count())
            .finish()
    }
}
