//! Shared fixtures for laim-sync integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use laim_sync::db::{InventoryStore, SqliteInventoryStore, SqliteJobHistoryStore};
use laim_sync::models::{InventoryItem, SourceKind, SyncJob};
use laim_sync::services::{Classifier, Reconciler};
use laim_sync::sources::{
    AuthSession, Credentials, FetchConstraints, LibrenmsDevice, LibrenmsPort, NetdiscoDevice,
    NetdiscoNode, RawPayload, SourceClient, SourceError,
};
use laim_sync::workflow::{SyncEngine, SyncService};

/// What a fake source does on its next fetch
#[derive(Debug, Clone)]
pub enum Script {
    Devices(Vec<RawPayload>),
    /// Credentials rejected at authentication
    AuthFailure,
    /// Block until the run is cancelled
    WaitForCancel,
}

/// In-process stand-in for a source client
pub struct FakeSource {
    kind: SourceKind,
    script: Mutex<Script>,
    fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new(kind: SourceKind, script: Script) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(script),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    /// Number of `list_devices` calls so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn current(&self) -> Script {
        self.script.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn authenticate(
        &self,
        _credentials: &Credentials,
        _constraints: &FetchConstraints,
    ) -> Result<AuthSession, SourceError> {
        match self.current() {
            Script::AuthFailure => Err(SourceError::Auth("401 Unauthorized".to_string())),
            _ => Ok(AuthSession {
                header_name: "X-Test",
                header_value: "token".to_string(),
            }),
        }
    }

    async fn list_devices(
        &self,
        _session: &AuthSession,
        constraints: &FetchConstraints,
    ) -> Result<Vec<RawPayload>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.current() {
            Script::Devices(devices) => Ok(devices),
            Script::AuthFailure => Err(SourceError::Auth("401 Unauthorized".to_string())),
            Script::WaitForCancel => {
                constraints.cancel.cancelled().await;
                Err(SourceError::Cancelled)
            }
        }
    }
}

pub fn credentials(kind: SourceKind) -> Credentials {
    match kind {
        SourceKind::Netdisco => Credentials::UserPassword {
            username: "svc".into(),
            password: "secret".into(),
        },
        SourceKind::Librenms => Credentials::ApiToken("token".into()),
    }
}

/// Netdisco payload; `mac` goes into the first node
pub fn netdisco(ip: &str, dns: &str, serial: Option<&str>, mac: Option<&str>, model: Option<&str>) -> RawPayload {
    RawPayload::Netdisco(NetdiscoDevice {
        ip: Some(ip.into()),
        dns: Some(dns.into()),
        serial: serial.map(Into::into),
        model: model.map(Into::into),
        nodes: mac
            .map(|m| vec![NetdiscoNode { mac: Some(m.into()) }])
            .unwrap_or_default(),
        ..Default::default()
    })
}

/// LibreNMS payload; `mac` goes into the first port
pub fn librenms(
    device_id: &str,
    hostname: &str,
    ip: Option<&str>,
    serial: Option<&str>,
    mac: Option<&str>,
    hardware: Option<&str>,
) -> RawPayload {
    RawPayload::Librenms(LibrenmsDevice {
        device_id: Some(device_id.into()),
        hostname: Some(hostname.into()),
        ip: ip.map(Into::into),
        serial: serial.map(Into::into),
        hardware: hardware.map(Into::into),
        ports: mac
            .map(|m| {
                vec![LibrenmsPort {
                    if_phys_address: Some(m.into()),
                }]
            })
            .unwrap_or_default(),
        ..Default::default()
    })
}

pub struct Harness {
    pub pool: SqlitePool,
    pub inventory: SqliteInventoryStore,
    pub history: SqliteJobHistoryStore,
    pub service: SyncService,
}

/// Fresh in-memory database and a service over the given fakes
///
/// Merge priority is LibreNMS over Netdisco.
pub async fn harness(sources: &[Arc<FakeSource>]) -> Harness {
    harness_with_store(sources, |store| Arc::new(store) as Arc<dyn InventoryStore>).await
}

/// Like [`harness`], with the engine writing through `wrap(store)`
pub async fn harness_with_store<F>(sources: &[Arc<FakeSource>], wrap: F) -> Harness
where
    F: FnOnce(SqliteInventoryStore) -> Arc<dyn InventoryStore>,
{
    let pool = laim_common::db::init_memory_database().await.unwrap();
    let inventory = SqliteInventoryStore::new(pool.clone());
    let history = SqliteJobHistoryStore::new(pool.clone());

    let mut engine = SyncEngine::new(
        wrap(inventory.clone()),
        Arc::new(history.clone()),
        Reconciler::new(vec![SourceKind::Librenms, SourceKind::Netdisco]),
        Classifier::default(),
    );
    for source in sources {
        let client: Arc<dyn SourceClient> = source.clone();
        engine = engine.with_source(client, credentials(source.kind()));
    }

    Harness {
        pool,
        inventory,
        history,
        service: SyncService::new(engine),
    }
}

/// Poll until the job is terminal and the run slot is free
pub async fn wait_finished(service: &SyncService, job_id: Uuid) -> SyncJob {
    for _ in 0..500 {
        let job = service.status(job_id).await.unwrap();
        if job.is_terminal() && service.active().is_none() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("sync job {} did not finish", job_id);
}

/// Live inventory items in insertion order
pub async fn items(harness: &Harness) -> Vec<InventoryItem> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM inventory_items WHERE is_deleted = 0 ORDER BY id")
        .fetch_all(&harness.pool)
        .await
        .unwrap();

    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        items.push(harness.inventory.get(id).await.unwrap().unwrap());
    }
    items
}
