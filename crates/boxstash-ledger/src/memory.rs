use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{debug, warn};

use boxstash_plan::Batch;
use boxstash_types::{BoxKey, MetadataRecord, OwnerKey, StoreLimits};

use crate::account::{SignedBatch, TxId};
use crate::error::{LedgerError, LedgerResult};
use crate::program::{AppState, BoxProgram};
use crate::traits::LedgerClient;

/// In-memory box store for tests, local simulation, and embedding.
///
/// Every batch is applied to a scratch copy of the state and committed only
/// if all of its calls succeed, so a rejected batch leaves no trace.
pub struct InMemoryLedger {
    app_id: u64,
    app_address: [u8; 32],
    limits: StoreLimits,
    min_fee: u64,
    inner: RwLock<LedgerInner>,
}

#[derive(Default)]
struct LedgerInner {
    state: AppState,
    injected: VecDeque<LedgerError>,
    accepted: Vec<Batch>,
    rejected: usize,
}

impl InMemoryLedger {
    /// Minimum fee of one call.
    pub const MIN_FEE: u64 = 1000;
    /// Balance the application account starts with.
    pub const APP_MIN_BALANCE: u64 = 100_000;

    pub fn new(app_id: u64, limits: StoreLimits) -> Self {
        let app_address = application_address(app_id);
        let mut inner = LedgerInner::default();
        inner.state.balances.insert(app_address, Self::APP_MIN_BALANCE);
        Self {
            app_id,
            app_address,
            limits,
            min_fee: Self::MIN_FEE,
            inner: RwLock::new(inner),
        }
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerInner>> {
        self.inner
            .read()
            .map_err(|_| LedgerError::Transport("ledger read lock poisoned".into()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerInner>> {
        self.inner
            .write()
            .map_err(|_| LedgerError::Transport("ledger write lock poisoned".into()))
    }

    /// Credit `amount` to an account, as a faucet would.
    pub fn fund(&self, account: [u8; 32], amount: u64) -> LedgerResult<()> {
        let mut inner = self.write()?;
        let balance = inner.state.balances.entry(account).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::InvalidBatch(format!("funding {amount} overflows balance")))?;
        Ok(())
    }

    pub fn balance(&self, account: &[u8; 32]) -> LedgerResult<u64> {
        Ok(self.read()?.state.balances.get(account).copied().unwrap_or(0))
    }

    pub fn app_balance(&self) -> LedgerResult<u64> {
        self.balance(&self.app_address)
    }

    /// Fail the next submission with `error` without applying it.
    pub fn inject_failure(&self, error: LedgerError) -> LedgerResult<()> {
        self.write()?.injected.push_back(error);
        Ok(())
    }

    /// Batches applied so far, in order.
    pub fn accepted_batches(&self) -> LedgerResult<Vec<Batch>> {
        Ok(self.read()?.accepted.clone())
    }

    pub fn rejected_count(&self) -> LedgerResult<usize> {
        Ok(self.read()?.rejected)
    }

    /// Number of boxes currently stored, metadata included.
    pub fn box_count(&self) -> LedgerResult<usize> {
        Ok(self.read()?.state.boxes.len())
    }

    /// Decoded metadata record of `owner`, if any.
    pub fn metadata(&self, owner: OwnerKey) -> LedgerResult<Option<MetadataRecord>> {
        let inner = self.read()?;
        inner
            .state
            .boxes
            .get(&BoxKey::Owner(owner))
            .map(|raw| {
                MetadataRecord::decode(raw).map_err(|e| LedgerError::Serialization(e.to_string()))
            })
            .transpose()
    }

    fn program(&self) -> BoxProgram<'_> {
        BoxProgram {
            limits: &self.limits,
            app_address: self.app_address,
            min_fee: self.min_fee,
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(1, StoreLimits::default())
    }
}

/// Address of application `app_id`.
pub fn application_address(app_id: u64) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"appID");
    hasher.update(&app_id.to_be_bytes());
    *hasher.finalize().as_bytes()
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn limits(&self) -> LedgerResult<StoreLimits> {
        Ok(self.limits.clone())
    }

    async fn app_address(&self) -> LedgerResult<[u8; 32]> {
        Ok(self.app_address)
    }

    async fn execute(&self, signed: &SignedBatch) -> LedgerResult<Vec<TxId>> {
        let mut inner = self.write()?;
        if let Some(error) = inner.injected.pop_front() {
            warn!(%error, "injected failure");
            return Err(error);
        }
        signed.verify()?;

        let mut scratch = inner.state.clone();
        match self.program().run(&mut scratch, signed) {
            Ok(()) => {
                inner.state = scratch;
                inner.accepted.push(signed.batch.clone());
                debug!(batch = %signed.batch, "batch applied");
                signed.tx_ids()
            }
            Err(error) => {
                inner.rejected += 1;
                warn!(batch = %signed.batch, %error, "batch rejected");
                Err(error)
            }
        }
    }

    async fn read_box(&self, key: &BoxKey) -> LedgerResult<Vec<u8>> {
        self.read()?
            .state
            .boxes
            .get(key)
            .cloned()
            .ok_or(LedgerError::NotFound(*key))
    }
}
