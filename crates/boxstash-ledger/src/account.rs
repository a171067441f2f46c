use std::fmt;

use ed25519_dalek::{Signer, Verifier};

use boxstash_plan::Batch;
use boxstash_types::OwnerKey;

use crate::error::{LedgerError, LedgerResult};
use crate::traits::KeySource;

const BATCH_DOMAIN: &[u8] = b"boxstash-batch-v1:";

/// A signing account. Its address is the raw ed25519 public key.
#[derive(Clone)]
pub struct Account {
    key: ed25519_dalek::SigningKey,
}

impl Account {
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self {
            key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    pub fn address(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// The account's address used as a blob owner.
    pub fn owner_key(&self) -> OwnerKey {
        OwnerKey::from_bytes(self.address())
    }

    pub fn sign_batch(&self, batch: Batch) -> LedgerResult<SignedBatch> {
        let bytes = SignedBatch::signing_bytes(&batch)?;
        let signature = self.key.sign(&bytes).to_bytes().to_vec();
        Ok(SignedBatch {
            batch,
            sender: self.address(),
            signature,
        })
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({})", hex::encode(&self.address()[..4]))
    }
}

/// A batch with its sender's signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedBatch {
    pub batch: Batch,
    pub sender: [u8; 32],
    pub signature: Vec<u8>,
}

impl SignedBatch {
    /// Canonical bytes covered by the signature.
    pub fn signing_bytes(batch: &Batch) -> LedgerResult<Vec<u8>> {
        let mut bytes = BATCH_DOMAIN.to_vec();
        let encoded =
            bincode::serialize(batch).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        bytes.extend_from_slice(&encoded);
        Ok(bytes)
    }

    pub fn verify(&self) -> LedgerResult<()> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.sender)
            .map_err(|_| LedgerError::InvalidBatch("sender is not a valid public key".into()))?;
        let signature = ed25519_dalek::Signature::from_slice(&self.signature)
            .map_err(|_| LedgerError::InvalidBatch("malformed signature".into()))?;
        key.verify(&Self::signing_bytes(&self.batch)?, &signature)
            .map_err(|_| LedgerError::InvalidBatch("signature does not match sender".into()))
    }

    /// BLAKE3 digest of the signed content.
    pub fn digest(&self) -> LedgerResult<[u8; 32]> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&Self::signing_bytes(&self.batch)?);
        hasher.update(&self.sender);
        Ok(*hasher.finalize().as_bytes())
    }

    /// One id per call, in batch order.
    pub fn tx_ids(&self) -> LedgerResult<Vec<TxId>> {
        let digest = self.digest()?;
        Ok((0..self.batch.len() as u64)
            .map(|i| {
                let mut hasher = blake3::Hasher::new();
                hasher.update(b"boxstash-tx-v1:");
                hasher.update(&digest);
                hasher.update(&i.to_be_bytes());
                TxId(*hasher.finalize().as_bytes())
            })
            .collect())
    }
}

/// Identifier of one confirmed call.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TxId([u8; 32]);

impl TxId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Accounts held in process.
#[derive(Clone, Debug, Default)]
pub struct LocalKeySource {
    accounts: Vec<Account>,
}

impl LocalKeySource {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }

    /// `count` freshly generated accounts.
    pub fn generate(count: usize) -> Self {
        Self::new((0..count).map(|_| Account::generate()).collect())
    }

    pub fn from_seeds(seeds: &[[u8; 32]]) -> Self {
        Self::new(seeds.iter().copied().map(Account::from_seed).collect())
    }
}

impl KeySource for LocalKeySource {
    fn accounts(&self) -> LedgerResult<Vec<Account>> {
        Ok(self.accounts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxstash_plan::{Call, CallParams, Operation};
    use boxstash_types::BoxKey;

    fn batch(owner: OwnerKey) -> Batch {
        Batch::new(vec![Call::new(
            Operation::Finalize { owner },
            vec![BoxKey::Owner(owner)],
            CallParams::default(),
        )])
    }

    #[test]
    fn signed_batch_verifies() {
        let account = Account::from_seed([5; 32]);
        let signed = account.sign_batch(batch(account.owner_key())).unwrap();
        assert_eq!(signed.sender, account.address());
        assert!(signed.verify().is_ok());
    }

    #[test]
    fn tampered_batch_fails_verification() {
        let account = Account::from_seed([5; 32]);
        let mut signed = account.sign_batch(batch(account.owner_key())).unwrap();
        signed.batch.calls[0].params.fee += 1;
        assert!(matches!(signed.verify(), Err(LedgerError::InvalidBatch(_))));
    }

    #[test]
    fn wrong_sender_fails_verification() {
        let account = Account::from_seed([5; 32]);
        let mut signed = account.sign_batch(batch(account.owner_key())).unwrap();
        signed.sender = Account::from_seed([6; 32]).address();
        assert!(signed.verify().is_err());
    }

    #[test]
    fn tx_ids_are_distinct_and_stable() {
        let account = Account::from_seed([1; 32]);
        let owner = account.owner_key();
        let mut b = batch(owner);
        b.calls.push(b.calls[0].clone());
        let signed = account.sign_batch(b).unwrap();
        let ids = signed.tx_ids().unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(ids, signed.tx_ids().unwrap());
    }

    #[test]
    fn key_source_default_account() {
        let source = LocalKeySource::from_seeds(&[[1; 32], [2; 32]]);
        let first = source.default_account().unwrap();
        assert_eq!(first.address(), Account::from_seed([1; 32]).address());
        assert!(LocalKeySource::default().default_account().is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let account = Account::from_seed([9; 32]);
        let shown = format!("{account:?}");
        assert!(shown.starts_with("Account("));
        assert_eq!(shown.len(), "Account()".len() + 8);
    }
}
