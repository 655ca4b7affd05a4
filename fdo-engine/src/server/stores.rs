// This file is part of Astarte.
//
// Copyright 2025, 2026 SECO Mind Srl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Storage collaborators of the server.
//!
//! The dispatcher is synchronous, so the stores are too. They take `&self` and use interior
//! mutability, to be shared between the requests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use fdo_protocol::error::ErrorKind;
use fdo_protocol::utils::{cbor_decode, cbor_encode, Hex};
use fdo_protocol::v101::hash_hmac::Hash;
use fdo_protocol::v101::ownership_voucher::OwnershipVoucher;
use fdo_protocol::v101::public_key::PublicKey;
use fdo_protocol::v101::to1::rv_redirect::To1d;
use fdo_protocol::v101::Guid;
use fdo_protocol::Error;
use tracing::{debug, error, instrument};

use super::session::SessionState;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, Error> {
    mutex
        .lock()
        .map_err(|_| Error::new(ErrorKind::Io, "store lock poisoned"))
}

/// Sessions by continuation token.
pub trait SessionStore: Send + Sync {
    /// Saves the state of a new session, errors if the token exists.
    fn create(&self, token: &str, state: &SessionState) -> Result<(), Error>;

    /// Loads the state of a session.
    fn load(&self, token: &str) -> Result<Option<SessionState>, Error>;

    /// Updates the state of an existing session.
    fn store(&self, token: &str, state: &SessionState) -> Result<(), Error>;

    /// Removes the session.
    fn delete(&self, token: &str) -> Result<(), Error>;
}

/// Vouchers by GUID of the device.
pub trait VoucherStore: Send + Sync {
    /// Loads the voucher of a device.
    fn load(&self, guid: &Guid) -> Result<Option<OwnershipVoucher>, Error>;

    /// Saves a new voucher, errors if one exists for the GUID.
    fn insert(&self, voucher: &OwnershipVoucher) -> Result<(), Error>;

    /// Replaces a voucher, if the stored one still has the expected number of entries.
    fn replace(&self, expected_entries: usize, voucher: &OwnershipVoucher) -> Result<(), Error>;
}

/// Owner address registered in TO0.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    /// Signed owner addresses
    pub to1d: To1d,
    /// Key of the device, to verify the TO1 proof
    pub device_key: PublicKey,
}

/// TO0 registrations, with an expiration.
pub trait RedirectStore: Send + Sync {
    /// Saves the redirect for the time given.
    fn store(&self, guid: &Guid, redirect: Redirect, ttl: Duration) -> Result<(), Error>;

    /// Loads a redirect that is not expired.
    fn load(&self, guid: &Guid) -> Result<Option<Redirect>, Error>;
}

/// Devices and keys allowed to use the services.
pub trait DeviceAccess: Send + Sync {
    /// Checks if the device is refused.
    fn is_denied(&self, guid: &Guid) -> Result<bool, Error>;

    /// Checks if the keys of a voucher, given by [`key_hash`](crate::voucher::key_hash), are
    /// trusted.
    fn trusts_keys(&self, key_hashes: &[Hash]) -> Result<bool, Error>;
}

/// Sessions kept encoded in memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open sessions.
    pub fn len(&self) -> Result<usize, Error> {
        lock(&self.sessions).map(|sessions| sessions.len())
    }

    /// Checks if there are no open sessions.
    pub fn is_empty(&self) -> Result<bool, Error> {
        self.len().map(|len| len == 0)
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, token: &str, state: &SessionState) -> Result<(), Error> {
        let bytes = cbor_encode(state)?;

        let mut sessions = lock(&self.sessions)?;

        if sessions.contains_key(token) {
            return Err(Error::new(ErrorKind::Session, "token already exists"));
        }

        sessions.insert(token.to_string(), bytes);

        Ok(())
    }

    fn load(&self, token: &str) -> Result<Option<SessionState>, Error> {
        let sessions = lock(&self.sessions)?;

        sessions
            .get(token)
            .map(|bytes| cbor_decode(bytes))
            .transpose()
    }

    fn store(&self, token: &str, state: &SessionState) -> Result<(), Error> {
        let bytes = cbor_encode(state)?;

        let mut sessions = lock(&self.sessions)?;

        let session = sessions
            .get_mut(token)
            .ok_or(Error::new(ErrorKind::Session, "unknown token"))?;

        *session = bytes;

        Ok(())
    }

    fn delete(&self, token: &str) -> Result<(), Error> {
        lock(&self.sessions)?.remove(token);

        Ok(())
    }
}

/// Vouchers kept encoded in memory.
#[derive(Debug, Default)]
pub struct MemoryVoucherStore {
    vouchers: Mutex<HashMap<Guid, Vec<u8>>>,
}

impl MemoryVoucherStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl VoucherStore for MemoryVoucherStore {
    fn load(&self, guid: &Guid) -> Result<Option<OwnershipVoucher>, Error> {
        lock(&self.vouchers)?
            .get(guid)
            .map(|bytes| cbor_decode(bytes))
            .transpose()
    }

    #[instrument(skip_all, fields(guid = %voucher.guid()))]
    fn insert(&self, voucher: &OwnershipVoucher) -> Result<(), Error> {
        let bytes = cbor_encode(voucher)?;

        let mut vouchers = lock(&self.vouchers)?;

        if vouchers.contains_key(voucher.guid()) {
            error!("voucher already exists");

            return Err(Error::new(ErrorKind::Resource, "voucher already exists"));
        }

        vouchers.insert(*voucher.guid(), bytes);

        Ok(())
    }

    #[instrument(skip_all, fields(guid = %voucher.guid()))]
    fn replace(&self, expected_entries: usize, voucher: &OwnershipVoucher) -> Result<(), Error> {
        let bytes = cbor_encode(voucher)?;

        let mut vouchers = lock(&self.vouchers)?;

        let stored = vouchers
            .get_mut(voucher.guid())
            .ok_or(Error::new(ErrorKind::Resource, "voucher not found"))?;

        let current: OwnershipVoucher = cbor_decode(stored)?;

        if current.entries().len() != expected_entries {
            error!(
                expected_entries,
                entries = current.entries().len(),
                "voucher changed concurrently"
            );

            return Err(Error::new(ErrorKind::Voucher, "voucher changed concurrently"));
        }

        *stored = bytes;

        Ok(())
    }
}

/// Vouchers stored as files named by GUID.
#[derive(Debug)]
pub struct FileVoucherStore {
    dir: PathBuf,
    // serializes the read-check-write of replace
    lock: Mutex<()>,
}

impl FileVoucherStore {
    /// Opens the directory, creating it if missing.
    pub fn open(dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn path(&self, guid: &Guid) -> PathBuf {
        self.dir.join(format!("{}.ov", Hex::new(guid.as_slice())))
    }

    fn read(&self, guid: &Guid) -> Result<Option<OwnershipVoucher>, Error> {
        match std::fs::read(self.path(guid)) {
            Ok(bytes) => cbor_decode(&bytes).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                error!(error = %err, "couldn't read voucher");

                Err(Error::new(ErrorKind::Io, "couldn't read voucher"))
            }
        }
    }

    fn write(&self, voucher: &OwnershipVoucher, create_new: bool) -> Result<(), Error> {
        let bytes = cbor_encode(voucher)?;

        let mut options = std::fs::File::options();
        options.write(true);

        if create_new {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }

        let mut file = options.open(self.path(voucher.guid())).map_err(|err| {
            error!(error = %err, "couldn't open voucher file");

            match err.kind() {
                io::ErrorKind::AlreadyExists => {
                    Error::new(ErrorKind::Resource, "voucher already exists")
                }
                _ => Error::new(ErrorKind::Io, "couldn't open voucher file"),
            }
        })?;

        io::Write::write_all(&mut file, &bytes).map_err(|err| {
            error!(error = %err, "couldn't write voucher");

            Error::new(ErrorKind::Io, "couldn't write voucher")
        })
    }
}

impl VoucherStore for FileVoucherStore {
    #[instrument(skip(self))]
    fn load(&self, guid: &Guid) -> Result<Option<OwnershipVoucher>, Error> {
        self.read(guid)
    }

    #[instrument(skip_all, fields(guid = %voucher.guid()))]
    fn insert(&self, voucher: &OwnershipVoucher) -> Result<(), Error> {
        let _guard = lock(&self.lock)?;

        self.write(voucher, true)
    }

    #[instrument(skip_all, fields(guid = %voucher.guid()))]
    fn replace(&self, expected_entries: usize, voucher: &OwnershipVoucher) -> Result<(), Error> {
        let _guard = lock(&self.lock)?;

        let current = self
            .read(voucher.guid())?
            .ok_or(Error::new(ErrorKind::Resource, "voucher not found"))?;

        if current.entries().len() != expected_entries {
            error!(
                expected_entries,
                entries = current.entries().len(),
                "voucher changed concurrently"
            );

            return Err(Error::new(ErrorKind::Voucher, "voucher changed concurrently"));
        }

        self.write(voucher, false)
    }
}

/// Redirects kept in memory until they expire.
#[derive(Debug, Default)]
pub struct MemoryRedirectStore {
    redirects: Mutex<HashMap<Guid, (Redirect, Instant)>>,
}

impl MemoryRedirectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RedirectStore for MemoryRedirectStore {
    #[instrument(skip(self, redirect))]
    fn store(&self, guid: &Guid, redirect: Redirect, ttl: Duration) -> Result<(), Error> {
        let expires = Instant::now()
            .checked_add(ttl)
            .ok_or(Error::new(ErrorKind::OutOfRange, "redirect ttl"))?;

        lock(&self.redirects)?.insert(*guid, (redirect, expires));

        Ok(())
    }

    #[instrument(skip(self))]
    fn load(&self, guid: &Guid) -> Result<Option<Redirect>, Error> {
        let mut redirects = lock(&self.redirects)?;

        match redirects.get(guid) {
            Some((_, expires)) if *expires <= Instant::now() => {
                debug!("redirect expired");

                redirects.remove(guid);

                Ok(None)
            }
            Some((redirect, _)) => Ok(Some(redirect.clone())),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Default)]
struct Lists {
    denied: HashSet<Guid>,
    allowed_keys: HashSet<Hash>,
    denied_keys: HashSet<Hash>,
}

/// Deny list of devices, with allow and deny lists of key hashes.
///
/// A denied key refuses the voucher. When some keys are allowed, one of the voucher keys must be
/// among them.
#[derive(Debug, Default)]
pub struct AccessList {
    lists: RwLock<Lists>,
}

impl AccessList {
    /// Creates empty lists, allowing every device.
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Lists>, Error> {
        self.lists
            .write()
            .map_err(|_| Error::new(ErrorKind::Io, "access list lock poisoned"))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Lists>, Error> {
        self.lists
            .read()
            .map_err(|_| Error::new(ErrorKind::Io, "access list lock poisoned"))
    }

    /// Refuses a device.
    pub fn deny(&self, guid: Guid) -> Result<(), Error> {
        self.write()?.denied.insert(guid);

        Ok(())
    }

    /// Allows a device again.
    pub fn allow(&self, guid: &Guid) -> Result<(), Error> {
        self.write()?.denied.remove(guid);

        Ok(())
    }

    /// Trusts the vouchers signed by or transferred to the key.
    pub fn allow_key(&self, key_hash: Hash) -> Result<(), Error> {
        self.write()?.allowed_keys.insert(key_hash);

        Ok(())
    }

    /// Refuses the vouchers signed by or transferred to the key.
    pub fn deny_key(&self, key_hash: Hash) -> Result<(), Error> {
        self.write()?.denied_keys.insert(key_hash);

        Ok(())
    }
}

impl DeviceAccess for AccessList {
    fn is_denied(&self, guid: &Guid) -> Result<bool, Error> {
        self.read().map(|lists| lists.denied.contains(guid))
    }

    fn trusts_keys(&self, key_hashes: &[Hash]) -> Result<bool, Error> {
        let lists = self.read()?;

        if key_hashes.iter().any(|hash| lists.denied_keys.contains(hash)) {
            debug!("voucher key denied");

            return Ok(false);
        }

        let allowed = lists.allowed_keys.is_empty()
            || key_hashes
                .iter()
                .any(|hash| lists.allowed_keys.contains(hash));

        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use coset::CoseSign1Builder;
    use fdo_protocol::v101::public_key::PkType;
    use pretty_assertions::assert_eq;

    use crate::crypto::keys::SigningKey;
    use crate::server::session::To0State;
    use crate::voucher;

    use super::*;

    fn create_voucher() -> (OwnershipVoucher, SigningKey) {
        let mfg = SigningKey::generate(PkType::Secp256R1).unwrap();
        let device = SigningKey::generate(PkType::Secp256R1).unwrap();

        (voucher::tests::create_voucher(&mfg, &device), mfg)
    }

    fn create_redirect() -> Redirect {
        let device = SigningKey::generate(PkType::Secp256R1).unwrap();

        Redirect {
            to1d: To1d::new(CoseSign1Builder::new().payload(vec![0x80]).build()),
            device_key: device.public_key(),
        }
    }

    #[test]
    fn session_lifecycle() {
        let store = MemorySessionStore::new();
        let state = SessionState::To0(To0State::OwnerSign {
            nonce: crate::crypto::nonce().unwrap(),
        });

        assert!(store.load("token").unwrap().is_none());
        store.store("token", &state).unwrap_err();

        store.create("token", &state).unwrap();
        store.create("token", &state).unwrap_err();
        assert_eq!(store.len().unwrap(), 1);

        let loaded = store.load("token").unwrap().unwrap();
        assert!(loaded.accepts(22));

        store.store("token", &state).unwrap();

        store.delete("token").unwrap();
        assert!(store.is_empty().unwrap());
    }

    fn voucher_store_contract<S: VoucherStore>(store: S) {
        let (mut voucher, mfg) = create_voucher();
        let owner = SigningKey::generate(PkType::Secp256R1).unwrap();

        assert!(store.load(voucher.guid()).unwrap().is_none());

        store.insert(&voucher).unwrap();
        let err = store.insert(&voucher).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Resource);

        voucher::extend(&mut voucher, owner.public_key(), &mfg).unwrap();

        let err = store.replace(1, &voucher).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Voucher);

        store.replace(0, &voucher).unwrap();

        let loaded = store.load(voucher.guid()).unwrap().unwrap();
        assert_eq!(loaded.entries().len(), 1);
        assert_eq!(voucher::verify(&loaded).unwrap(), owner.public_key());

        // A second transfer from the same starting point loses
        let err = store.replace(0, &voucher).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Voucher);
    }

    #[test]
    fn memory_voucher_store() {
        voucher_store_contract(MemoryVoucherStore::new());
    }

    #[test]
    fn file_voucher_store() {
        let dir = std::env::temp_dir().join(format!(
            "fdo-vouchers-{}",
            Hex::new(&crate::crypto::random::<8>().unwrap())
        ));

        voucher_store_contract(FileVoucherStore::open(dir.clone()).unwrap());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn redirect_expires() {
        let store = MemoryRedirectStore::new();
        let guid = Guid::new([1; 16]);

        store
            .store(&guid, create_redirect(), Duration::from_secs(60))
            .unwrap();
        assert!(store.load(&guid).unwrap().is_some());

        store.store(&guid, create_redirect(), Duration::ZERO).unwrap();
        assert!(store.load(&guid).unwrap().is_none());

        assert!(store.load(&Guid::new([2; 16])).unwrap().is_none());
    }

    #[test]
    fn deny_list() {
        let list = AccessList::new();
        let guid = Guid::new([1; 16]);

        assert!(!list.is_denied(&guid).unwrap());

        list.deny(guid).unwrap();
        assert!(list.is_denied(&guid).unwrap());
        assert!(!list.is_denied(&Guid::new([2; 16])).unwrap());

        list.allow(&guid).unwrap();
        assert!(!list.is_denied(&guid).unwrap());
    }

    #[test]
    fn key_lists() {
        let (voucher, mfg) = create_voucher();
        let other = SigningKey::generate(PkType::Secp256R1).unwrap();

        let hashes = voucher::key_hashes(&voucher).unwrap();
        assert_eq!(hashes, vec![voucher::key_hash(&mfg.public_key()).unwrap()]);

        let list = AccessList::new();
        assert!(list.trusts_keys(&hashes).unwrap());

        list.allow_key(voucher::key_hash(&other.public_key()).unwrap()).unwrap();
        assert!(!list.trusts_keys(&hashes).unwrap());

        list.allow_key(hashes[0].clone()).unwrap();
        assert!(list.trusts_keys(&hashes).unwrap());

        list.deny_key(hashes[0].clone()).unwrap();
        assert!(!list.trusts_keys(&hashes).unwrap());
    }
}
