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

//! Service info chunking and decoding.

use fdo_protocol::error::ErrorKind;
use fdo_protocol::utils::cbor_encode;
use fdo_protocol::v101::service_info::{ServiceInfo, ServiceInfoKv};
use fdo_protocol::Error;
use serde_bytes::{ByteBuf, Bytes};
use tracing::{debug, error, trace};

/// Default size for the service info messages.
pub const DEFAULT_MTU: u16 = 1300;

/// A service info message, with its flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// More chunks follow this one.
    pub is_more: bool,
    /// Last chunk of the sender.
    pub is_done: bool,
    /// Key values in the message.
    pub items: ServiceInfo,
}

/// Encoded size of the `[isMore, isDone, [* items]]` message body.
fn encoded_len(items: &[ServiceInfoKv]) -> Result<usize, Error> {
    cbor_encode(&(true, false, items)).map(|buf| buf.len())
}

/// Value of the item, if it's a byte string.
fn byte_string(item: &ServiceInfoKv) -> Option<ByteBuf> {
    let major = item.value_as_bytes().first().map(|b| b >> 5)?;

    if major != 2 {
        return None;
    }

    item.value::<ByteBuf>().ok().filter(|bytes| !bytes.is_empty())
}

/// Longest prefix of the bytes that, under the key, still fits in the chunk.
fn fitting_prefix(
    current: &mut ServiceInfo,
    key: &str,
    bytes: &[u8],
    mtu: usize,
) -> Result<usize, Error> {
    let (mut lo, mut hi) = (0, bytes.len());

    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;

        current.push(ServiceInfoKv::new(key, Bytes::new(&bytes[..mid]))?);
        let fits = encoded_len(current)? <= mtu;
        current.pop();

        if fits {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    Ok(lo)
}

/// Spreads a byte string over consecutive chunks, filling the current one first.
///
/// The last part stays in the current chunk, so the next items can follow it.
fn split(
    chunks: &mut Vec<ServiceInfo>,
    current: &mut ServiceInfo,
    key: &str,
    mut bytes: &[u8],
    mtu: usize,
) -> Result<(), Error> {
    while !bytes.is_empty() {
        let len = fitting_prefix(current, key, bytes, mtu)?;

        if len == 0 {
            if current.is_empty() {
                error!(key, mtu, "service info key exceeds the mtu");

                return Err(Error::new(ErrorKind::OutOfRange, "service info item exceeds mtu"));
            }

            chunks.push(std::mem::take(current));

            continue;
        }

        let (head, rest) = bytes.split_at(len);

        current.push(ServiceInfoKv::new(key, Bytes::new(head))?);
        bytes = rest;

        if !bytes.is_empty() {
            debug!(key, len, remaining = bytes.len(), "service info value split");

            chunks.push(std::mem::take(current));
        }
    }

    Ok(())
}

/// Splits the items in messages each encoding to at most `mtu` bytes.
///
/// The items keep their order. Only the last chunk is done, and an empty list still produces it.
/// A byte string value too big for the chunk is split in parts with the same key, the receiver
/// appends them. Other values must fit whole in a message.
pub fn chunk(items: &[ServiceInfoKv], mtu: u16) -> Result<Vec<Chunk>, Error> {
    let mtu = usize::from(mtu);

    let mut chunks: Vec<ServiceInfo> = Vec::new();
    let mut current: ServiceInfo = Vec::new();

    for item in items {
        current.push(item.clone());

        if encoded_len(&current)? <= mtu {
            continue;
        }

        current.pop();

        if let Some(bytes) = byte_string(item) {
            split(&mut chunks, &mut current, item.key(), &bytes, mtu)?;

            continue;
        }

        // Doesn't fit, close the chunk and start the next with this item.
        if current.is_empty() {
            error!(key = item.key(), mtu, "service info item exceeds the mtu");

            return Err(Error::new(ErrorKind::OutOfRange, "service info item exceeds mtu"));
        }

        chunks.push(std::mem::take(&mut current));
        current.push(item.clone());

        if encoded_len(&current)? > mtu {
            error!(key = item.key(), mtu, "service info item exceeds the mtu");

            return Err(Error::new(ErrorKind::OutOfRange, "service info item exceeds mtu"));
        }
    }

    chunks.push(current);

    let last = chunks.len() - 1;

    let chunks = chunks
        .into_iter()
        .enumerate()
        .map(|(i, items)| Chunk {
            is_more: i != last,
            is_done: i == last,
            items,
        })
        .collect();

    Ok(chunks)
}

/// Decodes the service info into a value used by the Device.
pub trait ServiceInfoDecode {
    /// The value built from the service info.
    type Output;

    /// Drops the values decoded so far.
    fn reset(&mut self) -> Result<(), Error>;

    /// Decodes a single [`ServiceInfoKv`].
    fn decode(&mut self, service_info: &ServiceInfoKv) -> Result<(), Error>;

    /// Validates and returns the value.
    fn finalize(&mut self) -> Result<Self::Output, Error>;
}

/// Skips the service info.
#[derive(Debug, Default)]
pub struct SkipServiceInfo {}

impl ServiceInfoDecode for SkipServiceInfo {
    type Output = ();

    fn reset(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn decode(&mut self, service_info: &ServiceInfoKv) -> Result<(), Error> {
        trace!(key = %service_info.key(), "skipping service info");

        Ok(())
    }

    fn finalize(&mut self) -> Result<Self::Output, Error> {
        Ok(())
    }
}

/// Keeps the key values of the selected modules, in order.
#[derive(Debug, Default)]
pub struct CollectServiceInfo {
    modules: Option<Vec<String>>,
    items: ServiceInfo,
}

impl CollectServiceInfo {
    /// Collects every module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects only the given modules.
    pub fn modules<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: Some(modules.into_iter().map(Into::into).collect()),
            items: Vec::new(),
        }
    }

    fn is_selected(&self, service_info: &ServiceInfoKv) -> bool {
        self.modules.as_ref().map_or(true, |modules| {
            modules.iter().any(|m| m == service_info.module())
        })
    }
}

impl ServiceInfoDecode for CollectServiceInfo {
    type Output = ServiceInfo;

    fn reset(&mut self) -> Result<(), Error> {
        self.items.clear();

        Ok(())
    }

    fn decode(&mut self, service_info: &ServiceInfoKv) -> Result<(), Error> {
        if !self.is_selected(service_info) {
            trace!(key = service_info.key(), "skipping module");

            return Ok(());
        }

        self.items.push(service_info.clone());

        Ok(())
    }

    fn finalize(&mut self) -> Result<Self::Output, Error> {
        Ok(std::mem::take(&mut self.items))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn items(n: usize) -> ServiceInfo {
        (0..n)
            .map(|i| ServiceInfoKv::new(format!("fdo_sys:item{i}"), &vec![i as u8; 40]).unwrap())
            .collect()
    }

    #[test]
    fn chunks_fit_mtu() {
        let items = items(20);
        let mtu = 200;

        let chunks = chunk(&items, mtu).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            let len = cbor_encode(&(chunk.is_more, chunk.is_done, &chunk.items))
                .unwrap()
                .len();

            assert!(len <= usize::from(mtu), "chunk of {len} bytes");
            assert!(!chunk.items.is_empty());
        }

        let done: Vec<bool> = chunks.iter().map(|c| c.is_done).collect();
        assert_eq!(done.iter().filter(|d| **d).count(), 1);
        assert_eq!(done.last(), Some(&true));
        assert!(chunks[..chunks.len() - 1].iter().all(|c| c.is_more));
        assert!(!chunks[chunks.len() - 1].is_more);

        let joined: ServiceInfo = chunks.into_iter().flat_map(|c| c.items).collect();
        assert_eq!(joined, items);
    }

    #[test]
    fn everything_fits_in_one_chunk() {
        let items = items(3);

        let chunks = chunk(&items, 1300).unwrap();

        assert_eq!(
            chunks,
            vec![Chunk {
                is_more: false,
                is_done: true,
                items,
            }]
        );
    }

    #[test]
    fn empty_list_is_one_done_chunk() {
        let chunks = chunk(&[], 1300).unwrap();

        assert_eq!(
            chunks,
            vec![Chunk {
                is_more: false,
                is_done: true,
                items: Vec::new(),
            }]
        );
    }

    #[test]
    fn oversized_item() {
        let items = vec![ServiceInfoKv::new("fdo_sys:write", &vec![0u8; 300]).unwrap()];

        let err = chunk(&items, 100).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn oversized_item_after_others() {
        let mut items = items(2);
        items.push(ServiceInfoKv::new("fdo_sys:write", &vec![0u8; 300]).unwrap());

        let err = chunk(&items, 200).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::OutOfRange);
    }

    fn assert_fits(chunks: &[Chunk], mtu: u16) {
        for chunk in chunks {
            let len = cbor_encode(&(chunk.is_more, chunk.is_done, &chunk.items))
                .unwrap()
                .len();

            assert!(len <= usize::from(mtu), "chunk of {len} bytes");
        }
    }

    fn joined_bytes(chunks: &[Chunk], key: &str) -> Vec<u8> {
        chunks
            .iter()
            .flat_map(|c| &c.items)
            .filter(|kv| kv.key() == key)
            .flat_map(|kv| kv.value::<ByteBuf>().unwrap().into_vec())
            .collect()
    }

    #[test]
    fn byte_string_split_across_chunks() {
        let data: Vec<u8> = (0..2600).map(|i| (i % 251) as u8).collect();
        let items = vec![ServiceInfoKv::new("fdo_sys:write", Bytes::new(&data)).unwrap()];

        let chunks = chunk(&items, 1300).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_fits(&chunks, 1300);
        assert!(chunks
            .iter()
            .flat_map(|c| &c.items)
            .all(|kv| kv.key() == "fdo_sys:write"));
        assert!(chunks[..2].iter().all(|c| c.is_more && !c.is_done));
        assert!(chunks[2].is_done);

        assert_eq!(joined_bytes(&chunks, "fdo_sys:write"), data);
    }

    #[test]
    fn byte_string_split_after_others() {
        let data = vec![0xaa; 500];
        let mut items = items(2);
        items.push(ServiceInfoKv::new("fdo_sys:write", Bytes::new(&data)).unwrap());
        items.push(ServiceInfoKv::new("fdo_sys:exec", &["ls"]).unwrap());

        let chunks = chunk(&items, 200).unwrap();

        assert_fits(&chunks, 200);
        assert_eq!(chunks[0].items[..2], items[..2]);
        assert_eq!(chunks[0].items[2].key(), "fdo_sys:write");

        let last = chunks.last().unwrap();
        assert_eq!(last.items.last(), items.last());

        assert_eq!(joined_bytes(&chunks, "fdo_sys:write"), data);
    }

    #[test]
    fn collect_selected_modules() {
        let info = vec![
            ServiceInfoKv::new("devmod:os", "linux").unwrap(),
            ServiceInfoKv::new("fdo_sys:filedesc", "hello.txt").unwrap(),
            ServiceInfoKv::new("fdo_sys:write", &b"hello".to_vec()).unwrap(),
        ];

        let mut collect = CollectServiceInfo::modules(["fdo_sys"]);
        for kv in &info {
            collect.decode(kv).unwrap();
        }

        let res = collect.finalize().unwrap();

        assert_eq!(res, info[1..].to_vec());

        let mut all = CollectServiceInfo::new();
        for kv in &info {
            all.decode(kv).unwrap();
        }
        all.reset().unwrap();

        assert!(all.finalize().unwrap().is_empty());
    }
}
