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

//! Type to manage [`ServiceInfo`].
//!
//! The ServiceInfo type is a collection of key-value pairs which allows an interaction between the
//! Management Service (on the cloud side) and Management Agent functions (on the Device side),
//! using the FIDO Device Onboard encrypted channel as a transport.
//!
//! See <https://fidoalliance.org/specs/FDO/FIDO-Device-Onboard-PS-v1.1-20220419/FIDO-Device-Onboard-PS-v1.1-20220419.html#ServiceInfo>.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::utils::{cbor_decode, cbor_encode};
use crate::Error;

/// ```cddl
/// ServiceInfo = [
///     * ServiceInfoKV
/// ]
/// ```
pub type ServiceInfo = Vec<ServiceInfoKv>;

/// ```cddl
/// ServiceInfoKV = [
///     ServiceInfoKey: tstr,
///     ServiceInfoVal: bstr .cbor any
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInfoKv {
    pub(crate) service_info_key: String,
    pub(crate) service_info_val: ByteBuf,
}

impl ServiceInfoKv {
    /// Creates a service info key value, encoding the value as CBOR.
    pub fn new<T>(service_info_key: impl Into<String>, value: &T) -> Result<Self, Error>
    where
        T: Serialize + ?Sized,
    {
        Ok(Self {
            service_info_key: service_info_key.into(),
            service_info_val: ByteBuf::from(cbor_encode(value)?),
        })
    }

    /// Return the service info key
    pub fn key(&self) -> &str {
        &self.service_info_key
    }

    /// Return the encoded service info value
    pub fn value_as_bytes(&self) -> &[u8] {
        &self.service_info_val
    }

    /// Return the service info value
    pub fn value<T>(&self) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        cbor_decode(&self.service_info_val)
    }

    /// Returns the module of the key, the part before the colon.
    pub fn module(&self) -> &str {
        self.service_info_key
            .split_once(':')
            .map_or(self.service_info_key.as_str(), |(module, _)| module)
    }
}

impl Serialize for ServiceInfoKv {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            service_info_key,
            service_info_val,
        } = self;

        (service_info_key, service_info_val).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ServiceInfoKv {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (service_info_key, service_info_val) = Deserialize::deserialize(deserializer)?;

        Ok(Self {
            service_info_key,
            service_info_val,
        })
    }
}

/// Device [`ServiceInfo`] devmod Module.
///
/// The “devmod” module implements a set of messages to the FIDO Device Onboard Owner that identify
/// the capabilities of the device. All “devmod” messages are sent by the Device in the first
/// Device ServiceInfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Devmod {
    /// OS name (e.g., Linux)
    pub os: String,
    /// Architecture name / instruction set (e.g., X86_64)
    pub arch: String,
    /// Version of OS (e.g., “Ubuntu* 16.0.4LTS”)
    pub version: String,
    /// Model specifier for this FIDO Device Onboard Device, manufacturer specific
    pub device: String,
    /// Serial number for this FIDO Device Onboard Device, manufacturer specific
    pub sn: Option<String>,
    /// Filename separator, that works to make lists of file names (e.g., ‘:’ or ‘;’)
    pub sep: String,
    /// Machine formats that can be interpreted by this device, separated by the “sep” value
    pub bin: String,
    /// Modules supported by this FIDO Device Onboard Device, excluding devmod
    pub modules: Vec<String>,
}

impl Devmod {
    /// Name of the module.
    pub const MODULE: &'static str = "devmod";
    /// Key that marks the module active.
    pub const ACTIVE: &'static str = "devmod:active";

    /// Creates the module for the running platform.
    pub fn for_platform(device: impl Into<String>, sn: Option<String>) -> Self {
        let arch = std::env::consts::ARCH.to_string();

        Self {
            os: std::env::consts::OS.to_string(),
            bin: arch.clone(),
            arch,
            version: env!("CARGO_PKG_VERSION").to_string(),
            device: device.into(),
            sn,
            sep: ":".to_string(),
            modules: Vec::new(),
        }
    }

    /// Returns the required key values.
    pub fn service_info(&self) -> Result<ServiceInfo, Error> {
        let mut info = vec![
            ServiceInfoKv::new(Self::ACTIVE, &true)?,
            ServiceInfoKv::new("devmod:os", &self.os)?,
            ServiceInfoKv::new("devmod:arch", &self.arch)?,
            ServiceInfoKv::new("devmod:version", &self.version)?,
            ServiceInfoKv::new("devmod:device", &self.device)?,
        ];

        if let Some(sn) = &self.sn {
            info.push(ServiceInfoKv::new("devmod:sn", sn)?);
        }

        info.push(ServiceInfoKv::new("devmod:sep", &self.sep)?);
        info.push(ServiceInfoKv::new("devmod:bin", &self.bin)?);

        let modules: Vec<&str> = std::iter::once(Self::MODULE)
            .chain(self.modules.iter().map(String::as_str))
            .collect();

        info.push(ServiceInfoKv::new("devmod:nummodules", &modules.len())?);

        // [first index, number of modules, names...]
        let list = ModuleList {
            start: 0,
            names: modules,
        };
        info.push(ServiceInfoKv::new("devmod:modules", &list)?);

        Ok(info)
    }
}

/// Module list sent as `[uint, uint, tstr1, tstr2, ...]`.
struct ModuleList<'a> {
    start: usize,
    names: Vec<&'a str>,
}

impl Serialize for ModuleList<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;

        let mut seq = serializer.serialize_seq(Some(self.names.len() + 2))?;
        seq.serialize_element(&self.start)?;
        seq.serialize_element(&self.names.len())?;
        for name in &self.names {
            seq.serialize_element(name)?;
        }

        seq.end()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    pub(crate) fn create_devmod() -> Devmod {
        Devmod {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            version: "1.0.0".to_string(),
            device: "model".to_string(),
            sn: Some("AABCCDDDEEF".to_string()),
            sep: ":".to_string(),
            bin: "x86_64".to_string(),
            modules: vec!["fdo_sys".to_string()],
        }
    }

    #[test]
    fn service_info_roundtrip() {
        let info = vec![ServiceInfoKv::new("devmod:os", "Linux").unwrap()];

        let buf = cbor_encode(&info).unwrap();

        // [["devmod:os", h'654c696e7578']]
        assert_eq!(buf[..3], [0x81, 0x82, 0x69]);
        assert_eq!(buf[buf.len() - 7..], *b"\x46\x65Linux");

        let res: ServiceInfo = cbor_decode(&buf).unwrap();

        assert_eq!(res, info);
    }

    #[test]
    fn service_info_value() {
        let kv = ServiceInfoKv::new("fdo_sys:write", &42u32).unwrap();

        assert_eq!(kv.key(), "fdo_sys:write");
        assert_eq!(kv.module(), "fdo_sys");
        assert_eq!(kv.value_as_bytes(), [0x18, 0x2a]);
        assert_eq!(kv.value::<u32>().unwrap(), 42);
        assert!(kv.value::<String>().is_err());
    }

    #[test]
    fn devmod_keys() {
        let info = create_devmod().service_info().unwrap();

        let keys: Vec<&str> = info.iter().map(ServiceInfoKv::key).collect();

        insta::assert_snapshot!(keys.join("\n"), @r"
        devmod:active
        devmod:os
        devmod:arch
        devmod:version
        devmod:device
        devmod:sn
        devmod:sep
        devmod:bin
        devmod:nummodules
        devmod:modules
        ");

        assert!(info[0].value::<bool>().unwrap());
        assert_eq!(info[8].value::<usize>().unwrap(), 2);

        let modules: (usize, usize, String, String) = info[9].value().unwrap();
        assert_eq!(
            modules,
            (0, 2, "devmod".to_string(), "fdo_sys".to_string())
        );
    }

    #[test]
    fn devmod_for_platform() {
        let devmod = Devmod::for_platform("model", None);

        assert_eq!(devmod.os, std::env::consts::OS);
        assert_eq!(devmod.bin, devmod.arch);

        let info = devmod.service_info().unwrap();
        assert!(info.iter().all(|kv| kv.module() == Devmod::MODULE));
        assert!(!info.iter().any(|kv| kv.key() == "devmod:sn"));
    }
}
