// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    memory::{
        BpListConfig,
        BufferPoolConfig,
    },
};
use ::std::{
    fs,
    str::FromStr,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// DPAA2 options.
mod dpaa2_config {
    pub const SECTION_NAME: &str = "dpaa2";
    // List of buffer pools to register.
    pub const BUFFER_POOLS: &str = "buffer_pools";
    // Overrides the buffer count of every pool. Only read from the environment.
    pub const NUM_BUFS_OVERRIDE: &str = "dpaa2_num_bufs";
}

// Keys of a buffer pool entry.
mod buffer_pool_config {
    pub const BUF_SIZE: &str = "buf_size";
    pub const NUM_BUFS: &str = "num_bufs";
    pub const DEPLETION_ENTRY: &str = "depletion_entry";
    pub const DEPLETION_EXIT: &str = "depletion_exit";
    pub const META_DATA_SIZE: &str = "meta_data_size";
    pub const ALIGNMENT: &str = "alignment";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// DPAA2 configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let config_s: String = match fs::read_to_string(config_path) {
            Ok(s) => s,
            Err(e) => {
                let cause: String = format!("failed to read configuration file (path={:?}): {}", config_path, e);
                error!("new(): {}", cause);
                return Err(Fail::new(libc::EIO, &cause));
            },
        };
        config_s.parse()
    }

    /// Reads the buffer pool list. The buffer count of every pool is read from the environment variable first and
    /// then from the underlying configuration file.
    pub fn bp_list_config(&self) -> Result<BpListConfig, Fail> {
        let num_bufs_override: Option<u32> = Self::get_num_bufs_override()?;

        let mut config: BpListConfig = BpListConfig::new();
        for entry in self.get_pool_entries()? {
            let mut pool: BufferPoolConfig = Self::buffer_pool_config(entry)?;
            if let Some(num_bufs) = num_bufs_override {
                pool = pool.with_num_bufs(num_bufs);
            }
            config.push(pool)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn buffer_pool_config(entry: &Yaml) -> Result<BufferPoolConfig, Fail> {
        let mut pool: BufferPoolConfig = BufferPoolConfig::new(
            Self::require_pool_value(entry, buffer_pool_config::BUF_SIZE)?,
            Self::require_pool_value(entry, buffer_pool_config::NUM_BUFS)?,
        );
        let depletion_entry: Option<u32> = Self::get_pool_value(entry, buffer_pool_config::DEPLETION_ENTRY)?;
        let depletion_exit: Option<u32> = Self::get_pool_value(entry, buffer_pool_config::DEPLETION_EXIT)?;
        if depletion_entry.is_some() || depletion_exit.is_some() {
            let entry_threshold: u32 = depletion_entry.unwrap_or(0);
            pool = pool.with_depletion(entry_threshold, depletion_exit.unwrap_or(entry_threshold));
        }
        if let Some(meta_data_size) = Self::get_pool_value(entry, buffer_pool_config::META_DATA_SIZE)? {
            pool = pool.with_meta_data_size(meta_data_size);
        }
        if let Some(alignment) = Self::get_pool_value(entry, buffer_pool_config::ALIGNMENT)? {
            pool = pool.with_alignment(alignment);
        }
        Ok(pool)
    }

    //======================================================================================================================
    // Static Functions
    //======================================================================================================================

    /// Entries of the `buffer_pools` list inside the `dpaa2` section.
    fn get_pool_entries(&self) -> Result<&[Yaml], Fail> {
        let section: &Yaml = match &self.0[dpaa2_config::SECTION_NAME] {
            section @ Yaml::Hash(_) => section,
            other => return Err(Self::bad_option(dpaa2_config::SECTION_NAME, other)),
        };
        match &section[dpaa2_config::BUFFER_POOLS] {
            Yaml::Array(entries) => Ok(entries.as_slice()),
            other => Err(Self::bad_option(dpaa2_config::BUFFER_POOLS, other)),
        }
    }

    /// Buffer count that overrides every pool, if set in the environment.
    fn get_num_bufs_override() -> Result<Option<u32>, Fail> {
        let name: String = dpaa2_config::NUM_BUFS_OVERRIDE.to_uppercase();
        match ::std::env::var(&name) {
            Ok(var) => match var.parse::<u32>() {
                Ok(num_bufs) => Ok(Some(num_bufs)),
                Err(e) => {
                    let cause: String =
                        format!("invalid buffer count override (var={:?}, value={:?}): {}", name, var, e);
                    error!("get_num_bufs_override(): {}", cause);
                    Err(Fail::new(libc::EINVAL, &cause))
                },
            },
            Err(_) => Ok(None),
        }
    }

    /// Reads integer `key` of a pool entry. A missing key yields `None`; a value that does not fit `T` fails with
    /// `ERANGE`.
    fn get_pool_value<T: TryFrom<i64>>(entry: &Yaml, key: &str) -> Result<Option<T>, Fail> {
        match &entry[key] {
            Yaml::BadValue => Ok(None),
            Yaml::Integer(value) => match T::try_from(*value) {
                Ok(value) => Ok(Some(value)),
                Err(_) => {
                    let cause: String =
                        format!("buffer pool option is out of range (key={:?}, value={:?})", key, value);
                    error!("get_pool_value(): {}", cause);
                    Err(Fail::new(libc::ERANGE, &cause))
                },
            },
            other => Err(Self::bad_option(key, other)),
        }
    }

    /// Same as `get_pool_value`, but the key must be present.
    fn require_pool_value<T: TryFrom<i64>>(entry: &Yaml, key: &str) -> Result<T, Fail> {
        match Self::get_pool_value(entry, key)? {
            Some(value) => Ok(value),
            None => Err(Self::bad_option(key, &Yaml::BadValue)),
        }
    }

    fn bad_option(key: &str, value: &Yaml) -> Fail {
        let cause: String = match value {
            Yaml::BadValue => format!("missing configuration option {:?}", key),
            _ => format!("configuration option {:?} has unexpected type", key),
        };
        error!("bad_option(): {}", cause);
        Fail::new(libc::EINVAL, &cause)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl FromStr for Config {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Vec<Yaml> = YamlLoader::load_from_str(s)?;
        match &config[..] {
            [c] => Ok(Self(c.clone())),
            _ => Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
