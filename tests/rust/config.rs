// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::anyhow::{
    ensure,
    Result,
};
use ::dpaa2_mbuf::{
    ensure_eq,
    runtime::{
        logging,
        memory::{
            BpListConfig,
            BufferPoolList,
            SoftPoolProvider,
        },
    },
    Config,
};
use ::std::{
    env,
    fs,
    path::PathBuf,
    sync::Mutex,
};

//==============================================================================
// Constants
//==============================================================================

/// Pool configuration used across tests.
const CONFIG: &str = r#"
dpaa2:
  buffer_pools:
    - buf_size: 2048
      num_bufs: 64
      depletion_entry: 8
      depletion_exit: 16
      meta_data_size: 128
    - buf_size: 512
      num_bufs: 256
      alignment: 128
"#;

/// Environment variable that overrides the buffer count of every pool.
const NUM_BUFS_ENV: &str = "DPAA2_NUM_BUFS";

/// Serializes tests that touch the environment.
static ENV_LOCK: Mutex<()> = Mutex::new(());

//==============================================================================
// Unit Tests
//==============================================================================

/// Tests loading a configuration file from disk.
#[test]
fn test_unit_config_from_file() -> Result<()> {
    logging::initialize();
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    env::remove_var(NUM_BUFS_ENV);

    let path: PathBuf = env::temp_dir().join(format!("dpaa2-mbuf-config-{}.yaml", std::process::id()));
    fs::write(&path, CONFIG)?;
    let config: Config = Config::new(&path.to_string_lossy())?;
    fs::remove_file(&path)?;

    let pools: BpListConfig = config.bp_list_config()?;
    ensure_eq!(pools.len(), 2);
    ensure_eq!(pools.pools()[0].get_buf_size(), 2048);
    ensure_eq!(pools.pools()[0].get_num_bufs(), 64);
    ensure_eq!(pools.pools()[0].get_depletion_entry(), 8);
    ensure_eq!(pools.pools()[0].get_depletion_exit(), 16);
    ensure_eq!(pools.pools()[0].get_meta_data_size(), 128);
    ensure_eq!(pools.pools()[1].get_alignment(), 128);

    // Creation sorts the pools by size.
    let list: BufferPoolList = BufferPoolList::create(&pools, &SoftPoolProvider::new())?;
    ensure_eq!(list.pools()[0].buf_size(), 512);
    ensure_eq!(list.pools()[1].data_room(), 1920);
    Ok(())
}

/// Tests that the environment overrides the buffer count of every pool.
#[test]
fn test_unit_config_env_override() -> Result<()> {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config: Config = CONFIG.parse()?;

    env::set_var(NUM_BUFS_ENV, "16");
    let pools: Result<BpListConfig, _> = config.bp_list_config();
    env::set_var(NUM_BUFS_ENV, "many");
    let bad: Result<BpListConfig, _> = config.bp_list_config();
    env::remove_var(NUM_BUFS_ENV);

    ensure!(pools?.pools().iter().all(|pool| pool.get_num_bufs() == 16));
    ensure!(bad.is_err_and(|e| e.errno == libc::EINVAL));
    Ok(())
}

/// Tests that missing files and sections are reported.
#[test]
fn test_unit_config_missing() -> Result<()> {
    ensure!(Config::new("/nonexistent/dpaa2.yaml").is_err());

    let config: Config = "other:\n  key: 1\n".parse()?;
    ensure!(config.bp_list_config().is_err_and(|e| e.errno == libc::EINVAL));

    let config: Config = "dpaa2:\n  buffer_pools:\n    - num_bufs: 4\n".parse()?;
    ensure!(config.bp_list_config().is_err());
    Ok(())
}
