//! `--env-file` loading

use std::collections::BTreeMap;
use std::path::Path;

use podjob_common::{Error, Result};

/// Read a `KEY=value` file into an ordered map
///
/// Later keys win over earlier ones. The values are passed to the workload
/// as-is and never logged.
pub fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| env_file_error(path, e))?;

    let mut env = BTreeMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| env_file_error(path, e))?;
        env.insert(key, value);
    }
    Ok(env)
}

fn env_file_error(path: &Path, err: dotenvy::Error) -> Error {
    match err {
        dotenvy::Error::Io(source) => Error::io(path, source),
        other => Error::EnvFile {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    }
}
