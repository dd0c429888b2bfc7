//! Volume mapping resolution
//!
//! Turns configured claims plus the optional `-v src:dest` token of a `run`
//! invocation into the list of PVC mounts for the job. The caller clones
//! repositories under a shared prefix (e.g. `/git/<repo>`) that lives on a
//! PVC; inside the job the same directory is reached by mounting that PVC
//! with the repo directory as sub-path.

use std::path::{Component, Path, PathBuf};

use podjob_common::{Error, Result};

/// Setting name reported when a `-v` token is malformed
pub const VOLUME_ARG_SETTING: &str = "-v";

/// A persistent volume claim bound into the workload container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    claim_name: String,
    mount_path: String,
    sub_path: Option<String>,
}

impl VolumeMount {
    /// Create a mount, rejecting empty names and absolute sub-paths
    pub fn new(
        claim_name: impl Into<String>,
        mount_path: impl Into<String>,
        sub_path: Option<String>,
    ) -> Result<Self> {
        let claim_name = claim_name.into();
        let mount_path = mount_path.into();

        if claim_name.is_empty() {
            return Err(Error::configuration(
                "claim_name",
                format!("empty claim name for mount path '{}'", mount_path),
            ));
        }
        if mount_path.is_empty() {
            return Err(Error::configuration(
                "mount_path",
                format!("empty mount path for claim '{}'", claim_name),
            ));
        }
        if let Some(ref sub) = sub_path {
            if sub.starts_with('/') {
                return Err(Error::configuration(
                    "sub_path",
                    format!("sub-path '{}' must be relative", sub),
                ));
            }
        }

        Ok(Self {
            claim_name,
            mount_path,
            sub_path: sub_path.filter(|s| !s.is_empty()),
        })
    }

    /// Name of the PersistentVolumeClaim
    pub fn claim_name(&self) -> &str {
        &self.claim_name
    }

    /// Path inside the container
    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    /// Directory inside the claim exposed at the mount path
    pub fn sub_path(&self) -> Option<&str> {
        self.sub_path.as_deref()
    }
}

/// Where the `-v` source directory is mounted inside the job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVolume {
    /// Claim holding the caller's clone directory
    pub claim_name: String,
    /// Container path the clone appears at
    pub mount_path: String,
    /// Prefix of the caller's clone paths; the remainder becomes the sub-path
    pub clone_path_prefix: PathBuf,
}

/// Volume configuration for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeConfig {
    /// Mounts present on every job
    pub base: Vec<VolumeMount>,
    /// Binding for the `-v` source directory
    pub source: SourceVolume,
}

/// Parse a delimited list of `claim:mount_path` pairs
///
/// Pairs are separated by commas; surrounding whitespace and empty entries
/// are ignored. `setting` names the source of `raw` in error messages.
pub fn parse_claim_mappings(setting: &str, raw: &str) -> Result<Vec<VolumeMount>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').collect();
            match parts.as_slice() {
                [claim, mount] => VolumeMount::new(claim.trim(), mount.trim(), None)
                    .map_err(|e| Error::configuration(setting, e.to_string())),
                _ => Err(Error::configuration(
                    setting,
                    format!("expected claim:mount_path, got '{}'", entry),
                )),
            }
        })
        .collect()
}

/// Derive the sub-path of `source` below `prefix`
///
/// The comparison is per path component, so `/gitx/repo` is not below `/git`.
/// A source equal to the prefix yields no sub-path.
pub fn source_sub_path(prefix: &Path, source: &str) -> Result<Option<String>> {
    let relative = Path::new(source).strip_prefix(prefix).map_err(|_| {
        Error::configuration(
            VOLUME_ARG_SETTING,
            format!(
                "source path '{}' is not under clone path '{}'",
                source,
                prefix.display()
            ),
        )
    })?;

    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(Error::configuration(
            VOLUME_ARG_SETTING,
            format!("source path '{}' escapes clone path", source),
        ));
    }

    let sub = relative.to_string_lossy().into_owned();
    Ok(if sub.is_empty() { None } else { Some(sub) })
}

/// Resolve the mounts for a run
///
/// Base mounts come first in configuration order. When the invocation carried
/// a `-v src:dest` token, the source directory is appended, bound into the
/// configured source claim. The token's `dest` is not used: the container
/// path comes from configuration.
pub fn resolve_volumes(config: &VolumeConfig, volume_arg: Option<&str>) -> Result<Vec<VolumeMount>> {
    let mut mounts = config.base.clone();

    if let Some(arg) = volume_arg {
        let (source, _dest) = arg.split_once(':').ok_or_else(|| {
            Error::configuration(
                VOLUME_ARG_SETTING,
                format!("expected source:dest, got '{}'", arg),
            )
        })?;

        let sub_path = source_sub_path(&config.source.clone_path_prefix, source)?;
        mounts.push(VolumeMount::new(
            config.source.claim_name.clone(),
            config.source.mount_path.clone(),
            sub_path,
        )?);
    }

    Ok(mounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VolumeConfig {
        VolumeConfig {
            base: vec![
                VolumeMount::new("mergestat-trivy-pvc", "/trivy", None).unwrap(),
                VolumeMount::new("maven-git-pvc", "/maven", None).unwrap(),
            ],
            source: SourceVolume {
                claim_name: "mergestat-git-pvc".to_string(),
                mount_path: "/mergestat/repo".to_string(),
                clone_path_prefix: PathBuf::from("/git"),
            },
        }
    }

    #[test]
    fn strips_clone_prefix_into_sub_path() {
        let mounts = resolve_volumes(&config(), Some("/git/repo-abc:/mergestat/repo")).unwrap();
        let source = mounts.last().unwrap();
        assert_eq!(source.claim_name(), "mergestat-git-pvc");
        assert_eq!(source.mount_path(), "/mergestat/repo");
        assert_eq!(source.sub_path(), Some("repo-abc"));
    }

    #[test]
    fn source_mount_is_appended_after_base() {
        let mounts = resolve_volumes(&config(), Some("/git/repo-abc:/mergestat/repo")).unwrap();
        let claims: Vec<&str> = mounts.iter().map(|m| m.claim_name()).collect();
        assert_eq!(
            claims,
            vec!["mergestat-trivy-pvc", "maven-git-pvc", "mergestat-git-pvc"]
        );
    }

    #[test]
    fn source_outside_prefix_is_rejected() {
        let err = resolve_volumes(&config(), Some("/tmp/repo-abc:/mergestat/repo")).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn prefix_match_is_per_component() {
        let err = source_sub_path(Path::new("/git"), "/gitx/repo").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn parent_components_are_rejected() {
        assert!(source_sub_path(Path::new("/git"), "/git/../etc").is_err());
    }

    #[test]
    fn trailing_slash_on_prefix_is_tolerated() {
        let sub = source_sub_path(Path::new("/git/"), "/git/repo-abc").unwrap();
        assert_eq!(sub.as_deref(), Some("repo-abc"));
    }

    #[test]
    fn source_equal_to_prefix_has_no_sub_path() {
        assert_eq!(source_sub_path(Path::new("/git"), "/git").unwrap(), None);
    }

    #[test]
    fn volume_token_without_separator_is_rejected() {
        let err = resolve_volumes(&config(), Some("/git/repo-abc")).unwrap_err();
        assert!(matches!(err, Error::Configuration { ref setting, .. } if setting == "-v"));
    }

    #[test]
    fn no_volume_token_uses_base_only() {
        let mounts = resolve_volumes(&config(), None).unwrap();
        assert_eq!(mounts, config().base);
    }

    #[test]
    fn parses_claim_mappings() {
        let mounts =
            parse_claim_mappings("VOLUME_MAPPINGS", "cache-a:/a, cache-b:/b/c ,").unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].claim_name(), "cache-a");
        assert_eq!(mounts[0].mount_path(), "/a");
        assert_eq!(mounts[1].claim_name(), "cache-b");
        assert_eq!(mounts[1].mount_path(), "/b/c");
        assert!(mounts.iter().all(|m| m.sub_path().is_none()));
    }

    #[test]
    fn claim_mapping_with_wrong_arity_is_rejected() {
        for raw in ["cache-a", "cache-a:/a:/b", "cache-a:/a,cache-b"] {
            let err = parse_claim_mappings("VOLUME_MAPPINGS", raw).unwrap_err();
            assert!(
                matches!(err, Error::Configuration { ref setting, .. } if setting == "VOLUME_MAPPINGS"),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn claim_mapping_with_empty_side_is_rejected() {
        assert!(parse_claim_mappings("VOLUME_MAPPINGS", ":/a").is_err());
        assert!(parse_claim_mappings("VOLUME_MAPPINGS", "cache-a:").is_err());
    }

    #[test]
    fn absolute_sub_path_is_rejected() {
        assert!(VolumeMount::new("claim", "/mnt", Some("/abs".to_string())).is_err());
    }
}
