//! Materializes a template's declared [`ConfigFile`]s onto local disk and injects them into
//! containers via [`DockerClient::copy_to_container`].
//!
//! Config files are not associated with any one service, so the start lifecycle copies every
//! declared file into every container of the deployment. `copy_to_container` is used for both
//! local and SSH-tunneled remote nodes rather than a bind mount: a bind mount's source path
//! has to exist on the Docker daemon's own host, but materialization happens wherever the
//! orchestrator process runs, which is never the remote node's filesystem.
//! See `DESIGN.md` for the rationale.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::errors::{HosterError, HosterResult};
use crate::model::ConfigFile;
use crate::transport::DockerClient;

/// Directory a deployment's config files are materialized under, relative to `data_dir`.
fn deployment_config_dir(data_dir: &Path, deployment_id: Uuid) -> PathBuf {
    data_dir.join("configs").join(deployment_id.to_string())
}

/// Writes every declared config file to `{data_dir}/configs/{deployment_id}/{name}`, for
/// operator inspection and as the source [`copy_into_every_container`] reads back from.
pub async fn materialize(data_dir: &Path, deployment_id: Uuid, files: &[ConfigFile]) -> HosterResult<()> {
    if files.is_empty() {
        return Ok(());
    }
    let dir = deployment_config_dir(data_dir, deployment_id);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| HosterError::Config(format!("failed to create config directory {}: {e}", dir.display())))?;

    for file in files {
        let path = dir.join(&file.name);
        tokio::fs::write(&path, &file.content)
            .await
            .map_err(|e| HosterError::Config(format!("failed to write config file {}: {e}", path.display())))?;
        set_mode(&path, file.mode).await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> HosterResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(mode);
    tokio::fs::set_permissions(path, permissions)
        .await
        .map_err(|e| HosterError::Config(format!("failed to set mode on {}: {e}", path.display())))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> HosterResult<()> {
    Ok(())
}

/// Copies every declared config file's content into `container_id` at its `mount_path`.
pub async fn copy_into_container(
    client: &dyn DockerClient,
    container_id: &str,
    files: &[ConfigFile],
) -> HosterResult<()> {
    for file in files {
        client
            .copy_to_container(container_id, &file.mount_path, file.content.as_bytes())
            .await?;
    }
    Ok(())
}

/// Removes a deployment's materialized config directory, tolerating it already being gone.
pub async fn remove(data_dir: &Path, deployment_id: Uuid) -> HosterResult<()> {
    let dir = deployment_config_dir(data_dir, deployment_id);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HosterError::Config(format!("failed to remove config directory {}: {e}", dir.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> ConfigFile {
        ConfigFile {
            name: "nginx.conf".to_string(),
            mount_path: "/etc/nginx/nginx.conf".to_string(),
            content: "events {}\n".to_string(),
            mode: ConfigFile::DEFAULT_MODE,
        }
    }

    #[tokio::test]
    async fn materialize_then_remove_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let deployment_id = Uuid::new_v4();
        let files = vec![sample_file()];

        materialize(tmp.path(), deployment_id, &files).await.unwrap();
        let written = deployment_config_dir(tmp.path(), deployment_id).join("nginx.conf");
        assert!(written.exists());

        remove(tmp.path(), deployment_id).await.unwrap();
        assert!(!written.exists());
    }

    #[tokio::test]
    async fn remove_tolerates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        remove(tmp.path(), Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn no_files_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let deployment_id = Uuid::new_v4();
        materialize(tmp.path(), deployment_id, &[]).await.unwrap();
        assert!(!deployment_config_dir(tmp.path(), deployment_id).exists());
    }
}
