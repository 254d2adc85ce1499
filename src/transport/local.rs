//! A [`DockerClient`] backed by a `docker` CLI process, talking to whatever daemon
//! `DOCKER_HOST` points at (the local Unix socket, or a node pool's SSH-tunneled socket).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use super::executor::{ExecutionConfig, ProcessExecutor};
use super::{
    ContainerInspection, ContainerSpec, ContainerStats, DockerClient, LogLine, LogStream,
    TransportError,
};

/// Docker client that shells out to the `docker` CLI for every operation.
#[derive(Debug, Clone)]
pub struct LocalDockerClient {
    executor: ProcessExecutor,
    /// `DOCKER_HOST` value this client's invocations carry, if any (unset means the local
    /// default socket).
    docker_host: Option<String>,
}

impl LocalDockerClient {
    /// Builds a client against the local Docker daemon, auto-detecting the `docker` binary.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::DockerNotFound`] if no `docker` binary is on `PATH`.
    pub fn new() -> Result<Self, TransportError> {
        let docker_path = super::executor::find_docker_binary()?;
        info!(path = %docker_path.display(), "using local docker binary");
        Ok(Self {
            executor: ProcessExecutor::new(docker_path),
            docker_host: None,
        })
    }

    /// Builds a client that directs every `docker` invocation at `docker_host`
    /// (`unix:///...` or `tcp://127.0.0.1:PORT`), used for SSH-tunneled remote nodes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::DockerNotFound`] if no `docker` binary is on `PATH`.
    pub fn with_docker_host(docker_host: impl Into<String>) -> Result<Self, TransportError> {
        let docker_path = super::executor::find_docker_binary()?;
        Ok(Self {
            executor: ProcessExecutor::new(docker_path),
            docker_host: Some(docker_host.into()),
        })
    }

    fn config(&self) -> ExecutionConfig {
        let mut config = ExecutionConfig::default();
        if let Some(host) = &self.docker_host {
            config.environment.insert("DOCKER_HOST".to_string(), host.clone());
        }
        config
    }

    fn labels_args(labels: &HashMap<String, String>) -> Vec<String> {
        labels
            .iter()
            .flat_map(|(k, v)| vec!["--label".to_string(), format!("{k}={v}")])
            .collect()
    }
}

#[async_trait]
impl DockerClient for LocalDockerClient {
    async fn pull_image(&self, image_ref: &str) -> Result<(), TransportError> {
        debug!(image = image_ref, "pulling image");
        self.executor
            .execute(&["pull".to_string(), image_ref.to_string()], Some(self.config()))
            .await?;
        Ok(())
    }

    async fn create_network(&self, name: &str, labels: &HashMap<String, String>) -> Result<(), TransportError> {
        let mut args = vec!["network".to_string(), "create".to_string()];
        args.extend(Self::labels_args(labels));
        args.push(name.to_string());
        self.executor.execute(&args, Some(self.config())).await?;
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), TransportError> {
        self.executor
            .execute(&["network".to_string(), "rm".to_string(), name.to_string()], Some(self.config()))
            .await?;
        Ok(())
    }

    async fn create_volume(&self, name: &str, labels: &HashMap<String, String>) -> Result<(), TransportError> {
        let mut args = vec!["volume".to_string(), "create".to_string()];
        args.extend(Self::labels_args(labels));
        args.push(name.to_string());
        self.executor.execute(&args, Some(self.config())).await?;
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), TransportError> {
        self.executor
            .execute(&["volume".to_string(), "rm".to_string(), name.to_string()], Some(self.config()))
            .await?;
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, TransportError> {
        let mut args = vec!["create".to_string(), "--name".to_string(), spec.name.clone()];

        for (key, value) in &spec.env {
            args.push("--env".to_string());
            args.push(format!("{key}={value}"));
        }
        for (key, value) in &spec.labels {
            args.push("--label".to_string());
            args.push(format!("{key}={value}"));
        }
        for port in &spec.ports {
            let proto = match port.protocol {
                crate::compose::Protocol::Tcp => "tcp",
                crate::compose::Protocol::Udp => "udp",
            };
            let publish = match port.host_port {
                Some(host) => format!("{host}:{}/{proto}", port.container_port),
                None => format!("{}/{proto}", port.container_port),
            };
            args.push("--publish".to_string());
            args.push(publish);
        }
        for volume in &spec.volumes {
            let suffix = if volume.read_only { ":ro" } else { "" };
            args.push("--volume".to_string());
            args.push(format!("{}:{}{suffix}", volume.source, volume.target));
        }
        if let Some(network) = &spec.network {
            args.push("--network".to_string());
            args.push(network.name.clone());
            args.push("--network-alias".to_string());
            args.push(network.alias.clone());
        }
        if !spec.restart_policy.is_empty() {
            args.push("--restart".to_string());
            args.push(spec.restart_policy.clone());
        }
        if let Some(healthcheck) = &spec.healthcheck {
            args.push("--health-cmd".to_string());
            args.push(healthcheck.join(" "));
        }
        if !spec.entrypoint.is_empty() {
            args.push("--entrypoint".to_string());
            args.push(spec.entrypoint.join(" "));
        }

        args.push(spec.image.clone());
        args.extend(spec.command.clone());

        let output = self.executor.execute(&args, Some(self.config())).await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn start_container(&self, id: &str) -> Result<(), TransportError> {
        self.executor
            .execute(&["start".to_string(), id.to_string()], Some(self.config()))
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), TransportError> {
        self.executor
            .execute(
                &[
                    "stop".to_string(),
                    "--time".to_string(),
                    timeout.as_secs().to_string(),
                    id.to_string(),
                ],
                Some(self.config()),
            )
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), TransportError> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(id.to_string());
        self.executor.execute(&args, Some(self.config())).await?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspection, TransportError> {
        let output = self
            .executor
            .execute(
                &["inspect".to_string(), id.to_string()],
                Some(self.config()),
            )
            .await?;

        let parsed: Vec<InspectEntry> = serde_json::from_str(&output.stdout)
            .map_err(|e| TransportError::Io(format!("parsing docker inspect output: {e}")))?;
        let entry = parsed
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Io("docker inspect returned no entries".to_string()))?;

        let published_ports = entry
            .network_settings
            .ports
            .into_iter()
            .filter_map(|(key, bindings)| {
                let binding = bindings?.into_iter().next()?;
                let host_port: u16 = binding.host_port.parse().ok()?;
                Some((key, host_port))
            })
            .collect();

        Ok(ContainerInspection {
            id: entry.id,
            status: entry.state.status,
            published_ports,
            healthy: entry.state.health.map(|h| h.status == "healthy"),
        })
    }

    async fn container_stats(
        &self,
        id: &str,
    ) -> Result<BoxStream<'static, Result<ContainerStats, TransportError>>, TransportError> {
        let docker_host = self.docker_host.clone();
        let docker_path = self.executor.docker_path.clone();
        let id = id.to_string();
        let (tx, rx) = tokio::sync::mpsc::channel(16);

        tokio::spawn(async move {
            let mut command = tokio::process::Command::new(&docker_path);
            command
                .arg("stats")
                .arg("--no-trunc")
                .arg("--format")
                .arg("{{json .}}")
                .arg(&id);
            if let Some(host) = &docker_host {
                command.env("DOCKER_HOST", host);
            }
            command.stdout(std::process::Stdio::piped());

            let mut child = match command.spawn() {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send(Err(TransportError::Io(format!("spawning docker stats: {e}")))).await;
                    return;
                }
            };
            let Some(stdout) = child.stdout.take() else { return };
            let mut lines = tokio::io::BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let parsed = parse_stats_line(&line);
                if tx.send(parsed).await.is_err() {
                    break;
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn container_logs(
        &self,
        id: &str,
        tail: Option<u32>,
        since: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<BoxStream<'static, Result<LogLine, TransportError>>, TransportError> {
        let docker_host = self.docker_host.clone();
        let docker_path = self.executor.docker_path.clone();
        let id = id.to_string();
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut command = tokio::process::Command::new(&docker_path);
            command.arg("logs").arg("--follow").arg("--timestamps");
            if let Some(tail) = tail {
                command.arg("--tail").arg(tail.to_string());
            }
            if let Some(since) = since {
                command.arg("--since").arg(since.to_rfc3339());
            }
            command.arg(&id);
            if let Some(host) = &docker_host {
                command.env("DOCKER_HOST", host);
            }
            command.stdout(std::process::Stdio::piped());
            command.stderr(std::process::Stdio::piped());

            let mut child = match command.spawn() {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send(Err(TransportError::Io(format!("spawning docker logs: {e}")))).await;
                    return;
                }
            };
            let Some(stdout) = child.stdout.take() else { return };
            let mut lines = tokio::io::BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(Ok(parse_log_line(&line, LogStream::Stdout))).await.is_err() {
                    break;
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn copy_to_container(&self, id: &str, path: &str, bytes: &[u8]) -> Result<(), TransportError> {
        let mut config = self.config();
        config.stdin_data = Some(bytes.to_vec());
        self.executor
            .execute(
                &[
                    "cp".to_string(),
                    "-".to_string(),
                    format!("{id}:{path}"),
                ],
                Some(config),
            )
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.executor.ping(Some(self.config())).await
    }
}

fn parse_stats_line(line: &str) -> Result<ContainerStats, TransportError> {
    #[derive(Deserialize)]
    struct Raw {
        #[serde(rename = "CPUPerc")]
        cpu_perc: String,
        #[serde(rename = "MemUsage")]
        mem_usage: String,
        #[serde(rename = "NetIO")]
        net_io: String,
        #[serde(rename = "BlockIO")]
        block_io: String,
        #[serde(rename = "PIDs")]
        pids: String,
    }

    let raw: Raw = serde_json::from_str(line)
        .map_err(|e| TransportError::Io(format!("parsing docker stats line: {e}")))?;

    let cpu_fraction = raw
        .cpu_perc
        .trim_end_matches('%')
        .parse::<f64>()
        .unwrap_or(0.0)
        / 100.0;

    let (mem_usage, mem_limit) = raw
        .mem_usage
        .split_once(" / ")
        .map(|(a, b)| (parse_byte_size(a), parse_byte_size(b)))
        .unwrap_or((0, 0));

    let (net_rx, net_tx) = raw
        .net_io
        .split_once(" / ")
        .map(|(a, b)| (parse_byte_size(a), parse_byte_size(b)))
        .unwrap_or((0, 0));

    let (block_read, block_write) = raw
        .block_io
        .split_once(" / ")
        .map(|(a, b)| (parse_byte_size(a), parse_byte_size(b)))
        .unwrap_or((0, 0));

    let pid_count = raw.pids.trim().parse::<u64>().unwrap_or(0);

    Ok(ContainerStats {
        cpu_fraction,
        memory_usage_bytes: mem_usage,
        memory_limit_bytes: mem_limit,
        network_rx_bytes: net_rx,
        network_tx_bytes: net_tx,
        block_read_bytes: block_read,
        block_write_bytes: block_write,
        pid_count,
    })
}

fn parse_byte_size(raw: &str) -> u64 {
    let raw = raw.trim();
    let split_at = raw
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(raw.len());
    let (digits, suffix) = raw.split_at(split_at);
    let value: f64 = digits.parse().unwrap_or(0.0);
    let multiplier = match suffix.trim().to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KB" | "KIB" => 1024.0,
        "MB" | "MIB" => 1024.0 * 1024.0,
        "GB" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };
    (value * multiplier) as u64
}

fn parse_log_line(raw: &str, stream: LogStream) -> LogLine {
    if let Some((ts, rest)) = raw.split_once(' ') {
        if let Ok(timestamp) = chrono::DateTime::parse_from_rfc3339(ts) {
            return LogLine {
                stream,
                timestamp: Some(timestamp.with_timezone(&chrono::Utc)),
                message: rest.to_string(),
            };
        }
    }
    LogLine {
        stream,
        timestamp: None,
        message: raw.to_string(),
    }
}

#[derive(Deserialize)]
struct InspectEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "State")]
    state: InspectState,
    #[serde(rename = "NetworkSettings")]
    network_settings: InspectNetworkSettings,
}

#[derive(Deserialize)]
struct InspectState {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Health")]
    health: Option<InspectHealth>,
}

#[derive(Deserialize)]
struct InspectHealth {
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Deserialize)]
struct InspectNetworkSettings {
    #[serde(rename = "Ports")]
    ports: HashMap<String, Option<Vec<InspectPortBinding>>>,
}

#[derive(Deserialize)]
struct InspectPortBinding {
    #[serde(rename = "HostPort")]
    host_port: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_byte_size_suffixes() {
        assert_eq!(parse_byte_size("1.5MiB"), (1.5 * 1024.0 * 1024.0) as u64);
        assert_eq!(parse_byte_size("512B"), 512);
    }

    #[test]
    fn parses_stats_percent_and_usage() {
        let line = r#"{"CPUPerc":"12.50%","MemUsage":"100MiB / 512MiB","NetIO":"1kB / 2kB","BlockIO":"3kB / 4kB","PIDs":"7"}"#;
        let stats = parse_stats_line(line).unwrap();
        assert!((stats.cpu_fraction - 0.125).abs() < 1e-9);
        assert_eq!(stats.memory_usage_bytes, 100 * 1024 * 1024);
        assert_eq!(stats.memory_limit_bytes, 512 * 1024 * 1024);
        assert_eq!(stats.block_read_bytes, 3 * 1024);
        assert_eq!(stats.block_write_bytes, 4 * 1024);
        assert_eq!(stats.pid_count, 7);
    }

    #[test]
    fn log_line_parses_leading_timestamp() {
        let line = parse_log_line("2026-01-01T00:00:00.000000000Z listening on :80", LogStream::Stdout);
        assert!(line.timestamp.is_some());
        assert_eq!(line.message, "listening on :80");
    }

    #[test]
    fn log_line_without_timestamp_falls_back() {
        let line = parse_log_line("not a timestamp at all", LogStream::Stderr);
        assert!(line.timestamp.is_none());
        assert_eq!(line.message, "not a timestamp at all");
    }
}
