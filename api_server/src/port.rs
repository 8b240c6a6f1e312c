use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::process::Command;
use tracing::{info, warn};

/// Bind `host:port`. If the port is taken and `reclaim` is set, kill
/// whatever holds it and try once more.
pub async fn bind_with_reclaim(host: &str, port: u16, reclaim: bool) -> Result<TcpListener> {
    let bind_addr = format!("{}:{}", host, port);

    match TcpListener::bind(&bind_addr).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == ErrorKind::AddrInUse && reclaim => {
            warn!("⚠️  Port {} is in use, attempting to free it", port);
            free_port(port).await?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            TcpListener::bind(&bind_addr)
                .await
                .with_context(|| format!("Port {} is still in use after reclaim", port))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to bind {}", bind_addr)),
    }
}

async fn free_port(port: u16) -> Result<()> {
    let output = Command::new("lsof")
        .arg("-i")
        .arg(format!(":{}", port))
        .arg("-t")
        .output()
        .await
        .context("Failed to run lsof")?;

    let pids = parse_pids(&String::from_utf8_lossy(&output.stdout));
    if pids.is_empty() {
        warn!("⚠️  No process found holding port {}", port);
        return Ok(());
    }

    for pid in pids {
        info!("🔪 Killing process {} holding port {}", pid, port);
        let status = Command::new("kill")
            .arg("-9")
            .arg(pid.to_string())
            .status()
            .await
            .with_context(|| format!("Failed to run kill for pid {}", pid))?;
        if !status.success() {
            warn!("⚠️  kill -9 {} exited with {}", pid, status);
        }
    }

    Ok(())
}

fn parse_pids(lsof_output: &str) -> Vec<u32> {
    let own_pid = std::process::id();
    lsof_output
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .filter(|pid| *pid != own_pid)
        .collect()
}
