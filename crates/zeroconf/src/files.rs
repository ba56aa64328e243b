//! Local config file writer.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use zeroconf_common::{Result, ZeroConfFile};

/// Create (or truncate) `dir/file`, write `contents`, and fsync before closing.
pub async fn save_config(dir: &Path, file: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(file);

    let mut handle = tokio::fs::File::create(&path).await?;
    handle.write_all(contents.as_bytes()).await?;
    handle.sync_all().await?;

    tracing::debug!(path = %path.display(), bytes = contents.len(), "Config file written");
    Ok(path)
}

/// Write `zeroconf.json` with the registrar address and registration token.
pub async fn save_zeroconf_file(
    dir: &Path,
    file: &str,
    address: &str,
    token: &str,
) -> Result<PathBuf> {
    let content = to_tab_json(&ZeroConfFile {
        address: address.to_string(),
        token: token.to_string(),
    })?;

    save_config(dir, file, &content).await
}

/// Pretty JSON indented with tabs, the layout Consul tooling writes.
pub fn to_tab_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;

    // serde_json only emits valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
