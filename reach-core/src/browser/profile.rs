use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::error::{BrowserError, BrowserResult};

/// A persistent Chromium user-data directory holding the cookies and local
/// storage of one (platform, session) pair.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    platform: String,
    session: String,
    path: PathBuf,
}

impl BrowserProfile {
    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn id(&self) -> String {
        format!("{}/{}", self.platform, self.session)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn touch(&self) -> BrowserResult<()> {
        if self.path.exists() {
            let marker = self.path.join(".last_used");
            let mut file = fs::File::create(&marker).await.map_err(|err| {
                BrowserError::Profile(format!("failed to write profile marker: {err}"))
            })?;
            file.write_all(Utc::now().to_rfc3339().as_bytes())
                .await
                .map_err(|err| {
                    BrowserError::Profile(format!("failed to update profile marker: {err}"))
                })?;
        }
        Ok(())
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        let raw = std::fs::read_to_string(self.path.join(".last_used")).ok()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|value| value.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone)]
pub struct SessionProfiles {
    base_dir: PathBuf,
    ttl: Duration,
}

impl SessionProfiles {
    pub fn new<P: AsRef<Path>>(base_dir: P, ttl: Duration) -> BrowserResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to create profile base dir: {err}"))
        })?;
        Ok(Self { base_dir, ttl })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn open(&self, platform: &str, session: &str) -> BrowserResult<BrowserProfile> {
        let platform = sanitize(platform)?;
        let session = sanitize(session)?;
        let path = self.base_dir.join(&platform).join(&session);
        std::fs::create_dir_all(&path)
            .map_err(|err| BrowserError::Profile(format!("failed to create profile dir: {err}")))?;
        Ok(BrowserProfile {
            platform,
            session,
            path,
        })
    }

    pub fn list(&self, platform: &str) -> BrowserResult<Vec<BrowserProfile>> {
        let platform = sanitize(platform)?;
        let dir = self.base_dir.join(&platform);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|err| {
            BrowserError::Profile(format!("failed to list profile directory: {err}"))
        })?;
        let mut profiles = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .map(|entry| BrowserProfile {
                platform: platform.clone(),
                session: entry.file_name().to_string_lossy().to_string(),
                path: entry.path(),
            })
            .collect::<Vec<_>>();
        profiles.sort_by(|a, b| a.session.cmp(&b.session));
        Ok(profiles)
    }

    /// Removes session directories untouched for longer than the TTL and
    /// returns how many were deleted.
    pub fn cleanup_expired(&self) -> BrowserResult<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let platforms = std::fs::read_dir(&self.base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to list profile directory: {err}"))
        })?;
        for platform in platforms.flatten() {
            if !platform.path().is_dir() {
                continue;
            }
            let Ok(sessions) = std::fs::read_dir(platform.path()) else {
                continue;
            };
            for entry in sessions.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let modified = std::fs::metadata(path.join(".last_used"))
                    .or_else(|_| entry.metadata())
                    .and_then(|metadata| metadata.modified());
                let modified = match modified {
                    Ok(modified) => modified,
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "failed to read profile metadata");
                        continue;
                    }
                };
                if now.duration_since(modified).unwrap_or(Duration::ZERO) > self.ttl {
                    match std::fs::remove_dir_all(&path) {
                        Ok(()) => removed += 1,
                        Err(err) => {
                            tracing::warn!(path = %path.display(), error = %err, "failed to remove expired profile")
                        }
                    }
                }
            }
        }
        Ok(removed)
    }
}

fn sanitize(name: &str) -> BrowserResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
    {
        return Err(BrowserError::Profile(format!(
            "invalid profile name: {name:?}"
        )));
    }
    Ok(trimmed.to_string())
}
