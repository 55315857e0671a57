use crate::composer::NewsletterEdition;
use digest_core::{write_new, CoreError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// A newsletter edition together with the HTML that was rendered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEdition {
    pub edition: NewsletterEdition,
    pub html: String,
    pub json_path: PathBuf,
    pub html_path: PathBuf,
}

/// Edition artifacts, written once per edition so reruns resend identical
/// content.
#[derive(Debug, Clone)]
pub struct EditionStore {
    dir: PathBuf,
}

impl EditionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn json_path(&self, edition_id: &str) -> PathBuf {
        self.dir.join(format!("newsletter_{}.json", edition_id))
    }

    pub fn html_path(&self, edition_id: &str) -> PathBuf {
        self.dir.join(format!("newsletter_{}.html", edition_id))
    }

    pub async fn load(&self, edition_id: &str) -> Result<Option<StoredEdition>, CoreError> {
        let json_path = self.json_path(edition_id);
        let html_path = self.html_path(edition_id);

        let json = match fs::read_to_string(&json_path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let edition: NewsletterEdition = serde_json::from_str(&json)?;
        let html = match fs::read_to_string(&html_path).await {
            Ok(html) => html,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    edition = edition_id,
                    "Edition HTML missing at {}; it will be re-rendered",
                    html_path.display()
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(StoredEdition {
            edition,
            html,
            json_path,
            html_path,
        }))
    }

    /// Persists the edition unless one already exists, in which case the
    /// stored copy is returned instead.
    pub async fn store(
        &self,
        edition: NewsletterEdition,
        html: String,
    ) -> Result<StoredEdition, CoreError> {
        fs::create_dir_all(&self.dir).await?;
        let json_path = self.json_path(&edition.edition_id);
        let html_path = self.html_path(&edition.edition_id);

        // HTML first: a JSON file is only present once its HTML is.
        if !write_new(&html_path, html.as_bytes()).await? {
            if let Some(existing) = self.load(&edition.edition_id).await? {
                info!(edition = %edition.edition_id, "Reusing stored newsletter edition");
                return Ok(existing);
            }
            warn!(
                edition = %edition.edition_id,
                "Found HTML without its edition record; keeping the existing HTML"
            );
            let html = fs::read_to_string(&html_path).await?;
            let json = serde_json::to_string_pretty(&edition)?;
            write_new(&json_path, json.as_bytes()).await?;
            return Ok(StoredEdition {
                edition,
                html,
                json_path,
                html_path,
            });
        }

        let json = serde_json::to_string_pretty(&edition)?;
        write_new(&json_path, json.as_bytes()).await?;
        info!(edition = %edition.edition_id, "Stored newsletter at {}", html_path.display());

        Ok(StoredEdition {
            edition,
            html,
            json_path,
            html_path,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
