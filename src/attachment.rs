//! # Saving attachments to disk.
//!
//! Attachment content is fetched from the [`AttachmentStore`] the first time
//! it is needed and cached on the [`Attachment`]. Files are written to the
//! configured download directory and never overwrite an existing file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{format_err, Context as _, Result};
use futures::future::BoxFuture;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::context::Context;
use crate::error::{ErrorReporter, ViewError};
use crate::log::LogExt;
use crate::message::Attachment;
use crate::selection::Selections;
use crate::EventType;

/// Identifies an attachment on the mail server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRequest {
    pub folder: String,
    pub uid: u32,

    /// See [`Attachment::part`].
    pub part: usize,
    pub filename: String,
    pub mime_type: Option<String>,
}

/// Backend holding attachment content, e.g. the IMAP server or a local cache.
pub trait AttachmentStore: fmt::Debug + Send + Sync {
    fn fetch<'a>(&'a self, request: &'a AttachmentRequest) -> BoxFuture<'a, Result<Vec<u8>>>;
}

#[derive(Debug)]
pub(crate) struct AttachmentDownloader {
    context: Context,
    store: Arc<dyn AttachmentStore>,
    reporter: Arc<dyn ErrorReporter>,
    selections: Arc<Selections>,
}

impl AttachmentDownloader {
    pub(crate) fn new(
        context: &Context,
        store: Arc<dyn AttachmentStore>,
        reporter: Arc<dyn ErrorReporter>,
        selections: Arc<Selections>,
    ) -> Self {
        Self {
            context: context.clone(),
            store,
            reporter,
            selections,
        }
    }

    /// Saves the attachment, fetching it first if needed.
    ///
    /// Returns the path written to, or `None` if fetching or saving failed.
    pub(crate) async fn download(&self, attachment: &Arc<Attachment>) -> Option<PathBuf> {
        let content = match attachment.content() {
            Some(content) => content,
            None => match self.fetch(attachment).await {
                Ok(content) => content,
                Err(cause) => {
                    self.reporter.report(ViewError::AttachmentFetch {
                        filename: attachment.filename().to_string(),
                        cause,
                    });
                    return None;
                }
            },
        };

        match self.save(attachment.filename(), &content).await {
            Ok(path) => {
                info!(
                    self.context,
                    "Saved attachment {:?} to {}.",
                    attachment.filename(),
                    path.display()
                );
                self.context.emit_event(EventType::AttachmentSaved {
                    path: path.clone(),
                    mime_type: attachment.mime_type().map(str::to_string),
                });
                Some(path)
            }
            Err(cause) => {
                self.reporter.report(ViewError::AttachmentSave {
                    filename: attachment.filename().to_string(),
                    cause,
                });
                None
            }
        }
    }

    async fn fetch(&self, attachment: &Arc<Attachment>) -> Result<Arc<Vec<u8>>> {
        let request = self
            .selections
            .current()
            .filter(|sel| sel.msg().holds_attachment(attachment))
            .map(|sel| AttachmentRequest {
                folder: sel.msg().folder().to_string(),
                uid: sel.msg().uid(),
                part: attachment.part(),
                filename: attachment.filename().to_string(),
                mime_type: attachment.mime_type().map(str::to_string),
            })
            .ok_or_else(|| format_err!("attachment is not part of the displayed message"))?;
        let content = self.store.fetch(&request).await?;
        Ok(attachment.set_content(content))
    }

    async fn save(&self, filename: &str, content: &[u8]) -> Result<PathBuf> {
        let dir = self
            .context
            .get_config(Config::DownloadDir)
            .await?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let (stem, ext) = sanitise_name(filename);
        let (path, mut file) = create_new_file(&self.context, &dir, &stem, &ext).await?;
        file.write_all(content)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
        file.flush().await?;
        Ok(path)
    }
}

/// Creates a file that did not exist before, appending `-1`, `-2` and so on
/// to the stem until a free name is found.
async fn create_new_file(
    context: &Context,
    dir: &Path,
    stem: &str,
    ext: &str,
) -> Result<(PathBuf, fs::File)> {
    const MAX_ATTEMPT: u32 = 100;
    let mut attempt = 0;
    let mut name = format!("{stem}{ext}");
    loop {
        attempt += 1;
        let path = dir.join(&name);
        match fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(err) => {
                if attempt >= MAX_ATTEMPT {
                    return Err(err).context("failed to create file");
                } else if attempt == 1 && !dir.exists() {
                    fs::create_dir_all(dir).await.log_err(context);
                } else if err.kind() == std::io::ErrorKind::AlreadyExists {
                    name = format!("{stem}-{attempt}{ext}");
                } else {
                    return Err(err)
                        .with_context(|| format!("cannot create {}", path.display()));
                }
            }
        }
    }
}

/// Splits a filename into a safe stem and extension, e.g. `"../x.tar.gz"`
/// becomes `("x", ".tar.gz")`.
fn sanitise_name(name: &str) -> (String, String) {
    let name = name
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or_default();
    let opts = sanitize_filename::Options {
        truncate: true,
        windows: true,
        replacement: "",
    };
    let name = sanitize_filename::sanitize_with_options(name, opts);

    // Extensions are at most 32 characters and contain no punctuation but dots.
    let tail: String = name
        .chars()
        .rev()
        .take_while(|c| {
            (!c.is_ascii_punctuation() || *c == '.') && !c.is_whitespace() && !c.is_control()
        })
        .take(33)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let ext = match tail.split_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!(".{ext}"),
        _ => String::new(),
    };
    let stem = name.strip_suffix(&ext).unwrap_or_default();
    let stem = if stem.is_empty() { "file" } else { stem };
    (stem.to_string(), ext)
}
