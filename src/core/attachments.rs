//! Attachment storage.
//!
//! Files are written after the voucher transaction has committed and are not
//! rolled back with it: a failed write leaves a committed voucher without the
//! file, and a failed transaction never reaches this code.

use crate::{
    entities::{VoucherFile, voucher_file},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// A document to store next to a voucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInput {
    /// Original file name as uploaded
    pub file_name: String,
    /// MIME type, if the caller knows it
    pub mime_type: Option<String>,
    /// File contents
    pub bytes: Vec<u8>,
}

/// Writes attachment files below a root directory, one folder per voucher.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    /// Store rooted at `root`; the directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory all attachment references are relative to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the file and returns its reference (the path below `root`).
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn save_attachment(
        &self,
        voucher_id: i64,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let name = sanitize_file_name(file_name);
        let dir = self.root.join(voucher_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let file_ref = format!("{voucher_id}/{stamp}_{name}");
        tokio::fs::write(self.root.join(&file_ref), bytes).await?;
        Ok(file_ref)
    }

    /// Stores every attachment and records a `voucher_files` row for each.
    ///
    /// Meant to run after the voucher transaction committed; errors are mapped
    /// to [`Error::Attachment`] so callers can tell them from rolled-back writes.
    pub async fn attach_all<C>(
        &self,
        db: &C,
        voucher_id: i64,
        attachments: &[AttachmentInput],
    ) -> Result<Vec<voucher_file::Model>>
    where
        C: ConnectionTrait,
    {
        let mut stored = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let row = self
                .attach_one(db, voucher_id, attachment)
                .await
                .map_err(|e| Error::Attachment {
                    voucher_id,
                    message: format!("{}: {e}", attachment.file_name),
                })?;
            stored.push(row);
        }
        if !stored.is_empty() {
            info!("Stored {} attachments for voucher {voucher_id}", stored.len());
        }
        Ok(stored)
    }

    async fn attach_one<C>(
        &self,
        db: &C,
        voucher_id: i64,
        attachment: &AttachmentInput,
    ) -> Result<voucher_file::Model>
    where
        C: ConnectionTrait,
    {
        let file_ref = self
            .save_attachment(voucher_id, &attachment.file_name, &attachment.bytes)
            .await?;

        let row = voucher_file::ActiveModel {
            voucher_id: Set(voucher_id),
            file_name: Set(attachment.file_name.clone()),
            mime_type: Set(attachment.mime_type.clone()),
            size: Set(i64::try_from(attachment.bytes.len()).unwrap_or(i64::MAX)),
            file_ref: Set(file_ref),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        Ok(row.insert(db).await?)
    }
}

/// Attachment records of a voucher, oldest first.
pub async fn list_files<C>(db: &C, voucher_id: i64) -> Result<Vec<voucher_file::Model>>
where
    C: ConnectionTrait,
{
    VoucherFile::find()
        .filter(voucher_file::Column::VoucherId.eq(voucher_id))
        .order_by_asc(voucher_file::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() { "file".to_string() } else { cleaned.to_string() }
}
