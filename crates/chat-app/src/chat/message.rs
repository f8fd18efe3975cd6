use std::path::{Path, PathBuf};

use econ_chat_storage::{SessionId, TurnId};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Bot,
}

/// Descriptor of a file the user picked for the next submission.
///
/// Only metadata is kept; the backend protocol carries text alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

impl Attachment {
    pub fn new(name: impl Into<String>, size_bytes: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Builds a descriptor from a file on disk, inferring the media type from the extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AttachmentError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).context(ReadMetadataSnafu {
            stage: "read-attachment-metadata",
            path: path.to_path_buf(),
        })?;
        ensure!(
            metadata.is_file(),
            NotAFileSnafu {
                stage: "check-attachment-kind",
                path: path.to_path_buf(),
            }
        );

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .context(MissingFileNameSnafu {
                stage: "resolve-attachment-name",
                path: path.to_path_buf(),
            })?;
        let mime_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .to_string();

        Ok(Self::new(name, metadata.len(), mime_type))
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AttachmentError {
    #[snafu(display("failed to read attachment at {path:?} on `{stage}`: {source}"))]
    ReadMetadata {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("attachment at {path:?} is not a regular file on `{stage}`"))]
    NotAFile { stage: &'static str, path: PathBuf },
    #[snafu(display("attachment path {path:?} has no file name on `{stage}`"))]
    MissingFileName { stage: &'static str, path: PathBuf },
}

/// One immutable transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub id: TurnId,
    pub role: Role,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl Turn {
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: TurnId::new_v4(),
            role: Role::User,
            content: content.into(),
            attachments,
        }
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self {
            id: TurnId::new_v4(),
            role: Role::Bot,
            content: content.into(),
            attachments: Vec::new(),
        }
    }
}

/// Sequence number of one dispatched backend request within a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Routing key that ties a reply back to the request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyTarget {
    pub session_id: SessionId,
    pub request_id: RequestId,
}

impl ReplyTarget {
    pub const fn new(session_id: SessionId, request_id: RequestId) -> Self {
        Self {
            session_id,
            request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_from_path_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let attachment = Attachment::from_path(&path).unwrap();
        assert_eq!(attachment, Attachment::new("report.pdf", 2048, "application/pdf"));
    }

    #[test]
    fn unknown_extension_falls_back_to_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.econ-unknown");
        std::fs::write(&path, b"x").unwrap();

        let attachment = Attachment::from_path(&path).unwrap();
        assert_eq!(attachment.mime_type, "application/octet-stream");
    }

    #[test]
    fn missing_file_and_directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let missing = Attachment::from_path(dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(missing, AttachmentError::ReadMetadata { .. }));

        let directory = Attachment::from_path(dir.path()).unwrap_err();
        assert!(matches!(directory, AttachmentError::NotAFile { .. }));
    }

    #[test]
    fn turns_get_distinct_ids() {
        let first = Turn::user("Hello", Vec::new());
        let second = Turn::bot("Hi there");
        assert_ne!(first.id, second.id);
        assert_eq!(first.role, Role::User);
        assert_eq!(second.role, Role::Bot);
        assert!(second.attachments.is_empty());
    }
}
