//! Chunked uploads and URL intake.

use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::ingest::{display_name, parse_source_url};
use super::staging::validate_upload_id;
use super::{
    FileEventKind, FileRecord, FileRepository, FileStorage, Library, NewFile, UploadSession,
    LINK_MIME_TYPE, MAX_DESCRIPTION_LENGTH, MAX_FILENAME_LENGTH, MAX_SERVICE_CATEGORY_LENGTH,
};
use crate::auth::{can_place, Caller};
use crate::{Result, VaultError};

/// Acknowledgement for one staged chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkAck {
    /// Upload the chunk belongs to.
    pub upload_id: String,
    /// Index of the chunk.
    pub chunk_index: u32,
    /// Distinct chunks received so far.
    pub received_chunks: usize,
}

/// Request to assemble a finished upload.
#[derive(Debug, Clone)]
pub struct CompleteUpload {
    /// Upload to assemble.
    pub upload_id: String,
    /// Display name for the file.
    pub file_name: String,
    /// Number of chunks the client sent.
    pub total_chunks: u32,
    /// MIME type; guessed from the name when absent.
    pub mime_type: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Requested service.
    pub service_category: Option<String>,
    /// Folder to place the file into.
    pub folder_id: Option<i64>,
}

impl CompleteUpload {
    /// Create a completion request.
    pub fn new(upload_id: impl Into<String>, file_name: impl Into<String>, total_chunks: u32) -> Self {
        Self {
            upload_id: upload_id.into(),
            file_name: file_name.into(),
            total_chunks,
            mime_type: None,
            description: None,
            service_category: None,
            folder_id: None,
        }
    }

    /// Set the MIME type.
    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Set the service category.
    pub fn with_service_category(mut self, service_category: Option<String>) -> Self {
        self.service_category = service_category;
        self
    }

    /// Set the target folder.
    pub fn with_folder(mut self, folder_id: Option<i64>) -> Self {
        self.folder_id = folder_id;
        self
    }
}

/// Request to register a file from a URL.
#[derive(Debug, Clone)]
pub struct UrlIngest {
    /// Source URL.
    pub url: String,
    /// Display name; derived from the URL when absent.
    pub custom_name: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Requested service.
    pub service_category: Option<String>,
    /// Folder to place the file into.
    pub folder_id: Option<i64>,
}

impl UrlIngest {
    /// Create an ingest request.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            custom_name: None,
            description: None,
            service_category: None,
            folder_id: None,
        }
    }

    /// Set the display name.
    pub fn with_custom_name(mut self, custom_name: Option<String>) -> Self {
        self.custom_name = custom_name;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Set the service category.
    pub fn with_service_category(mut self, service_category: Option<String>) -> Self {
        self.service_category = service_category;
        self
    }

    /// Set the target folder.
    pub fn with_folder(mut self, folder_id: Option<i64>) -> Self {
        self.folder_id = folder_id;
        self
    }
}

/// Strip path components from a file name and check its length.
pub fn normalize_file_name(name: &str) -> Result<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let base: String = base.chars().filter(|c| !c.is_control()).collect();
    let base = base.trim();

    if base.is_empty() || base == "." || base == ".." {
        return Err(VaultError::Validation(
            "fileName must not be empty".to_string(),
        ));
    }
    if base.chars().count() > MAX_FILENAME_LENGTH {
        return Err(VaultError::Validation(format!(
            "fileName must be at most {MAX_FILENAME_LENGTH} characters"
        )));
    }
    Ok(base.to_string())
}

fn optional_text(value: Option<String>, field: &str, max: usize) -> Result<Option<String>> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) if v.chars().count() > max => Err(VaultError::Validation(format!(
            "{field} must be at most {max} characters"
        ))),
        other => Ok(other),
    }
}

/// Guess a MIME type from a file name.
fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

impl Library {
    /// Stage one chunk of an upload.
    ///
    /// The first chunk opens the session. Chunks may arrive in any order and
    /// re-sending an index replaces it.
    pub async fn put_chunk(
        &self,
        caller: &Caller,
        upload_id: &str,
        chunk_index: u32,
        data: &[u8],
    ) -> Result<ChunkAck> {
        validate_upload_id(upload_id)?;
        let limits = self.limits();

        if data.is_empty() {
            return Err(VaultError::Validation("chunk is empty".to_string()));
        }
        if data.len() as u64 > limits.max_chunk_bytes {
            return Err(VaultError::Validation(format!(
                "chunk exceeds the maximum size of {} bytes",
                limits.max_chunk_bytes
            )));
        }
        if chunk_index >= limits.max_total_chunks {
            return Err(VaultError::Validation(format!(
                "chunkIndex must be below {}",
                limits.max_total_chunks
            )));
        }

        let received_chunks = self
            .sessions()
            .admit_chunk(
                upload_id,
                &caller.user_id,
                chunk_index,
                data.len() as u64,
                limits.max_upload_bytes,
            )
            .await?;

        if let Err(e) = self.staging().write_chunk(upload_id, chunk_index, data).await {
            self.sessions().discard_chunk(upload_id, chunk_index).await;
            return Err(e);
        }

        Ok(ChunkAck {
            upload_id: upload_id.to_string(),
            chunk_index,
            received_chunks,
        })
    }

    /// Assemble a staged upload into a stored file and create its record.
    ///
    /// On any failure the session is released so the client can retry.
    pub async fn complete_upload(&self, caller: &Caller, request: &CompleteUpload) -> Result<FileRecord> {
        validate_upload_id(&request.upload_id)?;
        let file_name = normalize_file_name(&request.file_name)?;
        let description = optional_text(
            request.description.clone(),
            "description",
            MAX_DESCRIPTION_LENGTH,
        )?;
        let service_category = optional_text(
            request.service_category.clone(),
            "serviceCategory",
            MAX_SERVICE_CATEGORY_LENGTH,
        )?;
        if request.total_chunks == 0 {
            return Err(VaultError::Validation(
                "totalChunks must be at least 1".to_string(),
            ));
        }
        if request.total_chunks > self.limits().max_total_chunks {
            return Err(VaultError::Validation(format!(
                "totalChunks must be at most {}",
                self.limits().max_total_chunks
            )));
        }
        let mime_type = request
            .mime_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| guess_mime(&file_name));

        let session = self
            .sessions()
            .claim(&request.upload_id, &caller.user_id)
            .await?;

        let result = self
            .assemble(caller, &session, request, &file_name, &mime_type)
            .await;

        let record = match result {
            Ok(file) => NewFile { description, service_category, ..file },
            Err(e) => {
                self.sessions().release(&request.upload_id).await;
                return Err(e);
            }
        };

        let _folder_guard = self.locks().maybe_folder(record.folder_id).await;
        if let Some(folder_id) = record.folder_id {
            // Re-check under the lock; the folder may have been deleted meanwhile.
            if let Err(e) = self.accessible_folder(caller, folder_id).await {
                self.discard_stored(record.stored_name.as_deref()).await;
                self.sessions().release(&request.upload_id).await;
                return Err(e);
            }
        }

        let created = match FileRepository::new(self.pool()).create(&record).await {
            Ok(created) => created,
            Err(e) => {
                self.discard_stored(record.stored_name.as_deref()).await;
                self.sessions().release(&request.upload_id).await;
                return Err(e);
            }
        };

        self.sessions().finish(&request.upload_id).await;
        if let Err(e) = self.staging().remove_upload(&request.upload_id).await {
            warn!(upload_id = %request.upload_id, error = %e, "Failed to remove staged chunks");
        }
        self.feed().publish(FileEventKind::Created, &created);

        info!(
            upload_id = %request.upload_id,
            file_id = created.id,
            size = created.size,
            "Upload assembled"
        );
        Ok(created)
    }

    /// Check completeness, then concatenate chunks into storage in index order.
    async fn assemble(
        &self,
        caller: &Caller,
        session: &UploadSession,
        request: &CompleteUpload,
        file_name: &str,
        mime_type: &str,
    ) -> Result<NewFile> {
        if let Some(folder_id) = request.folder_id {
            let folder = self.accessible_folder(caller, folder_id).await?;
            if !can_place(caller, &session.owner_id, &folder.owner_id) {
                return Err(VaultError::Permission(
                    "folder belongs to another user".to_string(),
                ));
            }
        }

        let missing = self
            .staging()
            .missing_chunks(&request.upload_id, request.total_chunks)
            .await?;
        if !missing.is_empty() {
            return Err(VaultError::IncompleteUpload { missing });
        }

        let stored_name = FileStorage::generate_stored_name(file_name);
        let written = self
            .concatenate(&request.upload_id, request.total_chunks, &stored_name)
            .await;
        let size = match written {
            Ok(size) => size,
            Err(e) => {
                self.discard_stored(Some(&stored_name)).await;
                return Err(e);
            }
        };

        Ok(
            NewFile::uploaded(&session.owner_id, file_name, stored_name, mime_type, size as i64)
                .with_folder(request.folder_id),
        )
    }

    async fn concatenate(&self, upload_id: &str, total_chunks: u32, stored_name: &str) -> Result<u64> {
        let mut out = self.storage().create(stored_name).await?;
        let mut size = 0u64;

        for index in 0..total_chunks {
            let mut chunk = self.staging().open_chunk(upload_id, index).await?;
            size += tokio::io::copy(&mut chunk, &mut out)
                .await
                .map_err(|e| VaultError::Storage(format!("cannot assemble chunk {index}: {e}")))?;
        }

        out.flush().await?;
        out.sync_all().await?;
        Ok(size)
    }

    pub(crate) async fn discard_stored(&self, stored_name: Option<&str>) {
        if let Some(name) = stored_name {
            if let Err(e) = self.storage().delete(name).await {
                warn!(stored_name = name, error = %e, "Failed to remove stored file");
            }
        }
    }

    async fn check_url_placement(&self, caller: &Caller, folder_id: i64) -> Result<()> {
        let folder = self.accessible_folder(caller, folder_id).await?;
        if !can_place(caller, &caller.user_id, &folder.owner_id) {
            return Err(VaultError::Permission(
                "folder belongs to another user".to_string(),
            ));
        }
        Ok(())
    }

    /// Register a file from a URL.
    ///
    /// Links on the embeddable allowlist are stored by reference with no
    /// bytes. Anything else is downloaded into storage first.
    pub async fn ingest_url(&self, caller: &Caller, request: &UrlIngest) -> Result<FileRecord> {
        let url = parse_source_url(&request.url)?;
        let description = optional_text(
            request.description.clone(),
            "description",
            MAX_DESCRIPTION_LENGTH,
        )?;
        let service_category = optional_text(
            request.service_category.clone(),
            "serviceCategory",
            MAX_SERVICE_CATEGORY_LENGTH,
        )?;
        let name = normalize_file_name(&display_name(&url, request.custom_name.as_deref()))
            .unwrap_or_else(|_| url.host_str().unwrap_or("link").to_string());
        let name: String = name.chars().take(MAX_FILENAME_LENGTH).collect();

        if let Some(folder_id) = request.folder_id {
            self.check_url_placement(caller, folder_id).await?;
        }

        // The fetch runs without the folder lock.
        let new_file = if self.ingestor().is_embeddable(&url) {
            NewFile::from_url(&caller.user_id, &name, url.as_str(), None, LINK_MIME_TYPE, 0)
        } else {
            let stored_name = FileStorage::generate_stored_name(&name);
            let downloaded = self
                .ingestor()
                .download(&url, self.storage(), &stored_name)
                .await?;
            let mime_type = downloaded
                .content_type
                .filter(|m| m != "application/octet-stream")
                .unwrap_or_else(|| guess_mime(&name));
            NewFile::from_url(
                &caller.user_id,
                &name,
                url.as_str(),
                Some(downloaded.stored_name),
                mime_type,
                downloaded.size as i64,
            )
        }
        .with_folder(request.folder_id)
        .with_description(description)
        .with_service_category(service_category);

        let _folder_guard = self.locks().maybe_folder(request.folder_id).await;
        if let Some(folder_id) = request.folder_id {
            // Re-check under the lock; the folder may have changed during the fetch.
            if let Err(e) = self.check_url_placement(caller, folder_id).await {
                self.discard_stored(new_file.stored_name.as_deref()).await;
                return Err(e);
            }
        }

        let created = match FileRepository::new(self.pool()).create(&new_file).await {
            Ok(created) => created,
            Err(e) => {
                self.discard_stored(new_file.stored_name.as_deref()).await;
                return Err(e);
            }
        };

        self.feed().publish(FileEventKind::Created, &created);
        info!(
            file_id = created.id,
            url = %url,
            embedded = !created.has_content(),
            "URL ingested"
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::file::library::test_support::{library, library_with};
    use crate::file::{FileStatus, SourceType, UploadLimits};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn private_hosts() -> IngestConfig {
        IngestConfig {
            allow_private_hosts: true,
            connect_timeout_secs: 2,
            total_timeout_secs: 30,
            ..IngestConfig::default()
        }
    }

    /// Accept connections on a loopback port and never answer.
    async fn spawn_stalled_source() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}/slow.mp3")
    }

    /// Answer on a loopback port after `delay`.
    async fn spawn_delayed_source(delay: Duration) -> String {
        let app = axum::Router::new().route(
            "/late.mp3",
            axum::routing::get(move || async move {
                tokio::time::sleep(delay).await;
                "late audio"
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/late.mp3")
    }

    /// Files under the storage root, across all shards.
    fn stored_file_count(library: &Library) -> usize {
        let Ok(shards) = std::fs::read_dir(library.storage().base_path()) else {
            return 0;
        };
        shards
            .flatten()
            .filter_map(|shard| std::fs::read_dir(shard.path()).ok())
            .map(|files| files.count())
            .sum()
    }

    #[test]
    fn test_normalize_file_name() {
        assert_eq!(normalize_file_name("visit.mp3").unwrap(), "visit.mp3");
        assert_eq!(normalize_file_name("C:\\Users\\dr\\a.wav").unwrap(), "a.wav");
        assert_eq!(normalize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(normalize_file_name("  spaced.m4a ").unwrap(), "spaced.m4a");
        assert!(normalize_file_name("").is_err());
        assert!(normalize_file_name("dir/").is_err());
        assert!(normalize_file_name(&"a".repeat(256)).is_err());
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("a.mp3"), "audio/mpeg");
        assert_eq!(guess_mime("a.unknownext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_chunk_validation() {
        let limits = UploadLimits {
            max_chunk_bytes: 8,
            max_upload_bytes: 64,
            max_total_chunks: 4,
        };
        let (_dir, library) = library_with(limits, IngestConfig::default()).await;
        let caller = Caller::member("u1");

        let err = library.put_chunk(&caller, "up", 0, b"").await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));

        let err = library
            .put_chunk(&caller, "up", 0, &payload(9))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));

        let err = library.put_chunk(&caller, "up", 4, b"x").await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));

        let err = library.put_chunk(&caller, "../x", 0, b"x").await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));

        assert!(library.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn test_rejected_first_chunk_leaves_no_upload() {
        let limits = UploadLimits {
            max_chunk_bytes: 64,
            max_upload_bytes: 16,
            max_total_chunks: 4,
        };
        let (_dir, library) = library_with(limits, IngestConfig::default()).await;
        let caller = Caller::member("u1");

        let err = library
            .put_chunk(&caller, "big", 0, &payload(32))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
        assert!(library.sessions().is_empty().await);

        let err = library
            .complete_upload(&caller, &CompleteUpload::new("big", "a.bin", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::UnknownUpload(_)));
    }

    #[tokio::test]
    async fn test_upload_owned_by_other_user() {
        let (_dir, library) = library().await;
        library
            .put_chunk(&Caller::member("u1"), "up", 0, b"a")
            .await
            .unwrap();

        let err = library
            .put_chunk(&Caller::member("u2"), "up", 1, b"b")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Permission(_)));
    }

    #[tokio::test]
    async fn test_assembly_reproduces_bytes() {
        let (_dir, library) = library().await;
        let caller = Caller::member("u1");
        let data = payload(10_000);

        // Out of order on purpose.
        library.put_chunk(&caller, "up", 2, &data[8000..]).await.unwrap();
        library.put_chunk(&caller, "up", 0, &data[..4000]).await.unwrap();
        let ack = library
            .put_chunk(&caller, "up", 1, &data[4000..8000])
            .await
            .unwrap();
        assert_eq!(ack.received_chunks, 3);

        let record = library
            .complete_upload(
                &caller,
                &CompleteUpload::new("up", "visit.mp3", 3)
                    .with_description(Some("Follow-up".to_string()))
                    .with_service_category(Some("medical".to_string())),
            )
            .await
            .unwrap();

        assert_eq!(record.size, 10_000);
        assert_eq!(record.status, FileStatus::Pending);
        assert_eq!(record.source_type, SourceType::File);
        assert_eq!(record.mime_type, "audio/mpeg");
        assert_eq!(record.original_name, "visit.mp3");
        assert_eq!(record.description.as_deref(), Some("Follow-up"));
        assert_eq!(record.service_category.as_deref(), Some("medical"));

        let stored = library
            .storage()
            .load(record.stored_name.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(stored, data);

        assert!(library.sessions().get("up").await.is_none());
        assert_eq!(library.staging().missing_chunks("up", 1).await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_interleaved_uploads_do_not_mix() {
        let (_dir, library) = library().await;
        let caller = Caller::member("u1");

        library.put_chunk(&caller, "a", 0, b"AAAA").await.unwrap();
        library.put_chunk(&caller, "b", 0, b"1111").await.unwrap();
        library.put_chunk(&caller, "b", 1, b"2222").await.unwrap();
        library.put_chunk(&caller, "a", 1, b"BBBB").await.unwrap();

        let a = library
            .complete_upload(&caller, &CompleteUpload::new("a", "a.txt", 2))
            .await
            .unwrap();
        let b = library
            .complete_upload(&caller, &CompleteUpload::new("b", "b.txt", 2))
            .await
            .unwrap();

        let storage = library.storage();
        assert_eq!(
            storage.load(a.stored_name.as_deref().unwrap()).await.unwrap(),
            b"AAAABBBB"
        );
        assert_eq!(
            storage.load(b.stored_name.as_deref().unwrap()).await.unwrap(),
            b"11112222"
        );
    }

    #[tokio::test]
    async fn test_concurrent_uploads_do_not_mix() {
        let (_dir, library) = library().await;
        let caller = Caller::member("u1");
        let a = payload(40_000);
        let b: Vec<u8> = a.iter().map(|byte| byte.wrapping_add(1)).collect();

        let send = |upload_id: &'static str, data: &[u8]| {
            let chunks: Vec<(u32, Vec<u8>)> = data
                .chunks(5_000)
                .enumerate()
                .rev()
                .map(|(i, chunk)| (i as u32, chunk.to_vec()))
                .collect();
            let library = library.clone();
            let caller = caller.clone();
            async move {
                let puts = chunks
                    .iter()
                    .map(|(index, chunk)| library.put_chunk(&caller, upload_id, *index, chunk));
                for ack in futures::future::join_all(puts).await {
                    ack.unwrap();
                }
            }
        };
        tokio::join!(send("up-a", &a), send("up-b", &b));

        let complete_a = CompleteUpload::new("up-a", "a.bin", 8);
        let complete_b = CompleteUpload::new("up-b", "b.bin", 8);
        let (done_a, done_b) = tokio::join!(
            library.complete_upload(&caller, &complete_a),
            library.complete_upload(&caller, &complete_b),
        );
        let (done_a, done_b) = (done_a.unwrap(), done_b.unwrap());

        let storage = library.storage();
        assert_eq!(storage.load(done_a.stored_name.as_deref().unwrap()).await.unwrap(), a);
        assert_eq!(storage.load(done_b.stored_name.as_deref().unwrap()).await.unwrap(), b);
    }

    #[tokio::test]
    async fn test_incomplete_upload_creates_nothing() {
        let (_dir, library) = library().await;
        let caller = Caller::member("u1");

        library.put_chunk(&caller, "up", 0, b"aa").await.unwrap();
        library.put_chunk(&caller, "up", 2, b"cc").await.unwrap();

        let err = library
            .complete_upload(&caller, &CompleteUpload::new("up", "a.bin", 4))
            .await
            .unwrap_err();
        match err {
            VaultError::IncompleteUpload { missing } => assert_eq!(missing, vec![1, 3]),
            other => panic!("unexpected error: {other:?}"),
        }

        let files = FileRepository::new(library.pool())
            .list(None, crate::file::FolderFilter::Any)
            .await
            .unwrap();
        assert!(files.is_empty());

        // The session survives for a retry.
        library.put_chunk(&caller, "up", 1, b"bb").await.unwrap();
        library.put_chunk(&caller, "up", 3, b"dd").await.unwrap();
        let record = library
            .complete_upload(&caller, &CompleteUpload::new("up", "a.bin", 4))
            .await
            .unwrap();
        assert_eq!(record.size, 8);
    }

    #[tokio::test]
    async fn test_complete_unknown_or_finished_upload() {
        let (_dir, library) = library().await;
        let caller = Caller::member("u1");

        let err = library
            .complete_upload(&caller, &CompleteUpload::new("nope", "a.bin", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::UnknownUpload(_)));

        library.put_chunk(&caller, "up", 0, b"x").await.unwrap();
        library
            .complete_upload(&caller, &CompleteUpload::new("up", "a.bin", 1))
            .await
            .unwrap();
        let err = library
            .complete_upload(&caller, &CompleteUpload::new("up", "a.bin", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::UnknownUpload(_)));
    }

    #[tokio::test]
    async fn test_complete_validation() {
        let (_dir, library) = library().await;
        let caller = Caller::member("u1");
        library.put_chunk(&caller, "up", 0, b"x").await.unwrap();

        let err = library
            .complete_upload(&caller, &CompleteUpload::new("up", "  ", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));

        let err = library
            .complete_upload(&caller, &CompleteUpload::new("up", "a.bin", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));

        let err = library
            .complete_upload(
                &caller,
                &CompleteUpload::new("up", "a.bin", 1)
                    .with_description(Some("d".repeat(2001))),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));

        // Validation failures leave the session claimable.
        assert!(library
            .complete_upload(&caller, &CompleteUpload::new("up", "a.bin", 1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_complete_into_folder() {
        let (_dir, library) = library().await;
        let caller = Caller::member("u1");
        let folder = library.create_folder(&caller, "Inbox", None).await.unwrap();
        let foreign = library
            .create_folder(&Caller::member("u2"), "Theirs", None)
            .await
            .unwrap();

        library.put_chunk(&caller, "up", 0, b"x").await.unwrap();

        let err = library
            .complete_upload(
                &caller,
                &CompleteUpload::new("up", "a.bin", 1).with_folder(Some(foreign.id)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Permission(_)));

        let record = library
            .complete_upload(
                &caller,
                &CompleteUpload::new("up", "a.bin", 1).with_folder(Some(folder.id)),
            )
            .await
            .unwrap();
        assert_eq!(record.folder_id, Some(folder.id));
    }

    #[tokio::test]
    async fn test_completion_publishes_event() {
        let (_dir, library) = library().await;
        let caller = Caller::member("u1");
        let mut events = library.feed().subscribe();

        library.put_chunk(&caller, "up", 0, b"x").await.unwrap();
        let record = library
            .complete_upload(&caller, &CompleteUpload::new("up", "a.bin", 1))
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, FileEventKind::Created);
        assert_eq!(event.file.id, record.id);
    }

    #[tokio::test]
    async fn test_ingest_embeddable_url() {
        let (_dir, library) = library().await;
        let caller = Caller::member("u1");

        let record = library
            .ingest_url(
                &caller,
                &UrlIngest::new("https://www.youtube.com/watch?v=abc")
                    .with_custom_name(Some("Grand rounds".to_string())),
            )
            .await
            .unwrap();

        assert_eq!(record.source_type, SourceType::Url);
        assert_eq!(record.original_name, "Grand rounds");
        assert_eq!(record.size, 0);
        assert_eq!(record.mime_type, LINK_MIME_TYPE);
        assert_eq!(record.status, FileStatus::Pending);
        assert!(record.stored_name.is_none());
        assert_eq!(
            record.source_url.as_deref(),
            Some("https://www.youtube.com/watch?v=abc")
        );
    }

    #[tokio::test]
    async fn test_ingest_invalid_url() {
        let (_dir, library) = library().await;
        let caller = Caller::member("u1");

        for raw in ["", "not a url", "ftp://example.com/a.mp3", "mailto:a@b.c"] {
            let err = library
                .ingest_url(&caller, &UrlIngest::new(raw))
                .await
                .unwrap_err();
            assert!(matches!(err, VaultError::InvalidUrl(_)), "{raw}: {err:?}");
        }
    }

    #[tokio::test]
    async fn test_ingest_private_host_rejected() {
        let (_dir, library) = library().await;
        let err = library
            .ingest_url(
                &Caller::member("u1"),
                &UrlIngest::new("http://127.0.0.1:9/a.mp3"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_ingest_fetch_failure_creates_nothing() {
        let ingest = IngestConfig {
            allow_private_hosts: true,
            connect_timeout_secs: 2,
            total_timeout_secs: 5,
            ..IngestConfig::default()
        };
        let (_dir, library) = library_with(UploadLimits::default(), ingest).await;

        // Nothing listens on the discard port.
        let err = library
            .ingest_url(
                &Caller::member("u1"),
                &UrlIngest::new("http://127.0.0.1:9/a.mp3"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::FetchFailed(_)));

        let files = FileRepository::new(library.pool())
            .list(None, crate::file::FolderFilter::Any)
            .await
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_slow_fetch_does_not_block_folder_changes() {
        let (_dir, library) = library_with(UploadLimits::default(), private_hosts()).await;
        let u1 = Caller::member("u1");
        let u2 = Caller::member("u2");
        let target = library.create_folder(&u1, "Inbox", None).await.unwrap();
        let y = library.create_folder(&u2, "Y", None).await.unwrap();
        let z = library.create_folder(&u2, "Z", None).await.unwrap();
        let source = spawn_stalled_source().await;

        let fetch = tokio::spawn({
            let library = library.clone();
            let u1 = u1.clone();
            async move {
                library
                    .ingest_url(&u1, &UrlIngest::new(source).with_folder(Some(target.id)))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let deleted = timeout(Duration::from_secs(3), library.delete_folder(&u1, target.id)).await;
        assert!(deleted.expect("delete_folder waited on the fetch").is_ok());

        let moved = timeout(Duration::from_secs(3), library.move_folder(&u2, y.id, Some(z.id))).await;
        assert_eq!(moved.expect("move_folder waited on the fetch").unwrap().parent_id, Some(z.id));

        fetch.abort();
    }

    #[tokio::test]
    async fn test_folder_deleted_during_fetch_discards_download() {
        let (_dir, library) = library_with(UploadLimits::default(), private_hosts()).await;
        let u1 = Caller::member("u1");
        let target = library.create_folder(&u1, "Inbox", None).await.unwrap();
        let source = spawn_delayed_source(Duration::from_millis(500)).await;

        let fetch = tokio::spawn({
            let library = library.clone();
            let u1 = u1.clone();
            async move {
                library
                    .ingest_url(&u1, &UrlIngest::new(source).with_folder(Some(target.id)))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        library.delete_folder(&u1, target.id).await.unwrap();

        let err = fetch.await.unwrap().unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));

        let files = FileRepository::new(library.pool())
            .list(None, crate::file::FolderFilter::Any)
            .await
            .unwrap();
        assert!(files.is_empty());
        assert_eq!(stored_file_count(&library), 0);
    }

    #[tokio::test]
    async fn test_ingest_downloads_into_folder() {
        let (_dir, library) = library_with(UploadLimits::default(), private_hosts()).await;
        let u1 = Caller::member("u1");
        let target = library.create_folder(&u1, "Inbox", None).await.unwrap();
        let source = spawn_delayed_source(Duration::from_millis(10)).await;

        let record = library
            .ingest_url(&u1, &UrlIngest::new(source).with_folder(Some(target.id)))
            .await
            .unwrap();

        assert_eq!(record.folder_id, Some(target.id));
        assert_eq!(record.original_name, "late.mp3");
        assert_eq!(
            library
                .storage()
                .load(record.stored_name.as_deref().unwrap())
                .await
                .unwrap(),
            b"late audio"
        );
    }
}
