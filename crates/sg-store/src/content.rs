use std::sync::Arc;

use sg_types::Digest;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::record::Blob;
use crate::traits::BlobStore;

/// Content-addressed `put`/`get` over any [`BlobStore`].
///
/// `put` is idempotent: the same bytes always yield the same digest and are
/// physically written at most once. `get` re-verifies the digest so silent
/// corruption surfaces as an error instead of wrong bytes.
pub struct ContentStore<B: ?Sized> {
    blobs: Arc<B>,
}

impl<B: BlobStore + ?Sized> ContentStore<B> {
    pub fn new(blobs: Arc<B>) -> Self {
        Self { blobs }
    }

    /// Store a payload if absent and return its digest.
    pub fn put(&self, payload: &[u8]) -> StoreResult<Digest> {
        let blob = Blob::new(payload.to_vec());
        let written = self.blobs.insert_blob(&blob)?;
        debug!(digest = %blob.digest.short_hex(), size = blob.size, written, "blob put");
        Ok(blob.digest)
    }

    /// Fetch a full blob record by digest.
    pub fn get_blob(&self, digest: &Digest) -> StoreResult<Blob> {
        let blob = self
            .blobs
            .get_blob(digest)?
            .ok_or_else(|| StoreError::not_found("blob", digest))?;
        if !blob.verify() {
            return Err(StoreError::CorruptBlob {
                digest: *digest,
                computed: Blob::digest_of(&blob.payload),
            });
        }
        Ok(blob)
    }

    /// Fetch the payload stored under `digest`.
    pub fn get(&self, digest: &Digest) -> StoreResult<Vec<u8>> {
        self.get_blob(digest).map(|blob| blob.payload)
    }

    /// The underlying blob store.
    pub fn blobs(&self) -> &Arc<B> {
        &self.blobs
    }
}

impl<B: ?Sized> Clone for ContentStore<B> {
    fn clone(&self) -> Self {
        Self {
            blobs: Arc::clone(&self.blobs),
        }
    }
}
