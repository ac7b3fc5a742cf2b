use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::fs::File;

use super::UploadError;
use crate::object_store::LocalStore;
use crate::storage::models::object_key;
use crate::storage::MetadataStore;

/// Draws short alphanumeric identifiers.
///
/// Each length gets `draws_per_len` attempts before the length grows by one,
/// up to `max_len`; the total number of attempts is therefore bounded.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    pub base_len: usize,
    pub max_len: usize,
    pub draws_per_len: usize,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            base_len: 6,
            max_len: 12,
            draws_per_len: 8,
        }
    }
}

/// An identifier whose backing object has been created (empty) and is
/// therefore owned by the caller.
#[derive(Debug)]
pub struct Reservation {
    pub id: String,
    pub key: String,
    pub file: File,
}

impl IdAllocator {
    pub fn max_attempts(&self) -> usize {
        (self.max_len.saturating_sub(self.base_len) + 1) * self.draws_per_len
    }

    pub fn candidates<'a, R: Rng>(&self, rng: &'a mut R) -> Candidates<'a, R> {
        Candidates {
            rng,
            len: self.base_len,
            max_len: self.max_len,
            draws_per_len: self.draws_per_len,
            drawn: 0,
        }
    }

    /// Claim a fresh identifier for an object with `extension`.
    pub async fn reserve(
        &self,
        objects: &LocalStore,
        store: &MetadataStore,
        extension: &str,
    ) -> Result<Reservation, UploadError> {
        let mut rng = StdRng::from_rng(&mut rand::rng());
        self.reserve_with(&mut rng, objects, store, extension).await
    }

    /// Like [`reserve`](Self::reserve) with a caller-supplied RNG.
    ///
    /// An id is rejected if a live record already uses it, or if creating
    /// `{id}{extension}` with create-new semantics fails because the file
    /// exists. Creating the file is what claims the id, so two concurrent
    /// assemblies can never end up with the same object path.
    pub async fn reserve_with<R: Rng + Send>(
        &self,
        rng: &mut R,
        objects: &LocalStore,
        store: &MetadataStore,
        extension: &str,
    ) -> Result<Reservation, UploadError> {
        let mut attempts = 0;
        for id in self.candidates(rng) {
            attempts += 1;
            if store.contains(&id).await {
                tracing::debug!(file_id = %id, "Identifier collides with a live record");
                continue;
            }

            let key = object_key(&id, extension);
            match objects
                .reserve(&key)
                .await
                .map_err(|e| UploadError::AssemblyFailed(e.to_string()))?
            {
                Some(file) => return Ok(Reservation { id, key, file }),
                None => {
                    tracing::debug!(file_id = %id, "Identifier collides with an existing object");
                }
            }
        }

        tracing::error!(attempts, "Identifier space exhausted");
        Err(UploadError::IdentifierExhausted { attempts })
    }
}

/// Iterator over candidate ids with escalating length.
pub struct Candidates<'a, R> {
    rng: &'a mut R,
    len: usize,
    max_len: usize,
    draws_per_len: usize,
    drawn: usize,
}

impl<R: Rng> Iterator for Candidates<'_, R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.drawn == self.draws_per_len {
            self.len += 1;
            self.drawn = 0;
        }
        if self.len > self.max_len || self.draws_per_len == 0 {
            return None;
        }
        self.drawn += 1;
        Some(
            (0..self.len)
                .map(|_| char::from(self.rng.sample(Alphanumeric)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_escalate_and_terminate() {
        let allocator = IdAllocator {
            base_len: 6,
            max_len: 8,
            draws_per_len: 3,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let lengths: Vec<usize> = allocator.candidates(&mut rng).map(|id| id.len()).collect();

        assert_eq!(lengths, vec![6, 6, 6, 7, 7, 7, 8, 8, 8]);
        assert_eq!(allocator.max_attempts(), 9);
    }

    #[test]
    fn test_candidates_are_alphanumeric() {
        let allocator = IdAllocator::default();
        let mut rng = StdRng::seed_from_u64(42);
        for id in allocator.candidates(&mut rng) {
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()), "{id}");
        }
    }

    #[tokio::test]
    async fn test_reserve_skips_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        let objects = LocalStore::new(dir.path().join("objects")).unwrap();
        let store = MetadataStore::new(dir.path().join("metadata.json"));
        let allocator = IdAllocator::default();

        let first = allocator
            .candidates(&mut StdRng::seed_from_u64(1))
            .next()
            .unwrap();
        objects
            .put(&format!("{first}.png"), bytes::Bytes::from("taken"))
            .await
            .unwrap();

        let reservation = allocator
            .reserve_with(&mut StdRng::seed_from_u64(1), &objects, &store, ".png")
            .await
            .unwrap();

        assert_ne!(reservation.id, first);
        assert_eq!(reservation.key, format!("{}.png", reservation.id));
        assert!(objects.exists(&reservation.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_reserve_exhausts_when_everything_collides() {
        let dir = tempfile::tempdir().unwrap();
        let objects = LocalStore::new(dir.path().join("objects")).unwrap();
        let store = MetadataStore::new(dir.path().join("metadata.json"));
        let allocator = IdAllocator {
            base_len: 6,
            max_len: 6,
            draws_per_len: 2,
        };

        for id in allocator.candidates(&mut StdRng::seed_from_u64(9)) {
            objects
                .put(&format!("{id}.gif"), bytes::Bytes::from("x"))
                .await
                .unwrap();
        }

        let result = allocator
            .reserve_with(&mut StdRng::seed_from_u64(9), &objects, &store, ".gif")
            .await;
        assert!(matches!(
            result,
            Err(UploadError::IdentifierExhausted { attempts: 2 })
        ));
    }
}
