use std::collections::HashMap;

use actix_web::web::Bytes;
use shared::ImageResult;
use tokio::sync::RwLock;

/// Annotated PNG bytes kept under the upload filename.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub filename: String,
    pub png: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub results: Vec<ImageResult>,
    pub images: Vec<StoredImage>,
}

#[derive(Default)]
struct StoreState {
    log: Vec<ImageResult>,
    images: Vec<StoredImage>,
    index: HashMap<String, usize>,
}

impl StoreState {
    fn put_image(&mut self, filename: String, png: Bytes) {
        match self.index.get(&filename) {
            Some(&slot) => self.images[slot].png = png,
            None => {
                self.index.insert(filename.clone(), self.images.len());
                self.images.push(StoredImage { filename, png });
            }
        }
    }

    fn clear(&mut self) {
        self.log.clear();
        self.images.clear();
        self.index.clear();
    }
}

/// Process-wide detection results since the last reset.
///
/// The log keeps every submitted `ImageResult` in submission order, including
/// repeated filenames. The image map is keyed by filename and keeps only the
/// most recent bytes; a re-submitted name keeps its original position.
///
/// Every mutation takes the single write lock, so a batch commit and a reset
/// never interleave.
#[derive(Default)]
pub struct ResultStore {
    state: RwLock<StoreState>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, results: Vec<ImageResult>) {
        self.state.write().await.log.extend(results);
    }

    pub async fn put_image(&self, filename: impl Into<String>, png: impl Into<Bytes>) {
        self.state
            .write()
            .await
            .put_image(filename.into(), png.into());
    }

    pub async fn get_image(&self, filename: &str) -> Option<Bytes> {
        let state = self.state.read().await;
        state
            .index
            .get(filename)
            .map(|&slot| state.images[slot].png.clone())
    }

    pub async fn all_results(&self) -> Vec<ImageResult> {
        self.state.read().await.log.clone()
    }

    /// Appends a whole batch and its annotated images in one critical
    /// section and returns the full log as it stands right after the commit.
    pub async fn commit_batch(
        &self,
        results: Vec<ImageResult>,
        images: Vec<StoredImage>,
    ) -> Vec<ImageResult> {
        let mut state = self.state.write().await;
        for image in images {
            state.put_image(image.filename, image.png);
        }
        state.log.extend(results);
        state.log.clone()
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;
        StoreSnapshot {
            results: state.log.clone(),
            images: state.images.clone(),
        }
    }

    pub async fn reset(&self) {
        self.state.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.log.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.log.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(filename: &str) -> ImageResult {
        ImageResult {
            filename: filename.to_string(),
            detections: Vec::new(),
        }
    }

    fn image(filename: &str, png: &'static [u8]) -> StoredImage {
        StoredImage {
            filename: filename.to_string(),
            png: Bytes::from_static(png),
        }
    }

    #[actix_web::test]
    async fn starts_empty() {
        let store = ResultStore::new();
        assert!(store.is_empty().await);
        assert!(store.all_results().await.is_empty());
        assert!(store.get_image("a.jpg").await.is_none());
    }

    #[actix_web::test]
    async fn append_keeps_submission_order_and_duplicates() {
        let store = ResultStore::new();
        store.append(vec![result("a.jpg"), result("b.jpg")]).await;
        store.append(vec![result("a.jpg")]).await;

        let names: Vec<_> = store
            .all_results()
            .await
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "a.jpg"]);
        assert_eq!(store.len().await, 3);
    }

    #[actix_web::test]
    async fn put_image_overwrites_in_place() {
        let store = ResultStore::new();
        store.put_image("a.jpg", Bytes::from_static(b"first")).await;
        store.put_image("b.jpg", Bytes::from_static(b"other")).await;
        store.put_image("a.jpg", Bytes::from_static(b"second")).await;

        assert_eq!(store.get_image("a.jpg").await.unwrap(), Bytes::from_static(b"second"));

        let snapshot = store.snapshot().await;
        let names: Vec<_> = snapshot.images.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);
    }

    #[actix_web::test]
    async fn commit_batch_returns_the_full_log() {
        let store = ResultStore::new();
        store
            .commit_batch(vec![result("a.jpg")], vec![image("a.jpg", b"a")])
            .await;
        let log = store
            .commit_batch(vec![result("b.jpg")], vec![image("b.jpg", b"b")])
            .await;

        assert_eq!(log.len(), 2);
        assert_eq!(log[0].filename, "a.jpg");
        assert_eq!(log[1].filename, "b.jpg");
        assert_eq!(store.get_image("b.jpg").await.unwrap(), Bytes::from_static(b"b"));
    }

    #[actix_web::test]
    async fn reset_clears_both_parts_and_is_idempotent() {
        let store = ResultStore::new();
        store
            .commit_batch(vec![result("a.jpg")], vec![image("a.jpg", b"a")])
            .await;

        store.reset().await;
        store.reset().await;

        assert!(store.is_empty().await);
        assert!(store.get_image("a.jpg").await.is_none());
        assert!(store.snapshot().await.images.is_empty());

        store.put_image("c.jpg", Bytes::from_static(b"c")).await;
        assert_eq!(store.snapshot().await.images.len(), 1);
    }

    const BATCH_SIZE: usize = 3;

    /// Checks that the log is a sequence of whole batches and that the image
    /// map holds exactly the files of those batches.
    fn assert_whole_batches(snapshot: &StoreSnapshot) {
        assert_eq!(snapshot.results.is_empty(), snapshot.images.is_empty());
        assert_eq!(snapshot.results.len() % BATCH_SIZE, 0);

        let mut seen = std::collections::HashSet::new();
        for batch in snapshot.results.chunks(BATCH_SIZE) {
            let (tag, _) = batch[0].filename.split_once('#').unwrap();
            assert!(seen.insert(tag.to_string()), "batch {tag} split in the log");
            for (i, entry) in batch.iter().enumerate() {
                assert_eq!(entry.filename, format!("{tag}#{i}"));
            }
        }

        let mut logged: Vec<_> = snapshot.results.iter().map(|r| r.filename.as_str()).collect();
        let mut stored: Vec<_> = snapshot.images.iter().map(|i| i.filename.as_str()).collect();
        logged.sort_unstable();
        stored.sort_unstable();
        assert_eq!(logged, stored);
    }

    #[test]
    fn racing_commits_and_resets_never_split_a_batch() {
        let store = ResultStore::new();

        for round in 0..50 {
            std::thread::scope(|scope| {
                for writer in 0..4 {
                    let store = &store;
                    scope.spawn(move || {
                        let tag = format!("r{round}w{writer}");
                        let names: Vec<_> = (0..BATCH_SIZE).map(|i| format!("{tag}#{i}")).collect();
                        let results = names.iter().map(|n| result(n)).collect();
                        let images = names.iter().map(|n| image(n, b"png")).collect();
                        actix_web::rt::System::new().block_on(store.commit_batch(results, images));
                    });
                }
                if round % 2 == 0 {
                    scope.spawn(|| actix_web::rt::System::new().block_on(store.reset()));
                }
            });

            let snapshot = actix_web::rt::System::new().block_on(store.snapshot());
            assert_whole_batches(&snapshot);
        }
    }

    #[actix_web::test]
    async fn interleaved_tasks_commit_whole_batches() {
        let store = ResultStore::new();

        let commits = (0..8).map(|writer| {
            let names: Vec<_> = (0..BATCH_SIZE).map(|i| format!("t{writer}#{i}")).collect();
            let results = names.iter().map(|n| result(n)).collect();
            let images = names.iter().map(|n| image(n, b"png")).collect();
            store.commit_batch(results, images)
        });
        let (logs, ()) = futures_util::future::join(
            futures_util::future::join_all(commits),
            store.reset(),
        )
        .await;

        for log in &logs {
            assert_eq!(log.len() % BATCH_SIZE, 0);
        }
        assert_whole_batches(&store.snapshot().await);
    }
}
