use bytes::Bytes;
use ephemeral_host::object_store::{LocalStore, ObjectStoreError};
use tokio::io::AsyncReadExt;

#[tokio::test]
async fn test_local_store_put_open() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store.put("abc123.png", Bytes::from("hello world")).await.unwrap();

    let mut file = store.open("abc123.png").await.unwrap();
    let mut contents = String::new();
    file.read_to_string(&mut contents).await.unwrap();
    assert_eq!(contents, "hello world");
}

#[tokio::test]
async fn test_local_store_open_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let result = store.open("missing.png").await;
    assert!(matches!(result, Err(ObjectStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_local_store_reserve_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    assert!(store.reserve("Qw12Er.gif").await.unwrap().is_some());
    assert!(store.reserve("Qw12Er.gif").await.unwrap().is_none());
    assert!(store.exists("Qw12Er.gif").await.unwrap());
}

#[tokio::test]
async fn test_local_store_delete_tolerates_missing() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store.put("gone.pdf", Bytes::from("data")).await.unwrap();
    assert!(store.delete("gone.pdf").await.unwrap());
    assert!(!store.exists("gone.pdf").await.unwrap());

    // A second delete is a no-op, not an error
    assert!(!store.delete("gone.pdf").await.unwrap());
}

#[tokio::test]
async fn test_local_store_list() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store.put("a.png", Bytes::from("12345")).await.unwrap();
    store.put("b.mp4", Bytes::from("1")).await.unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();

    let mut entries = store.list().await.unwrap();
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["a.png", "b.mp4"]);
    assert_eq!(entries[0].byte_size, 5);
}
