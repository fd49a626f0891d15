mod common;

use common::{expected, id_value_batch, id_value_rows, id_value_schema};
use tablelake::{LakeError, LakeManager, LakeOptions, MergeCondition};
use tempfile::TempDir;

async fn open(dir: &TempDir) -> LakeManager {
    LakeManager::open(LakeOptions::from(dir.path().join("lake")))
        .await
        .expect("open lake")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn append_then_upsert_on_delta() {
    let dir = TempDir::new().expect("tempdir");
    let mut lake = open(&dir).await;
    lake.create_table("t", id_value_schema(), "id")
        .expect("create");

    // Nothing on disk until the first write.
    assert!(!dir.path().join("lake").join("t").join("_delta_log").exists());

    lake.append_table("t", id_value_batch(&[(1, "a")]), None)
        .await
        .expect("append");
    lake.merge_table(
        "t",
        id_value_batch(&[(1, "b"), (2, "c")]),
        MergeCondition::Upsert,
        None,
    )
    .await
    .expect("merge");

    let rows = id_value_rows(&lake.read_table("t").await.expect("read"));
    assert_eq!(rows, expected(&[(1, "b"), (2, "c")]));

    let info = lake.table_info("t").await.expect("info");
    assert!(info.exists);
    assert_eq!(info.version, Some(1));
    assert_eq!(
        info.metadata.and_then(|metadata| metadata.description),
        Some("id".to_string())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn insert_merge_creates_missing_delta_table() {
    let dir = TempDir::new().expect("tempdir");
    let mut lake = open(&dir).await;
    lake.create_table("fresh", id_value_schema(), "id")
        .expect("create");

    let summary = lake
        .merge_table("fresh", id_value_batch(&[(1, "a"), (2, "b")]), "insert", None)
        .await
        .expect("merge");
    assert_eq!(summary.rows_inserted, 2);
    let rows = id_value_rows(&lake.read_table("fresh").await.expect("read"));
    assert_eq!(rows, expected(&[(1, "a"), (2, "b")]));

    lake.create_table("other", id_value_schema(), "id")
        .expect("create");
    let err = lake
        .merge_table("other", id_value_batch(&[(1, "a")]), "update", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LakeError::MergeUnavailable { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reopen_restores_tables_and_keys() {
    let dir = TempDir::new().expect("tempdir");
    {
        let mut lake = open(&dir).await;
        lake.create_table("t", id_value_schema(), "id")
            .expect("create");
        lake.append_table("t", id_value_batch(&[(1, "a"), (2, "b")]), None)
            .await
            .expect("append");
        lake.create_table("empty", id_value_schema(), "id")
            .expect("create");
    }

    let lake = open(&dir).await;
    assert_eq!(lake.catalog().names().collect::<Vec<_>>(), vec!["t"]);
    let definition = lake.catalog().lookup("t").expect("rebuilt");
    assert_eq!(definition.primary_key().composite(), "id");
    let columns = definition
        .schema()
        .fields()
        .iter()
        .map(|field| field.name().as_str())
        .collect::<Vec<_>>();
    assert_eq!(columns, vec!["id", "v"]);

    lake.merge_table("t", id_value_batch(&[(2, "B")]), "update", None)
        .await
        .expect("merge after reopen");
    let rows = id_value_rows(&lake.read_table("t").await.expect("read"));
    assert_eq!(rows, expected(&[(1, "a"), (2, "B")]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn maintenance_and_delete_on_delta() {
    let dir = TempDir::new().expect("tempdir");
    let mut lake = open(&dir).await;
    lake.create_table("t", id_value_schema(), "id")
        .expect("create");
    for id in 0..3 {
        lake.append_table("t", id_value_batch(&[(id, "x")]), None)
            .await
            .expect("append");
    }

    let summary = lake.optimize_table("t", None).await.expect("optimize");
    assert_eq!(summary.files_removed, 3);
    assert_eq!(summary.files_added, 1);
    assert_eq!(lake.table_info("t").await.expect("info").file_count, 1);

    // Files removed by the compaction are younger than the default window.
    assert!(lake
        .vacuum_table("t", None)
        .await
        .expect("vacuum")
        .is_empty());

    lake.delete_table("t").await.expect("delete");
    assert!(!dir.path().join("lake").join("t").exists());
    assert!(lake.list_tables().await.expect("list").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn path_like_names_never_reach_local_storage() {
    let dir = TempDir::new().expect("tempdir");
    let sibling = dir.path().join("precious");
    std::fs::create_dir_all(&sibling).expect("sibling");
    let mut lake = open(&dir).await;
    lake.create_table("keep", id_value_schema(), "id")
        .expect("create");
    lake.append_table("keep", id_value_batch(&[(1, "a")]), None)
        .await
        .expect("append");

    let outside = dir.path().join("abs").display().to_string();
    for name in [".", "..", "a/b", "..\\up", outside.as_str(), "/abs"] {
        assert!(
            matches!(
                lake.create_table(name, id_value_schema(), "id"),
                Err(LakeError::InvalidTableName)
            ),
            "create {name:?}"
        );
        assert!(
            matches!(lake.delete_table(name).await, Err(LakeError::InvalidTableName)),
            "delete {name:?}"
        );
        assert!(
            matches!(
                lake.append_table(name, id_value_batch(&[(2, "b")]), None)
                    .await,
                Err(LakeError::InvalidTableName)
            ),
            "append {name:?}"
        );
    }

    assert!(sibling.exists());
    assert!(dir.path().join("lake").join("keep").join("_delta_log").exists());
    assert_eq!(lake.catalog().names().collect::<Vec<_>>(), vec!["keep"]);
    let rows = id_value_rows(&lake.read_table("keep").await.expect("read"));
    assert_eq!(rows, expected(&[(1, "a")]));
}
