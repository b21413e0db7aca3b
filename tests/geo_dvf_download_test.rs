use flate2::write::GzEncoder;
use flate2::Compression;
use httpmock::prelude::*;
use price_estimator::{Department, EstimatorError, GeoDvfDataset};
use std::io::Write;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const HEADER: &str = "id_mutation,date_mutation,numero_disposition,nature_mutation,valeur_fonciere,adresse_numero,adresse_suffixe,adresse_nom_voie,code_postal,code_commune,nom_commune,code_departement,id_parcelle,type_local,surface_reelle_bati,nombre_pieces_principales,surface_terrain,longitude,latitude";

fn gz_csv(rows: &[&str]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    writeln!(encoder, "{}", HEADER).unwrap();
    for row in rows {
        writeln!(encoder, "{}", row).unwrap();
    }
    encoder.finish().unwrap()
}

fn paris_file() -> Vec<u8> {
    gz_csv(&[
        "2023-1,2023-03-14,000001,Vente,420000,5,,RUE DE CHARONNE,75011,75111,Paris 11e Arrondissement,75,75111000AB0001,Appartement,42,2,,2.3801,48.8532",
        "2023-2,2023-04-02,000001,Vente,95000,,,RUE DE CHARONNE,75011,75111,Paris 11e Arrondissement,75,75111000AB0002,Dépendance,,0,,2.3802,48.8533",
    ])
}

fn deps(codes: &[&str]) -> Vec<Department> {
    codes.iter().map(|c| Department::new(c).unwrap()).collect()
}

fn dataset(server: &MockServer, temp: &TempDir, years: Vec<i32>, codes: &[&str]) -> GeoDvfDataset {
    GeoDvfDataset::new(
        years,
        deps(codes),
        Some(temp.path().to_path_buf()),
        Some(&server.url("/geo-dvf/latest/csv")),
    )
    .unwrap()
}

#[tokio::test]
async fn test_download_only_fetches_missing_files() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start();

    let mock_2023 = server.mock(|when, then| {
        when.method(GET).path("/geo-dvf/latest/csv/2023/departements/75.csv.gz");
        then.status(200).body(paris_file());
    });
    let mock_2022 = server.mock(|when, then| {
        when.method(GET).path("/geo-dvf/latest/csv/2022/departements/75.csv.gz");
        then.status(200).body(paris_file());
    });

    // 第一次下載
    let first = dataset(&server, &temp, vec![2023], &["75"]);
    let report = first.download().await.unwrap();
    assert_eq!(report.downloaded, vec![temp.path().join("2023_75.csv.gz")]);
    assert!(report.skipped.is_empty());
    mock_2023.assert_hits(1);

    // 第二次下載應全部跳過
    let report = first.download().await.unwrap();
    assert!(report.downloaded.is_empty());
    assert_eq!(report.skipped.len(), 1);
    mock_2023.assert_hits(1);

    // 新增年份只下載新檔案
    let multi = dataset(&server, &temp, vec![2022, 2023], &["75"]);
    let report = multi.download().await.unwrap();
    assert_eq!(report.downloaded, vec![temp.path().join("2022_75.csv.gz")]);
    assert_eq!(report.skipped, vec![temp.path().join("2023_75.csv.gz")]);
    mock_2022.assert_hits(1);
    mock_2023.assert_hits(1);

    assert!(!temp.path().join("2022_75.csv.gz.part").exists());
}

#[tokio::test]
async fn test_missing_upstream_file_is_reported() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path("/geo-dvf/latest/csv/2023/departements/75.csv.gz");
        then.status(200).body(paris_file());
    });
    let missing = server.mock(|when, then| {
        when.method(GET).path("/geo-dvf/latest/csv/2023/departements/976.csv.gz");
        then.status(404);
    });

    let ds = dataset(&server, &temp, vec![2023], &["75", "976"]);
    let report = ds.download().await.unwrap();

    missing.assert();
    assert_eq!(report.downloaded.len(), 1);
    assert_eq!(report.missing, vec![ds.url(2023, &Department::new("976").unwrap())]);
    assert_eq!(report.total(), 2);
    assert!(!ds.file_path(2023, &Department::new("976").unwrap()).exists());
}

#[tokio::test]
async fn test_server_error_fails_download() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start();

    let busy = server.mock(|when, then| {
        when.method(GET).path("/geo-dvf/latest/csv/2023/departements/92.csv.gz");
        then.status(503);
    });

    let ds = dataset(&server, &temp, vec![2023], &["92"]).with_retry(2, Duration::from_millis(10));
    let result = ds.download().await;

    // 首次請求加上兩次重試
    busy.assert_hits(3);

    match result {
        Err(EstimatorError::DownloadError { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected DownloadError, got {:?}", other),
    }
    assert!(!ds.file_path(2023, &Department::new("92").unwrap()).exists());
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start_async().await;
    let path = "/geo-dvf/latest/csv/2023/departements/93.csv.gz";

    let mut busy = server
        .mock_async(|when, then| {
            when.method(GET).path(path);
            then.status(503);
        })
        .await;

    let ds = dataset(&server, &temp, vec![2023], &["93"]).with_retry(3, Duration::from_millis(300));

    // 第一次 503 之後換成正常回應
    let recover = async {
        while busy.hits_async().await == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        busy.delete_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(path);
                then.status(200).body(paris_file());
            })
            .await
    };

    let (result, healthy) = tokio::join!(ds.download(), recover);
    let report = result.unwrap();

    healthy.assert_hits_async(1).await;
    assert_eq!(report.downloaded, vec![temp.path().join("2023_93.csv.gz")]);
    assert!(report.missing.is_empty());
}

#[tokio::test]
async fn test_concurrency_limit_serializes_requests() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start();
    let delay = Duration::from_millis(200);

    let slow = server.mock(|when, then| {
        when.method(GET).path_contains("/geo-dvf/latest/csv/2023/departements/");
        then.status(200).delay(delay).body(paris_file());
    });

    let ds = dataset(&server, &temp, vec![2023], &["75", "92", "93"]).with_concurrency(1);
    let started = Instant::now();
    let report = ds.download().await.unwrap();
    let elapsed = started.elapsed();

    slow.assert_hits(3);
    assert_eq!(report.downloaded.len(), 3);
    assert!(
        elapsed >= delay * 3,
        "one download at a time should take at least {:?}, took {:?}",
        delay * 3,
        elapsed
    );
}

#[tokio::test]
async fn test_read_rows_from_cache() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path("/geo-dvf/latest/csv/2023/departements/75.csv.gz");
        then.status(200).body(paris_file());
    });

    let ds = dataset(&server, &temp, vec![2023], &["75", "92"]);
    assert!(matches!(
        ds.read_rows(),
        Err(EstimatorError::DatasetNotFound { .. })
    ));

    // 只快取 75，92 不存在時應略過
    let only_paris = dataset(&server, &temp, vec![2023], &["75"]);
    only_paris.download().await.unwrap();

    let rows = ds.read_rows().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id_mutation, "2023-1");
    assert_eq!(rows[0].valeur_fonciere, Some(420000.0));
    assert_eq!(rows[1].type_local.as_deref(), Some("Dépendance"));
}

#[tokio::test]
async fn test_cleanup_removes_only_requested_files() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start();

    let ds_2022 = dataset(&server, &temp, vec![2022], &["75"]);
    let ds_2023 = dataset(&server, &temp, vec![2023], &["75"]);

    std::fs::write(ds_2022.file_path(2022, &Department::new("75").unwrap()), b"x").unwrap();
    std::fs::write(ds_2023.file_path(2023, &Department::new("75").unwrap()), b"x").unwrap();
    std::fs::write(temp.path().join("2023_75.csv.gz.part"), b"partial").unwrap();
    std::fs::write(temp.path().join("notes.txt"), b"keep").unwrap();

    let removed = ds_2023.cleanup().unwrap();

    assert_eq!(removed, 2);
    assert!(temp.path().exists());
    assert!(temp.path().join("2022_75.csv.gz").exists());
    assert!(temp.path().join("notes.txt").exists());
    assert!(!temp.path().join("2023_75.csv.gz").exists());
    assert!(!temp.path().join("2023_75.csv.gz.part").exists());

    // 再次清理不應出錯
    assert_eq!(ds_2023.cleanup().unwrap(), 0);
}

#[test]
fn test_default_storage_is_temp_cache() {
    let ds = GeoDvfDataset::with_defaults(vec![2023]).unwrap();

    assert!(ds.storage_path().ends_with("geo_dvf_cache"));
    assert!(ds.storage_path().exists());
    assert_eq!(ds.departments().len(), 4);
    assert_eq!(
        ds.urls()[3],
        "https://files.data.gouv.fr/geo-dvf/latest/csv/2023/departements/94.csv.gz"
    );
}

#[test]
fn test_relative_storage_path_is_made_absolute() {
    let relative = std::path::PathBuf::from("target/test_data/geo_dvf");

    let ds = GeoDvfDataset::new(vec![2023], deps(&["75"]), Some(relative.clone()), None).unwrap();

    assert!(ds.storage_path().is_absolute());
    assert!(ds.storage_path().ends_with(&relative));
    assert!(ds.storage_path().exists());
}
